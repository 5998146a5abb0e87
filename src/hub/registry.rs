//! Hub registry — process-wide board id to hub table.
//!
//! DESIGN
//! ======
//! The table sits behind a short `std::sync::Mutex` critical section shared
//! by `get_or_create` and the reaper; no lock is ever held across an await.
//! The reaper receives `HubExit` notices and removes an entry only when the
//! instance id matches, so a stale notice never evicts a replacement hub.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::{HubExit, HubHandle, HubRef, Member};
use crate::services::user::User;

/// Hub mailbox capacity.
pub const HUB_MAILBOX_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct HubRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    table: Mutex<HashMap<Uuid, HubHandle>>,
    exits: mpsc::UnboundedSender<HubExit>,
    mailbox_capacity: usize,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, HashMap<Uuid, HubHandle>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HubRegistry {
    /// Create an empty registry and start its reaper task.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mailbox_capacity(HUB_MAILBOX_CAPACITY)
    }

    #[must_use]
    pub fn with_mailbox_capacity(mailbox_capacity: usize) -> Self {
        let (exits, exit_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(Inner { table: Mutex::new(HashMap::new()), exits, mailbox_capacity });
        tokio::spawn(reap(Arc::downgrade(&inner), exit_rx));
        Self { inner }
    }

    /// Return the live hub for `board_id`, starting one if none is running.
    #[must_use]
    pub fn get_or_create(&self, board_id: Uuid) -> HubHandle {
        let mut table = self.inner.table();
        if let Some(hub) = table.get(&board_id) {
            if !hub.is_closed() {
                return hub.clone();
            }
        }
        let hub = HubHandle::spawn(board_id, self.inner.mailbox_capacity, self.inner.exits.clone());
        table.insert(board_id, hub.clone());
        hub
    }

    #[cfg(test)]
    pub fn get(&self, board_id: Uuid) -> Option<HubHandle> {
        self.inner.table().get(&board_id).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.table().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register `member` on the board's hub. Returns a weak hub reference and
    /// the users present before the join. Retries when the hub it found was
    /// shutting down.
    pub async fn join(&self, board_id: Uuid, member: Member) -> (HubRef, Vec<User>) {
        loop {
            let hub = self.get_or_create(board_id);
            if let Some(users) = hub.register(member.clone()).await {
                return (hub.downgrade(), users);
            }
            debug!(%board_id, instance = %hub.instance(), "registry: hub closed during join, retrying");
            tokio::task::yield_now().await;
        }
    }
}

impl Default for HubRegistry {
    fn default() -> Self {
        Self::new()
    }
}

async fn reap(inner: Weak<Inner>, mut exits: mpsc::UnboundedReceiver<HubExit>) {
    while let Some(exit) = exits.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        let mut table = inner.table();
        if table.get(&exit.board_id).is_some_and(|hub| hub.instance() == exit.instance) {
            table.remove(&exit.board_id);
            info!(board_id = %exit.board_id, instance = %exit.instance, "registry: hub reaped");
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
