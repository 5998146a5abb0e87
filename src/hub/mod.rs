//! Hub — per-board broadcast actor.
//!
//! ARCHITECTURE
//! ============
//! One hub task exists per board while at least one connection is joined.
//! The hub owns its member set outright; everything else talks to it through
//! its bounded mailbox (`HubCommand`). Broadcast order on a board is the
//! order commands are dequeued from that mailbox.
//!
//! DESIGN
//! ======
//! - Fan-out never blocks: each member outbox is pushed with `try_push`. A
//!   full outbox gets its member dropped and closed on the spot.
//! - A hub exits when a removal leaves it empty. Before exiting it closes
//!   its mailbox and drains what is left, dropping pending registration
//!   replies so joiners retry against a fresh hub. It then reports its
//!   `(board_id, instance)` to the registry reaper.
//! - Connections hold `HubRef`, a weak mailbox handle. Once a hub is gone
//!   every operation through a `HubRef` is a silent no-op.

pub mod registry;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::Payload;
use crate::outbox::{Outbox, OutboxError};
use crate::services::user::User;

pub type ConnectionId = Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// A joined connection as seen by a hub.
#[derive(Debug, Clone)]
pub struct Member {
    pub conn_id: ConnectionId,
    pub user: User,
    pub outbox: Outbox,
}

#[derive(Debug)]
pub enum HubCommand {
    /// Reply with the current users, then add `member`. Both happen in one
    /// step so the snapshot never races other joins.
    Register { member: Member, reply: oneshot::Sender<Vec<User>> },
    Unregister(ConnectionId),
    Broadcast(Payload),
    ListUsers { exclude: Option<ConnectionId>, reply: oneshot::Sender<Vec<User>> },
}

/// Sent to the reaper when a hub task ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubExit {
    pub board_id: Uuid,
    pub instance: Uuid,
}

/// Strong handle to a running hub. Only the registry keeps these.
#[derive(Debug, Clone)]
pub struct HubHandle {
    board_id: Uuid,
    instance: Uuid,
    tx: mpsc::Sender<HubCommand>,
}

/// Weak handle held by connections.
#[derive(Debug, Clone)]
pub struct HubRef {
    board_id: Uuid,
    tx: mpsc::WeakSender<HubCommand>,
}

// =============================================================================
// HANDLES
// =============================================================================

impl HubHandle {
    /// Start a hub task for `board_id`.
    pub fn spawn(board_id: Uuid, capacity: usize, exits: mpsc::UnboundedSender<HubExit>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let instance = Uuid::new_v4();
        tokio::spawn(run(board_id, instance, rx, exits));
        info!(%board_id, %instance, "hub: created");
        Self { board_id, instance, tx }
    }

    #[cfg(test)]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    #[must_use]
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// Whether the hub has stopped accepting commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Join `member` and get the users that were present before it.
    /// `None` means the hub is shutting down and the caller should retry.
    pub async fn register(&self, member: Member) -> Option<Vec<User>> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(HubCommand::Register { member, reply }).await.ok()?;
        rx.await.ok()
    }

    /// Queue `payload` for every current member.
    #[cfg(test)]
    pub async fn broadcast(&self, payload: Payload) -> bool {
        self.tx.send(HubCommand::Broadcast(payload)).await.is_ok()
    }

    #[must_use]
    pub fn downgrade(&self) -> HubRef {
        HubRef { board_id: self.board_id, tx: self.tx.downgrade() }
    }
}

impl HubRef {
    #[cfg(test)]
    pub fn board_id(&self) -> Uuid {
        self.board_id
    }

    pub async fn broadcast(&self, payload: Payload) {
        match self.tx.upgrade() {
            Some(tx) => {
                let _ = tx.send(HubCommand::Broadcast(payload)).await;
            }
            None => debug!(board_id = %self.board_id, "hub: gone, broadcast dropped"),
        }
    }

    pub async fn unregister(&self, conn_id: ConnectionId) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(HubCommand::Unregister(conn_id)).await;
        }
    }

    /// Users currently joined, optionally leaving one connection out.
    pub async fn list_users(&self, exclude: Option<ConnectionId>) -> Vec<User> {
        let Some(tx) = self.tx.upgrade() else {
            return Vec::new();
        };
        let (reply, rx) = oneshot::channel();
        if tx.send(HubCommand::ListUsers { exclude, reply }).await.is_err() {
            return Vec::new();
        }
        drop(tx);
        rx.await.unwrap_or_default()
    }
}

// =============================================================================
// EVENT LOOP
// =============================================================================

async fn run(board_id: Uuid, instance: Uuid, mut rx: mpsc::Receiver<HubCommand>, exits: mpsc::UnboundedSender<HubExit>) {
    let mut members: Vec<Member> = Vec::new();

    while let Some(cmd) = rx.recv().await {
        match cmd {
            HubCommand::Register { member, reply } => {
                let conn_id = member.conn_id;
                if reply.send(users(&members, None)).is_ok() {
                    members.push(member);
                    debug!(%board_id, %conn_id, total = members.len(), "hub: member joined");
                }
            }
            HubCommand::Unregister(conn_id) => {
                let Some(pos) = members.iter().position(|m| m.conn_id == conn_id) else {
                    continue;
                };
                let member = members.remove(pos);
                member.outbox.close();
                debug!(%board_id, %conn_id, total = members.len(), "hub: member left");
                if members.is_empty() {
                    break;
                }
            }
            HubCommand::Broadcast(payload) => {
                if fan_out(board_id, &mut members, &payload) && members.is_empty() {
                    break;
                }
            }
            HubCommand::ListUsers { exclude, reply } => {
                let _ = reply.send(users(&members, exclude));
            }
        }
    }

    rx.close();
    while let Ok(cmd) = rx.try_recv() {
        if let HubCommand::ListUsers { reply, .. } = cmd {
            let _ = reply.send(Vec::new());
        }
    }
    for member in members {
        member.outbox.close();
    }
    let _ = exits.send(HubExit { board_id, instance });
    info!(%board_id, %instance, "hub: destroyed");
}

fn users(members: &[Member], exclude: Option<ConnectionId>) -> Vec<User> {
    members
        .iter()
        .filter(|m| Some(m.conn_id) != exclude)
        .map(|m| m.user.clone())
        .collect()
}

/// Push `payload` to every member. Returns `true` if any member was removed.
fn fan_out(board_id: Uuid, members: &mut Vec<Member>, payload: &Payload) -> bool {
    let before = members.len();
    members.retain(|m| match m.outbox.try_push(payload.clone()) {
        Ok(()) => true,
        Err(OutboxError::Full) => {
            warn!(%board_id, conn_id = %m.conn_id, "hub: slow client dropped");
            m.outbox.close();
            false
        }
        Err(OutboxError::Closed) => {
            debug!(%board_id, conn_id = %m.conn_id, "hub: closed member removed");
            false
        }
    });
    members.len() != before
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
