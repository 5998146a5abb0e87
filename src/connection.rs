//! Per-connection session state owned by the read pump.

use std::collections::HashMap;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::{BoardDisconnectResult, Event, Response};
use crate::hub::{ConnectionId, HubRef};
use crate::outbox::{Outbox, OutboxError};
use crate::services::user::User;

/// A board this connection has joined.
#[derive(Debug, Clone)]
pub struct Membership {
    pub can_write: bool,
    pub hub: HubRef,
}

#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user: Option<User>,
    pub boards: HashMap<Uuid, Membership>,
    pub outbox: Outbox,
}

impl Connection {
    #[must_use]
    pub fn new(outbox: Outbox) -> Self {
        Self { id: Uuid::new_v4(), user: None, boards: HashMap::new(), outbox }
    }

    #[must_use]
    pub fn can_write(&self, board_id: Uuid) -> bool {
        self.boards.get(&board_id).is_some_and(|m| m.can_write)
    }

    /// Queue a response for this connection only.
    ///
    /// # Errors
    ///
    /// `Closed` if the outbox closed before the frame could be queued.
    pub async fn reply(&self, response: &Response) -> Result<(), crate::frame::ProtocolError> {
        let payload = response.encode()?;
        if let Err(OutboxError::Closed | OutboxError::Full) = self.outbox.push(payload).await {
            debug!(conn_id = %self.id, event = %response.event, "connection: reply dropped, outbox closed");
        }
        Ok(())
    }

    /// Leave every joined board: announce the departure, then unregister.
    /// Finally close the outbox so the write pump stops.
    pub async fn shutdown(&mut self) {
        let user_id = self.user.as_ref().map(|u| u.id);
        for (board_id, membership) in self.boards.drain() {
            if let Some(user_id) = user_id {
                match Response::ok(Event::BoardDisconnect, &BoardDisconnectResult { user_id }).and_then(|r| r.encode()) {
                    Ok(payload) => membership.hub.broadcast(payload).await,
                    Err(e) => warn!(conn_id = %self.id, %board_id, error = %e, "connection: disconnect frame not encoded"),
                }
            }
            membership.hub.unregister(self.id).await;
        }
        self.outbox.close();
    }
}
