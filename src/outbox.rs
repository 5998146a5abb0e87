//! Outbox — bounded per-connection queue of encoded frames.
//!
//! DESIGN
//! ======
//! Every connection owns exactly one outbox. Producers (the read pump for
//! direct replies, board hubs for broadcasts) hold `Outbox` clones; the
//! write pump owns the single `OutboxReceiver`.
//!
//! Closing is a state transition on a watch channel, separate from the
//! frame queue. Closing happens at most once no matter how many producers
//! race to do it, and the first close reason wins. After close, pushes are
//! refused and the write pump stops draining frames.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::frame::{CloseReason, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxState {
    Open,
    /// Closed, with the reason the write pump should put in the close frame.
    Closed(Option<CloseReason>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutboxError {
    #[error("outbox is full")]
    Full,
    #[error("outbox is closed")]
    Closed,
}

/// What the write pump should do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    Frame(Payload),
    Close(Option<CloseReason>),
}

/// Create an outbox holding at most `capacity` pending frames.
#[must_use]
pub fn channel(capacity: usize) -> (Outbox, OutboxReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let (state_tx, state_rx) = watch::channel(OutboxState::Open);
    let state = Arc::new(state_tx);
    (Outbox { tx, state: Arc::clone(&state) }, OutboxReceiver { rx, state_rx, state })
}

// =============================================================================
// PRODUCER SIDE
// =============================================================================

#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<Payload>,
    state: Arc<watch::Sender<OutboxState>>,
}

impl Outbox {
    /// Enqueue without waiting.
    ///
    /// # Errors
    ///
    /// `Full` when the queue is at capacity, `Closed` once the outbox is closed.
    pub fn try_push(&self, payload: Payload) -> Result<(), OutboxError> {
        if self.is_closed() {
            return Err(OutboxError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => OutboxError::Full,
            mpsc::error::TrySendError::Closed(_) => OutboxError::Closed,
        })
    }

    /// Enqueue, waiting for space. Gives up if the outbox closes meanwhile.
    ///
    /// # Errors
    ///
    /// `Closed` if the outbox is or becomes closed.
    pub async fn push(&self, payload: Payload) -> Result<(), OutboxError> {
        if self.is_closed() {
            return Err(OutboxError::Closed);
        }
        tokio::select! {
            sent = self.tx.send(payload) => sent.map_err(|_| OutboxError::Closed),
            () = self.closed() => Err(OutboxError::Closed),
        }
    }

    /// Close without a reason.
    pub fn close(&self) -> bool {
        self.close_with(None)
    }

    /// Close with a reason for the final close frame. Returns `true` only for
    /// the call that actually closed the outbox.
    pub fn close_with(&self, reason: Option<CloseReason>) -> bool {
        self.state.send_if_modified(|state| {
            if *state == OutboxState::Open {
                *state = OutboxState::Closed(reason);
                true
            } else {
                false
            }
        })
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(*self.state.borrow(), OutboxState::Closed(_))
    }

    /// Resolve once the outbox is closed.
    pub async fn closed(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the wait cannot fail.
        let _ = rx.wait_for(|state| matches!(state, OutboxState::Closed(_))).await;
    }
}

// =============================================================================
// CONSUMER SIDE
// =============================================================================

#[derive(Debug)]
pub struct OutboxReceiver {
    rx: mpsc::Receiver<Payload>,
    state_rx: watch::Receiver<OutboxState>,
    state: Arc<watch::Sender<OutboxState>>,
}

impl OutboxReceiver {
    /// Wait for the next frame or for close. Close wins over pending frames.
    pub async fn next(&mut self) -> Outgoing {
        loop {
            if let OutboxState::Closed(reason) = *self.state_rx.borrow_and_update() {
                return Outgoing::Close(reason);
            }
            tokio::select! {
                biased;
                changed = self.state_rx.changed() => {
                    if changed.is_err() {
                        return Outgoing::Close(None);
                    }
                }
                frame = self.rx.recv() => {
                    return match frame {
                        Some(payload) => Outgoing::Frame(payload),
                        None => Outgoing::Close(None),
                    };
                }
            }
        }
    }

    /// Take an already queued frame, if any, while the outbox is open.
    pub fn try_next_frame(&mut self) -> Option<Payload> {
        if matches!(*self.state_rx.borrow(), OutboxState::Closed(_)) {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Mark the outbox closed from the consumer side.
    pub fn close(&self) {
        self.state.send_if_modified(|state| {
            if *state == OutboxState::Open {
                *state = OutboxState::Closed(None);
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
#[path = "outbox_test.rs"]
mod tests;
