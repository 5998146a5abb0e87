//! WebSocket handler — the two pumps behind every board connection.
//!
//! DESIGN
//! ======
//! On upgrade the socket is split. The write half goes to a spawned write
//! pump, the only task that ever writes to the socket. The read half stays
//! with the read pump, the only task that ever reads from it. They share
//! nothing but the connection's outbox:
//! - read pump → dispatcher → replies and hub broadcasts land in outboxes
//! - write pump ← outbox frames, coalesced with `\n`, plus periodic pings
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → spawn write pump → run read pump inline
//! 2. Each pong extends the read deadline by the pong wait; other traffic
//!    does not
//! 3. A fatal protocol fault closes the outbox with a close reason; the
//!    write pump sends that close frame and stops
//! 4. Read pump exit → announce `board.disconnect` on every joined board,
//!    unregister, close the outbox, wait for the write pump

use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::time::{Instant, interval_at, timeout, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WsConfig;
use crate::connection::Connection;
use crate::dispatch;
use crate::frame::{Payload, ProtocolError};
use crate::outbox::{self, OutboxReceiver, Outgoing};
use crate::state::AppState;

/// Most queued frames folded into one text message.
const COALESCE_LIMIT: usize = 256;

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("socket write failed: {0}")]
    Socket(#[from] axum::Error),
    #[error("write deadline exceeded")]
    Deadline,
}

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let limit = state.ws.max_message_size;
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    let (outbox, outbox_rx) = outbox::channel(state.ws.outbox_capacity);
    let mut conn = Connection::new(outbox);
    let conn_id = conn.id;
    info!(%conn_id, "ws: client connected");

    let writer = tokio::spawn(write_pump(sink, outbox_rx, state.ws, conn_id));
    read_pump(stream, &state, &mut conn).await;
    conn.shutdown().await;

    if let Err(e) = writer.await {
        warn!(%conn_id, error = %e, "ws: write pump task failed");
    }
    info!(%conn_id, "ws: client disconnected");
}

async fn read_pump(mut stream: SplitStream<WebSocket>, state: &AppState, conn: &mut Connection) {
    let conn_id = conn.id;
    let mut deadline = Instant::now() + state.ws.pong_wait;

    loop {
        let next = tokio::select! {
            () = conn.outbox.closed() => break,
            next = timeout_at(deadline, stream.next()) => next,
        };
        let msg = match next {
            Err(_) => {
                info!(%conn_id, "ws: read deadline exceeded");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(%conn_id, error = %e, "ws: read failed");
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        let result = match msg {
            Message::Text(text) => dispatch::handle_message(state, conn, text.as_str()).await,
            Message::Binary(bytes) => match std::str::from_utf8(&bytes) {
                Ok(text) => dispatch::handle_message(state, conn, text).await,
                Err(_) => Err(ProtocolError::MalformedEnvelope.close_reason()),
            },
            Message::Pong(_) => {
                deadline = Instant::now() + state.ws.pong_wait;
                continue;
            }
            Message::Ping(_) => continue,
            Message::Close(_) => break,
        };
        if let Err(reason) = result {
            conn.outbox.close_with(Some(reason));
            break;
        }
    }
}

async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: OutboxReceiver,
    ws: WsConfig,
    conn_id: Uuid,
) {
    let mut ping = interval_at(Instant::now() + ws.ping_period, ws.ping_period);

    loop {
        let result = tokio::select! {
            next = outbox.next() => match next {
                Outgoing::Frame(first) => {
                    let text = coalesce(&first, &mut outbox);
                    write(&mut sink, Message::Text(text.into()), ws).await
                }
                Outgoing::Close(reason) => {
                    let frame = reason.map(|r| CloseFrame { code: r.code, reason: Utf8Bytes::from_static(r.reason) });
                    if let Err(e) = write(&mut sink, Message::Close(frame), ws).await {
                        debug!(%conn_id, error = %e, "ws: close frame not delivered");
                    }
                    break;
                }
            },
            _ = ping.tick() => write(&mut sink, Message::Ping(Bytes::new()), ws).await,
        };
        if let Err(e) = result {
            debug!(%conn_id, error = %e, "ws: write failed");
            break;
        }
    }
    outbox.close();
}

/// Fold frames already waiting in the outbox into one message.
fn coalesce(first: &Payload, outbox: &mut OutboxReceiver) -> String {
    let mut text = String::from(&**first);
    for _ in 0..COALESCE_LIMIT {
        let Some(next) = outbox.try_next_frame() else {
            break;
        };
        text.push('\n');
        text.push_str(&next);
    }
    text
}

async fn write(sink: &mut SplitSink<WebSocket, Message>, msg: Message, ws: WsConfig) -> Result<(), WriteError> {
    match timeout(ws.write_wait, sink.send(msg)).await {
        Ok(sent) => Ok(sent?),
        Err(_) => Err(WriteError::Deadline),
    }
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
