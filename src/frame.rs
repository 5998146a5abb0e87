//! Frame — the JSON envelope spoken over the board socket.
//!
//! ARCHITECTURE
//! ============
//! Clients send `{ "event": <tag>, "params": { ... } }`. The server answers
//! with `{ "event", "success", "result"?, "error_message"? }`, either to the
//! originating connection or fanned out through the board hub.
//!
//! DESIGN
//! ======
//! - Two-stage decode: the envelope first, `params` later. The dispatcher
//!   knows which schema applies only after it has looked at the event tag.
//! - Every decode fault is a `ProtocolError`, and every `ProtocolError` maps
//!   to one websocket close code + reason. Faults never become panics.
//! - Encoded responses are `Payload` (`Arc<str>`) so a broadcast is encoded
//!   once and shared by every member outbox.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use uuid::Uuid;

use crate::services::user::User;

// =============================================================================
// CLOSE CODES AND MESSAGES
// =============================================================================

/// Internal marshal failure.
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
/// Malformed frame or unknown event.
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
/// Protected event before authentication.
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

pub const CLOSE_REASON_BAD_EVENT: &str = "The event field is missing/incorrect.";
pub const CLOSE_REASON_BAD_PARAMS: &str = "The params have incorrect field types.";
pub const CLOSE_REASON_UNSUPPORTED_EVENT: &str = "The event is unsupported.";
pub const CLOSE_REASON_UNAUTHORIZED: &str = "Unauthorized.";
pub const CLOSE_REASON_INTERNAL: &str = "Internal server error.";

pub const ERR_MSG_INVALID_JWT: &str = "Invalid JWT token supplied.";
pub const ERR_MSG_BOARD_NOT_FOUND: &str = "Board not found.";
pub const ERR_MSG_UNAUTHORIZED: &str = "Unauthorized.";
pub const ERR_MSG_INTERNAL: &str = "Internal server error.";
pub const ERR_MSG_POST_NOT_FOUND: &str = "Post not found.";
pub const ERR_MSG_POST_GROUP_NOT_FOUND: &str = "Post group not found.";

// =============================================================================
// TYPES
// =============================================================================

/// One encoded outbound frame, shared between outboxes without copying.
pub type Payload = Arc<str>;

/// Closed set of protocol events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    UserAuthenticate,
    BoardConnect,
    BoardDisconnect,
    PostCreate,
    PostUpdate,
    PostDelete,
    PostFocus,
    PostGroupUpdate,
    PostGroupDelete,
}

impl Event {
    /// Wire tag for this event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UserAuthenticate => "user.authenticate",
            Self::BoardConnect => "board.connect",
            Self::BoardDisconnect => "board.disconnect",
            Self::PostCreate => "post.create",
            Self::PostUpdate => "post.update",
            Self::PostDelete => "post.delete",
            Self::PostFocus => "post.focus",
            Self::PostGroupUpdate => "post_group.update",
            Self::PostGroupDelete => "post_group.delete",
        }
    }

    /// Look up an event a client is allowed to send.
    ///
    /// `board.disconnect` is emitted by the server only, so it is not part
    /// of the inbound table.
    #[must_use]
    pub fn parse_inbound(tag: &str) -> Option<Self> {
        match tag {
            "user.authenticate" => Some(Self::UserAuthenticate),
            "board.connect" => Some(Self::BoardConnect),
            "post.create" => Some(Self::PostCreate),
            "post.update" => Some(Self::PostUpdate),
            "post.delete" => Some(Self::PostDelete),
            "post.focus" => Some(Self::PostFocus),
            "post_group.update" => Some(Self::PostGroupUpdate),
            "post_group.delete" => Some(Self::PostGroupDelete),
            _ => None,
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Close code and reason written in the final control frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: &'static str,
}

/// Faults that end a connection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("envelope is not valid JSON or lacks an event tag")]
    MalformedEnvelope,
    #[error("params do not match the {0} schema")]
    MalformedParams(Event),
    #[error("unsupported event: {0}")]
    UnknownEvent(String),
    #[error("{0} requires an authenticated connection")]
    Unauthenticated(Event),
    #[error("failed to encode {0} response")]
    Encode(String),
}

impl ProtocolError {
    /// Close frame the connection is terminated with.
    #[must_use]
    pub fn close_reason(&self) -> CloseReason {
        match self {
            Self::MalformedEnvelope => CloseReason { code: CLOSE_INVALID_PAYLOAD, reason: CLOSE_REASON_BAD_EVENT },
            Self::MalformedParams(_) => CloseReason { code: CLOSE_INVALID_PAYLOAD, reason: CLOSE_REASON_BAD_PARAMS },
            Self::UnknownEvent(_) => CloseReason { code: CLOSE_INVALID_PAYLOAD, reason: CLOSE_REASON_UNSUPPORTED_EVENT },
            Self::Unauthenticated(_) => CloseReason { code: CLOSE_POLICY_VIOLATION, reason: CLOSE_REASON_UNAUTHORIZED },
            Self::Encode(_) => CloseReason { code: CLOSE_PROTOCOL_ERROR, reason: CLOSE_REASON_INTERNAL },
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

#[derive(Deserialize)]
struct Envelope {
    event: Option<String>,
    params: Option<Box<RawValue>>,
}

/// Decoded request envelope. `params` is still raw JSON.
#[derive(Debug)]
pub struct Request {
    pub event: Event,
    params: Option<Box<RawValue>>,
}

impl Request {
    /// Decode the envelope of one inbound text frame.
    ///
    /// # Errors
    ///
    /// `MalformedEnvelope` for invalid JSON or a missing/empty event tag,
    /// `UnknownEvent` for a tag outside the inbound table.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(|_| ProtocolError::MalformedEnvelope)?;
        let tag = match envelope.event {
            Some(tag) if !tag.is_empty() => tag,
            _ => return Err(ProtocolError::MalformedEnvelope),
        };
        let Some(event) = Event::parse_inbound(&tag) else {
            return Err(ProtocolError::UnknownEvent(tag));
        };
        Ok(Self { event, params: envelope.params })
    }

    /// Decode `params` against the schema of this event.
    ///
    /// # Errors
    ///
    /// `MalformedParams` when params are absent or fail to decode.
    pub fn params<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let Some(raw) = &self.params else {
            return Err(ProtocolError::MalformedParams(self.event));
        };
        serde_json::from_str(raw.get()).map_err(|_| ProtocolError::MalformedParams(self.event))
    }
}

// =============================================================================
// RESPONSE
// =============================================================================

/// Server-to-client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub event: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Response {
    /// Successful response carrying `result`.
    ///
    /// # Errors
    ///
    /// `Encode` if `result` cannot be represented as JSON.
    pub fn ok(event: Event, result: &impl Serialize) -> Result<Self, ProtocolError> {
        let result = serde_json::to_value(result).map_err(|_| ProtocolError::Encode(event.as_str().to_owned()))?;
        Ok(Self { event: event.as_str().to_owned(), success: true, result: Some(result), error_message: None })
    }

    /// Unsuccessful response. The connection stays open.
    #[must_use]
    pub fn failure(event: Event, message: impl Into<String>) -> Self {
        Self { event: event.as_str().to_owned(), success: false, result: None, error_message: Some(message.into()) }
    }

    /// Encode into a shareable outbound payload.
    ///
    /// # Errors
    ///
    /// `Encode` if serialization fails.
    pub fn encode(&self) -> Result<Payload, ProtocolError> {
        serde_json::to_string(self)
            .map(Payload::from)
            .map_err(|_| ProtocolError::Encode(self.event.clone()))
    }
}

// =============================================================================
// PARAMS
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AuthenticateParams {
    pub jwt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoardConnectParams {
    pub board_id: String,
}

/// `post.create` params. Required fields stay optional here so that a
/// missing field is reported by validation rather than closing the socket.
#[derive(Debug, Clone, Deserialize)]
pub struct PostCreateParams {
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub content: String,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub color: Option<String>,
    #[serde(default)]
    pub height: i32,
    #[serde(default)]
    pub z_index: i32,
    pub post_order: Option<f64>,
    pub post_group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostUpdateParams {
    #[serde(default)]
    pub board_id: String,
    pub id: Option<String>,
    pub content: Option<String>,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub color: Option<String>,
    pub height: Option<i32>,
    pub z_index: Option<i32>,
    pub post_order: Option<f64>,
    pub post_group_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostDeleteParams {
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub post_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostFocusParams {
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostGroupUpdateParams {
    #[serde(default)]
    pub board_id: String,
    pub id: Option<String>,
    pub title: Option<String>,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub z_index: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostGroupDeleteParams {
    #[serde(default)]
    pub board_id: String,
    #[serde(default)]
    pub post_group_id: String,
}

// =============================================================================
// RESULTS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateResult {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConnectResult {
    pub board_id: Uuid,
    pub new_user: User,
    pub connected_users: Vec<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardDisconnectResult {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostDeleteResult {
    pub post_id: Uuid,
    pub board_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostGroupDeleteResult {
    pub id: Uuid,
    pub board_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostFocusResult {
    pub id: Uuid,
    pub board_id: Uuid,
    pub user: User,
}

#[cfg(test)]
#[path = "frame_test.rs"]
mod tests;
