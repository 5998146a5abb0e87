//! Dispatcher — routes one inbound text frame to its event handler.
//!
//! DESIGN
//! ======
//! Handler functions validate, call collaborators, and return an `Outcome`.
//! They never touch an outbox directly. `apply` owns delivery: a reply goes
//! to the originating connection, a broadcast goes through the board hub
//! (which includes the originator when it is a member).
//!
//! Handler faults come back as `ProtocolError` and end the connection with
//! the matching close frame. Everything else a client can get wrong is an
//! in-band `success: false` response and the connection stays open.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::connection::{Connection, Membership};
use crate::frame::{
    AuthenticateParams, AuthenticateResult, BoardConnectParams, BoardConnectResult, CloseReason, ERR_MSG_BOARD_NOT_FOUND,
    ERR_MSG_INTERNAL, ERR_MSG_INVALID_JWT, ERR_MSG_POST_GROUP_NOT_FOUND, ERR_MSG_POST_NOT_FOUND, ERR_MSG_UNAUTHORIZED, Event,
    PostCreateParams, PostDeleteParams, PostDeleteResult, PostFocusParams, PostFocusResult, PostGroupDeleteParams,
    PostGroupDeleteResult, PostGroupUpdateParams, PostUpdateParams, ProtocolError, Request, Response,
};
use crate::hub::{HubRef, Member};
use crate::services::board::BoardError;
use crate::services::post::{CreatePostInput, PostError, UpdatePostGroupInput, UpdatePostInput};
use crate::services::user::{User, UserError};
use crate::state::AppState;

// =============================================================================
// OUTCOME
// =============================================================================

/// What a handler wants delivered. Handlers never send frames directly.
enum Outcome {
    /// Send to the originating connection only.
    Reply(Response),
    /// Send to every member of the board hub.
    Broadcast { hub: HubRef, response: Response },
}

// =============================================================================
// ENTRY POINT
// =============================================================================

/// Handle one inbound text frame. `Err` carries the close frame the
/// connection must be terminated with.
///
/// # Errors
///
/// Returns the close reason for any fatal protocol fault.
pub async fn handle_message(state: &AppState, conn: &mut Connection, text: &str) -> Result<(), CloseReason> {
    dispatch(state, conn, text).await.map_err(|e| {
        let close = e.close_reason();
        warn!(conn_id = %conn.id, code = close.code, reason = close.reason, error = %e, "ws: closing connection");
        close
    })
}

async fn dispatch(state: &AppState, conn: &mut Connection, text: &str) -> Result<(), ProtocolError> {
    let req = Request::decode(text)?;

    if req.event != Event::UserAuthenticate && conn.user.is_none() {
        return Err(ProtocolError::Unauthenticated(req.event));
    }

    let outcome = match req.event {
        Event::UserAuthenticate => handle_authenticate(state, conn, &req).await?,
        Event::BoardConnect => handle_board_connect(state, conn, &req).await?,
        Event::PostCreate => handle_post_create(state, conn, &req).await?,
        Event::PostUpdate => handle_post_update(state, conn, &req).await?,
        Event::PostDelete => handle_post_delete(state, conn, &req).await?,
        Event::PostFocus => handle_post_focus(conn, &req)?,
        Event::PostGroupUpdate => handle_post_group_update(state, conn, &req).await?,
        Event::PostGroupDelete => handle_post_group_delete(state, conn, &req).await?,
        Event::BoardDisconnect => return Err(ProtocolError::UnknownEvent(req.event.as_str().to_owned())),
    };

    apply(conn, outcome).await
}

async fn apply(conn: &Connection, outcome: Outcome) -> Result<(), ProtocolError> {
    match outcome {
        Outcome::Reply(response) => conn.reply(&response).await,
        Outcome::Broadcast { hub, response } => {
            hub.broadcast(response.encode()?).await;
            Ok(())
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

async fn handle_authenticate(state: &AppState, conn: &mut Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let params: AuthenticateParams = req.params()?;

    let user_id = match state.tokens.verify(&params.jwt) {
        Ok(user_id) => user_id,
        Err(e) => {
            info!(conn_id = %conn.id, error = %e, "ws: authentication failed");
            return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_INVALID_JWT)));
        }
    };

    let user = match state.users.get_user(user_id).await {
        Ok(user) => user,
        Err(UserError::NotFound(_)) => {
            info!(conn_id = %conn.id, %user_id, "ws: authentication failed, unknown user");
            return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_INVALID_JWT)));
        }
        Err(e) => {
            error!(conn_id = %conn.id, %user_id, error = %e, "ws: user lookup failed");
            return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_INTERNAL)));
        }
    };

    let response = Response::ok(event, &AuthenticateResult { user: user.clone() })?;
    info!(conn_id = %conn.id, %user_id, "ws: authenticated");
    conn.user = Some(user);
    Ok(Outcome::Reply(response))
}

async fn handle_board_connect(state: &AppState, conn: &mut Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let user = current_user(conn, event)?;
    let params: BoardConnectParams = req.params()?;
    let not_found = || -> Result<Outcome, ProtocolError> {
        Ok(Outcome::Reply(Response::failure(event, ERR_MSG_BOARD_NOT_FOUND)))
    };

    let Ok(board_id) = Uuid::parse_str(&params.board_id) else {
        return not_found();
    };

    let board = match state.boards.get_board_with_members(board_id).await {
        Ok(board) if board.user_has_access(user.id) => board,
        Ok(_) => {
            info!(conn_id = %conn.id, %board_id, user_id = %user.id, "ws: board access denied");
            return not_found();
        }
        Err(BoardError::NotFound(_)) => return not_found(),
        Err(e) => {
            error!(conn_id = %conn.id, %board_id, error = %e, "ws: board lookup failed");
            return not_found();
        }
    };

    if let Some(membership) = conn.boards.get(&board_id) {
        let connected_users = membership.hub.list_users(Some(conn.id)).await;
        let result = BoardConnectResult { board_id, new_user: user, connected_users };
        return Ok(Outcome::Reply(Response::ok(event, &result)?));
    }

    let member = Member { conn_id: conn.id, user: user.clone(), outbox: conn.outbox.clone() };
    let (hub, connected_users) = state.registry.join(board_id, member).await;
    conn.boards.insert(board_id, Membership { can_write: true, hub: hub.clone() });
    info!(conn_id = %conn.id, board_id = %board.id, board_name = ?board.name, user_id = %user.id, "ws: board joined");

    let result = BoardConnectResult { board_id, new_user: user, connected_users };
    Ok(Outcome::Broadcast { hub, response: Response::ok(event, &result)? })
}

// =============================================================================
// POSTS
// =============================================================================

async fn handle_post_create(state: &AppState, conn: &Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let user = current_user(conn, event)?;
    let params: PostCreateParams = req.params()?;
    let Some((board_id, hub)) = writable(conn, &params.board_id) else {
        return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_UNAUTHORIZED)));
    };

    let input = CreatePostInput {
        user_id: user.id,
        board_id,
        content: params.content,
        pos_x: params.pos_x,
        pos_y: params.pos_y,
        color: params.color,
        height: params.height,
        z_index: params.z_index,
        post_order: params.post_order,
        post_group_id: params.post_group_id,
    };
    match state.posts.create_post(input).await {
        Ok(post) => Ok(Outcome::Broadcast { hub, response: Response::ok(event, &post)? }),
        Err(e) => Ok(Outcome::Reply(post_failure(conn, event, e))),
    }
}

async fn handle_post_update(state: &AppState, conn: &Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let params: PostUpdateParams = req.params()?;
    let Some((board_id, hub)) = writable(conn, &params.board_id) else {
        return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_UNAUTHORIZED)));
    };

    let input = UpdatePostInput {
        id: params.id,
        board_id,
        content: params.content,
        pos_x: params.pos_x,
        pos_y: params.pos_y,
        color: params.color,
        height: params.height,
        z_index: params.z_index,
        post_order: params.post_order,
        post_group_id: params.post_group_id,
    };
    match state.posts.update_post(input).await {
        Ok(post) => Ok(Outcome::Broadcast { hub, response: Response::ok(event, &post)? }),
        Err(e) => Ok(Outcome::Reply(post_failure(conn, event, e))),
    }
}

async fn handle_post_delete(state: &AppState, conn: &Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let params: PostDeleteParams = req.params()?;
    let Some((board_id, hub)) = writable(conn, &params.board_id) else {
        return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_UNAUTHORIZED)));
    };
    let Ok(post_id) = Uuid::parse_str(&params.post_id) else {
        return Ok(Outcome::Reply(Response::failure(event, "Invalid input on post_id")));
    };

    match state.posts.delete_post(board_id, post_id).await {
        Ok(()) => {
            let response = Response::ok(event, &PostDeleteResult { post_id, board_id })?;
            Ok(Outcome::Broadcast { hub, response })
        }
        Err(e) => Ok(Outcome::Reply(post_failure(conn, event, e))),
    }
}

/// Focus is transient UI state: relayed to the board, never stored.
fn handle_post_focus(conn: &Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let user = current_user(conn, event)?;
    let params: PostFocusParams = req.params()?;
    let Some((board_id, hub)) = writable(conn, &params.board_id) else {
        return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_UNAUTHORIZED)));
    };
    let Ok(id) = Uuid::parse_str(&params.id) else {
        return Ok(Outcome::Reply(Response::failure(event, "Invalid input on id")));
    };

    let response = Response::ok(event, &PostFocusResult { id, board_id, user })?;
    Ok(Outcome::Broadcast { hub, response })
}

// =============================================================================
// POST GROUPS
// =============================================================================

async fn handle_post_group_update(state: &AppState, conn: &Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let params: PostGroupUpdateParams = req.params()?;
    let Some((board_id, hub)) = writable(conn, &params.board_id) else {
        return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_UNAUTHORIZED)));
    };

    let input = UpdatePostGroupInput {
        id: params.id,
        board_id,
        title: params.title,
        pos_x: params.pos_x,
        pos_y: params.pos_y,
        z_index: params.z_index,
    };
    match state.posts.update_post_group(input).await {
        Ok(group) => Ok(Outcome::Broadcast { hub, response: Response::ok(event, &group)? }),
        Err(e) => Ok(Outcome::Reply(post_failure(conn, event, e))),
    }
}

async fn handle_post_group_delete(state: &AppState, conn: &Connection, req: &Request) -> Result<Outcome, ProtocolError> {
    let event = req.event;
    let params: PostGroupDeleteParams = req.params()?;
    let Some((board_id, hub)) = writable(conn, &params.board_id) else {
        return Ok(Outcome::Reply(Response::failure(event, ERR_MSG_UNAUTHORIZED)));
    };
    let Ok(id) = Uuid::parse_str(&params.post_group_id) else {
        return Ok(Outcome::Reply(Response::failure(event, "Invalid input on post_group_id")));
    };

    match state.posts.delete_post_group(board_id, id).await {
        Ok(()) => {
            let response = Response::ok(event, &PostGroupDeleteResult { id, board_id })?;
            Ok(Outcome::Broadcast { hub, response })
        }
        Err(e) => Ok(Outcome::Reply(post_failure(conn, event, e))),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn current_user(conn: &Connection, event: Event) -> Result<User, ProtocolError> {
    conn.user.clone().ok_or(ProtocolError::Unauthenticated(event))
}

/// Resolve a board id the connection may write to.
fn writable(conn: &Connection, raw_board_id: &str) -> Option<(Uuid, HubRef)> {
    let board_id = Uuid::parse_str(raw_board_id).ok()?;
    if !conn.can_write(board_id) {
        return None;
    }
    conn.boards.get(&board_id).map(|m| (board_id, m.hub.clone()))
}

fn post_failure(conn: &Connection, event: Event, err: PostError) -> Response {
    match err {
        PostError::Validation(message) => Response::failure(event, message),
        PostError::NotFound(post_id) => {
            info!(conn_id = %conn.id, %post_id, %event, "ws: post not found");
            Response::failure(event, ERR_MSG_POST_NOT_FOUND)
        }
        PostError::GroupNotFound(post_group_id) => {
            info!(conn_id = %conn.id, %post_group_id, %event, "ws: post group not found");
            Response::failure(event, ERR_MSG_POST_GROUP_NOT_FOUND)
        }
        PostError::Database(e) => {
            error!(conn_id = %conn.id, %event, error = %e, "ws: post storage failed");
            Response::failure(event, ERR_MSG_INTERNAL)
        }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
