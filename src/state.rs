//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor and
//! handed to every connection. It holds the collaborator services behind
//! trait objects, the hub registry, and the websocket settings.

use std::sync::Arc;

use crate::config::WsConfig;
use crate::hub::registry::HubRegistry;
use crate::services::board::BoardService;
use crate::services::post::PostService;
use crate::services::token::TokenService;
use crate::services::user::UserService;

/// Clone is required by Axum; every field is Arc-backed or Copy.
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<dyn TokenService>,
    pub users: Arc<dyn UserService>,
    pub boards: Arc<dyn BoardService>,
    pub posts: Arc<dyn PostService>,
    pub registry: HubRegistry,
    pub ws: WsConfig,
}

impl AppState {
    /// Must be called inside a Tokio runtime: the registry starts its reaper.
    #[must_use]
    pub fn new(
        tokens: Arc<dyn TokenService>,
        users: Arc<dyn UserService>,
        boards: Arc<dyn BoardService>,
        posts: Arc<dyn PostService>,
        ws: WsConfig,
    ) -> Self {
        Self { tokens, users, boards, posts, registry: HubRegistry::new(), ws }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use uuid::Uuid;

    use super::*;
    use crate::services::memory::{MemoryBoards, MemoryPosts, MemoryUsers};
    use crate::services::token::JwtTokenService;
    use crate::services::user::User;

    pub const TEST_SECRET: &[u8] = b"test-signing-key";

    /// App state over in-memory collaborators, with handles to seed them.
    pub struct Harness {
        pub state: AppState,
        pub users: Arc<MemoryUsers>,
        pub boards: Arc<MemoryBoards>,
        pub posts: Arc<MemoryPosts>,
        pub tokens: Arc<JwtTokenService>,
    }

    impl Harness {
        #[must_use]
        pub fn new() -> Self {
            Self::with_ws(WsConfig::default())
        }

        #[must_use]
        pub fn with_ws(ws: WsConfig) -> Self {
            let users = Arc::new(MemoryUsers::default());
            let boards = Arc::new(MemoryBoards::default());
            let posts = Arc::new(MemoryPosts::default());
            let tokens = Arc::new(JwtTokenService::new(TEST_SECRET, 1));
            let state = AppState::new(tokens.clone(), users.clone(), boards.clone(), posts.clone(), ws);
            Self { state, users, boards, posts, tokens }
        }

        pub fn add_user(&self, name: &str) -> User {
            let user = User { id: Uuid::new_v4(), name: name.into(), email: None, is_guest: false };
            self.users.insert(user.clone());
            user
        }

        /// Create a board owned by `owner` that `members` may also join.
        pub fn add_board(&self, owner: &User, members: &[&User]) -> Uuid {
            let board_id = Uuid::new_v4();
            let member_ids: Vec<Uuid> = members.iter().map(|u| u.id).collect();
            self.boards.insert(board_id, owner.id, &member_ids);
            board_id
        }

        pub fn token_for(&self, user: &User) -> String {
            self.tokens.generate(user.id).unwrap_or_default()
        }
    }
}
