//! Board lookup and access checks.
//!
//! Boards themselves are managed elsewhere. The session layer only needs
//! to know who owns a board and who is a member of it.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("board not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipRole {
    Member,
    Admin,
}

impl MembershipRole {
    fn from_db(value: &str) -> Self {
        if value == "ADMIN" { Self::Admin } else { Self::Member }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardMember {
    pub user_id: Uuid,
    pub role: MembershipRole,
}

#[derive(Debug, Clone)]
pub struct BoardWithMembers {
    pub id: Uuid,
    pub name: Option<String>,
    pub owner_id: Uuid,
    pub members: Vec<BoardMember>,
}

impl BoardWithMembers {
    /// The owner and every member may open the board.
    #[must_use]
    pub fn user_has_access(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.members.iter().any(|m| m.user_id == user_id)
    }
}

#[async_trait]
pub trait BoardService: Send + Sync {
    /// Load a board with its membership list.
    ///
    /// # Errors
    ///
    /// `NotFound` when the board does not exist.
    async fn get_board_with_members(&self, board_id: Uuid) -> Result<BoardWithMembers, BoardError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

pub struct PgBoardService {
    pool: PgPool,
}

impl PgBoardService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BoardService for PgBoardService {
    async fn get_board_with_members(&self, board_id: Uuid) -> Result<BoardWithMembers, BoardError> {
        let board = sqlx::query_as::<_, (Uuid, Option<String>, Uuid)>(
            "SELECT id, name, owner_id FROM boards WHERE id = $1",
        )
        .bind(board_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, name, owner_id)) = board else {
            return Err(BoardError::NotFound(board_id));
        };

        let rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT user_id, role FROM board_memberships WHERE board_id = $1 ORDER BY created_at",
        )
        .bind(board_id)
        .fetch_all(&self.pool)
        .await?;

        let members = rows
            .into_iter()
            .map(|(user_id, role)| BoardMember { user_id, role: MembershipRole::from_db(&role) })
            .collect();

        Ok(BoardWithMembers { id, name, owner_id, members })
    }
}

#[cfg(test)]
#[path = "board_test.rs"]
mod tests;
