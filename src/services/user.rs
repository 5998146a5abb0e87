//! User lookup.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_guest: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("user not found: {0}")]
    NotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserService: Send + Sync {
    /// Load a user by id.
    ///
    /// # Errors
    ///
    /// `NotFound` when no such user exists.
    async fn get_user(&self, id: Uuid) -> Result<User, UserError>;
}

pub struct PgUserService {
    pool: PgPool,
}

impl PgUserService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserService for PgUserService {
    async fn get_user(&self, id: Uuid) -> Result<User, UserError> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>, bool)>(
            "SELECT id, name, email, is_guest FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((id, name, email, is_guest)) = row else {
            return Err(UserError::NotFound(id));
        };
        Ok(User { id, name, email, is_guest })
    }
}
