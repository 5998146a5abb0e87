//! Post and post group persistence, plus field validation.
//!
//! DESIGN
//! ======
//! Validation runs before any storage access and reports only the first
//! failing field, in declaration order. The message is client-facing:
//! `"<field> is a required field"` for an absent value, otherwise
//! `"Invalid input on <field>"`.
//!
//! Every post belongs to a post group on the same board. Creating a post
//! without a group starts a fresh group at the post's position. Deleting a
//! group deletes its posts.
//!
//! Update and delete are scoped to a board. An id that exists on some
//! other board is reported as not found.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

pub const COLOR_LEN: usize = 7;

/// Order assigned when a create leaves `post_order` unset or zero.
pub const DEFAULT_POST_ORDER: f64 = 1.0;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PostError {
    #[error("{0}")]
    Validation(String),
    #[error("post not found: {0}")]
    NotFound(Uuid),
    #[error("post group not found: {0}")]
    GroupNotFound(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl PostError {
    fn required(field: &str) -> Self {
        Self::Validation(format!("{field} is a required field"))
    }

    fn invalid(field: &str) -> Self {
        Self::Validation(format!("Invalid input on {field}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub board_id: Uuid,
    pub user_id: Uuid,
    pub post_group_id: Uuid,
    pub content: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub color: String,
    pub height: i32,
    pub z_index: i32,
    pub post_order: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostGroup {
    pub id: Uuid,
    pub board_id: Uuid,
    pub title: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub z_index: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

// =============================================================================
// INPUTS
// =============================================================================

#[derive(Debug, Clone)]
pub struct CreatePostInput {
    pub user_id: Uuid,
    pub board_id: Uuid,
    pub content: String,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub color: Option<String>,
    pub height: i32,
    pub z_index: i32,
    pub post_order: Option<f64>,
    pub post_group_id: Option<String>,
}

/// Checked create input with every required field present.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: Uuid,
    pub board_id: Uuid,
    pub content: String,
    pub pos_x: i32,
    pub pos_y: i32,
    pub color: String,
    pub height: i32,
    pub z_index: i32,
    pub post_order: f64,
    /// `None` starts a new group.
    pub post_group_id: Option<Uuid>,
}

impl CreatePostInput {
    /// # Errors
    ///
    /// `Validation` naming the first failing field.
    pub fn validate(self) -> Result<NewPost, PostError> {
        let pos_x = required_min(self.pos_x, "pos_x", 0)?;
        let pos_y = required_min(self.pos_y, "pos_y", 0)?;
        let color = match self.color {
            Some(color) if !color.is_empty() => check_color(color)?,
            _ => return Err(PostError::required("color")),
        };
        check_min(self.height, "height", 0)?;
        check_min(self.z_index, "z_index", 1)?;
        let post_order = match self.post_order.map(check_order).transpose()? {
            Some(order) if order > 0.0 => order,
            _ => DEFAULT_POST_ORDER,
        };
        let post_group_id = optional_id(self.post_group_id.as_deref(), "post_group_id")?;

        Ok(NewPost {
            user_id: self.user_id,
            board_id: self.board_id,
            content: self.content,
            pos_x,
            pos_y,
            color,
            height: self.height,
            z_index: self.z_index,
            post_order,
            post_group_id,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostInput {
    pub id: Option<String>,
    pub board_id: Uuid,
    pub content: Option<String>,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub color: Option<String>,
    pub height: Option<i32>,
    pub z_index: Option<i32>,
    pub post_order: Option<f64>,
    pub post_group_id: Option<String>,
}

/// Ids parsed out of a valid update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostTarget {
    pub id: Uuid,
    /// Group the post moves into, when present.
    pub post_group_id: Option<Uuid>,
}

impl UpdatePostInput {
    /// Check the present fields and return the parsed ids.
    ///
    /// # Errors
    ///
    /// `Validation` naming the first failing field.
    pub fn validate(&self) -> Result<PostTarget, PostError> {
        let id = required_id(self.id.as_deref(), "id")?;
        if let Some(x) = self.pos_x {
            check_min(x, "pos_x", 0)?;
        }
        if let Some(y) = self.pos_y {
            check_min(y, "pos_y", 0)?;
        }
        if let Some(color) = &self.color {
            if color.chars().count() != COLOR_LEN {
                return Err(PostError::invalid("color"));
            }
        }
        if let Some(height) = self.height {
            check_min(height, "height", 0)?;
        }
        if let Some(z) = self.z_index {
            check_min(z, "z_index", 1)?;
        }
        if let Some(order) = self.post_order {
            check_order(order)?;
        }
        let post_group_id = optional_id(self.post_group_id.as_deref(), "post_group_id")?;
        Ok(PostTarget { id, post_group_id })
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePostGroupInput {
    pub id: Option<String>,
    pub board_id: Uuid,
    pub title: Option<String>,
    pub pos_x: Option<i32>,
    pub pos_y: Option<i32>,
    pub z_index: Option<i32>,
}

impl UpdatePostGroupInput {
    /// Check the present fields and return the parsed group id.
    ///
    /// # Errors
    ///
    /// `Validation` naming the first failing field.
    pub fn validate(&self) -> Result<Uuid, PostError> {
        let id = required_id(self.id.as_deref(), "id")?;
        if let Some(x) = self.pos_x {
            check_min(x, "pos_x", 0)?;
        }
        if let Some(y) = self.pos_y {
            check_min(y, "pos_y", 0)?;
        }
        if let Some(z) = self.z_index {
            check_min(z, "z_index", 1)?;
        }
        Ok(id)
    }
}

fn required_min(value: Option<i32>, field: &str, min: i32) -> Result<i32, PostError> {
    let value = value.ok_or_else(|| PostError::required(field))?;
    check_min(value, field, min)?;
    Ok(value)
}

fn check_min(value: i32, field: &str, min: i32) -> Result<(), PostError> {
    if value < min { Err(PostError::invalid(field)) } else { Ok(()) }
}

fn check_color(color: String) -> Result<String, PostError> {
    if color.chars().count() == COLOR_LEN { Ok(color) } else { Err(PostError::invalid("color")) }
}

fn check_order(order: f64) -> Result<f64, PostError> {
    if order.is_finite() && order >= 0.0 { Ok(order) } else { Err(PostError::invalid("post_order")) }
}

fn required_id(raw: Option<&str>, field: &str) -> Result<Uuid, PostError> {
    match raw {
        None | Some("") => Err(PostError::required(field)),
        Some(raw) => Uuid::parse_str(raw).map_err(|_| PostError::invalid(field)),
    }
}

/// Absent or empty means "not given".
fn optional_id(raw: Option<&str>, field: &str) -> Result<Option<Uuid>, PostError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => Uuid::parse_str(raw).map(Some).map_err(|_| PostError::invalid(field)),
    }
}

// =============================================================================
// SERVICE
// =============================================================================

#[async_trait]
pub trait PostService: Send + Sync {
    /// Create a post, starting a new group unless one is named.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `GroupNotFound` when the named group is
    /// not on the board, `Database` for storage failures.
    async fn create_post(&self, input: CreatePostInput) -> Result<Post, PostError>;

    /// Apply the present fields to an existing post on `input.board_id`.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `NotFound` when the post is not on that
    /// board, `GroupNotFound` when the target group is not on that board.
    async fn update_post(&self, input: UpdatePostInput) -> Result<Post, PostError>;

    /// # Errors
    ///
    /// `NotFound` when the post is not on `board_id`.
    async fn delete_post(&self, board_id: Uuid, post_id: Uuid) -> Result<(), PostError>;

    /// Apply the present fields to a group on `input.board_id`.
    ///
    /// # Errors
    ///
    /// `Validation` for bad input, `GroupNotFound` when the group is not on
    /// that board.
    async fn update_post_group(&self, input: UpdatePostGroupInput) -> Result<PostGroup, PostError>;

    /// Delete a group and every post in it.
    ///
    /// # Errors
    ///
    /// `GroupNotFound` when the group is not on `board_id`.
    async fn delete_post_group(&self, board_id: Uuid, group_id: Uuid) -> Result<(), PostError>;
}

// =============================================================================
// POSTGRES
// =============================================================================

type PostRow = (Uuid, Uuid, Uuid, Uuid, String, i32, i32, String, i32, i32, f64, OffsetDateTime, OffsetDateTime);
type GroupRow = (Uuid, Uuid, String, i32, i32, i32, OffsetDateTime, OffsetDateTime);

const POST_COLUMNS: &str =
    "id, board_id, user_id, post_group_id, content, pos_x, pos_y, color, height, z_index, post_order, created_at, updated_at";
const GROUP_COLUMNS: &str = "id, board_id, title, pos_x, pos_y, z_index, created_at, updated_at";

fn post_from_row(row: PostRow) -> Post {
    let (id, board_id, user_id, post_group_id, content, pos_x, pos_y, color, height, z_index, post_order, created_at, updated_at) =
        row;
    Post {
        id,
        board_id,
        user_id,
        post_group_id,
        content,
        pos_x,
        pos_y,
        color,
        height,
        z_index,
        post_order,
        created_at,
        updated_at,
    }
}

fn group_from_row(row: GroupRow) -> PostGroup {
    let (id, board_id, title, pos_x, pos_y, z_index, created_at, updated_at) = row;
    PostGroup { id, board_id, title, pos_x, pos_y, z_index, created_at, updated_at }
}

pub struct PgPostService {
    pool: PgPool,
}

impl PgPostService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Fail with `GroupNotFound` unless `group_id` lives on `board_id`.
async fn ensure_group<'e, E>(executor: E, board_id: Uuid, group_id: Uuid) -> Result<(), PostError>
where
    E: sqlx::PgExecutor<'e>,
{
    let found: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM post_groups WHERE id = $1 AND board_id = $2")
        .bind(group_id)
        .bind(board_id)
        .fetch_optional(executor)
        .await?;
    found.map(|_| ()).ok_or(PostError::GroupNotFound(group_id))
}

#[async_trait]
impl PostService for PgPostService {
    async fn create_post(&self, input: CreatePostInput) -> Result<Post, PostError> {
        let post = input.validate()?;
        let mut tx = self.pool.begin().await?;

        let group_id = match post.post_group_id {
            Some(group_id) => {
                ensure_group(&mut *tx, post.board_id, group_id).await?;
                group_id
            }
            None => {
                let group_id = Uuid::new_v4();
                sqlx::query("INSERT INTO post_groups (id, board_id, pos_x, pos_y, z_index) VALUES ($1, $2, $3, $4, $5)")
                    .bind(group_id)
                    .bind(post.board_id)
                    .bind(post.pos_x)
                    .bind(post.pos_y)
                    .bind(post.z_index)
                    .execute(&mut *tx)
                    .await?;
                group_id
            }
        };

        let sql = format!(
            "INSERT INTO posts (id, board_id, user_id, post_group_id, content, pos_x, pos_y, color, height, z_index, post_order)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(post.board_id)
            .bind(post.user_id)
            .bind(group_id)
            .bind(&post.content)
            .bind(post.pos_x)
            .bind(post.pos_y)
            .bind(&post.color)
            .bind(post.height)
            .bind(post.z_index)
            .bind(post.post_order)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(post_from_row(row))
    }

    async fn update_post(&self, input: UpdatePostInput) -> Result<Post, PostError> {
        let target = input.validate()?;
        if let Some(group_id) = target.post_group_id {
            ensure_group(&self.pool, input.board_id, group_id).await?;
        }
        let sql = format!(
            "UPDATE posts SET
                content = COALESCE($3, content),
                pos_x = COALESCE($4, pos_x),
                pos_y = COALESCE($5, pos_y),
                color = COALESCE($6, color),
                height = COALESCE($7, height),
                z_index = COALESCE($8, z_index),
                post_order = COALESCE($9, post_order),
                post_group_id = COALESCE($10, post_group_id),
                updated_at = now()
             WHERE id = $1 AND board_id = $2
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(target.id)
            .bind(input.board_id)
            .bind(&input.content)
            .bind(input.pos_x)
            .bind(input.pos_y)
            .bind(&input.color)
            .bind(input.height)
            .bind(input.z_index)
            .bind(input.post_order)
            .bind(target.post_group_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(post_from_row).ok_or(PostError::NotFound(target.id))
    }

    async fn delete_post(&self, board_id: Uuid, post_id: Uuid) -> Result<(), PostError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1 AND board_id = $2")
            .bind(post_id)
            .bind(board_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PostError::NotFound(post_id));
        }
        Ok(())
    }

    async fn update_post_group(&self, input: UpdatePostGroupInput) -> Result<PostGroup, PostError> {
        let id = input.validate()?;
        let sql = format!(
            "UPDATE post_groups SET
                title = COALESCE($3, title),
                pos_x = COALESCE($4, pos_x),
                pos_y = COALESCE($5, pos_y),
                z_index = COALESCE($6, z_index),
                updated_at = now()
             WHERE id = $1 AND board_id = $2
             RETURNING {GROUP_COLUMNS}"
        );
        let row = sqlx::query_as::<_, GroupRow>(&sql)
            .bind(id)
            .bind(input.board_id)
            .bind(&input.title)
            .bind(input.pos_x)
            .bind(input.pos_y)
            .bind(input.z_index)
            .fetch_optional(&self.pool)
            .await?;
        row.map(group_from_row).ok_or(PostError::GroupNotFound(id))
    }

    async fn delete_post_group(&self, board_id: Uuid, group_id: Uuid) -> Result<(), PostError> {
        // Posts go with the group through ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM post_groups WHERE id = $1 AND board_id = $2")
            .bind(group_id)
            .bind(board_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(PostError::GroupNotFound(group_id));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "post_test.rs"]
mod tests;
