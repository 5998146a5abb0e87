//! In-memory collaborators for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use super::board::{BoardError, BoardMember, BoardService, BoardWithMembers, MembershipRole};
use super::post::{CreatePostInput, Post, PostError, PostGroup, PostService, UpdatePostGroupInput, UpdatePostInput};
use super::user::{User, UserError, UserService};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUsers {
    pub fn insert(&self, user: User) {
        lock(&self.users).insert(user.id, user);
    }
}

#[async_trait]
impl UserService for MemoryUsers {
    async fn get_user(&self, id: Uuid) -> Result<User, UserError> {
        lock(&self.users).get(&id).cloned().ok_or(UserError::NotFound(id))
    }
}

#[derive(Default)]
pub struct MemoryBoards {
    boards: Mutex<HashMap<Uuid, BoardWithMembers>>,
}

impl MemoryBoards {
    /// Add a board owned by `owner_id` with plain `members`.
    pub fn insert(&self, board_id: Uuid, owner_id: Uuid, members: &[Uuid]) {
        let members = members
            .iter()
            .map(|&user_id| BoardMember { user_id, role: MembershipRole::Member })
            .collect();
        lock(&self.boards).insert(board_id, BoardWithMembers { id: board_id, name: None, owner_id, members });
    }
}

#[async_trait]
impl BoardService for MemoryBoards {
    async fn get_board_with_members(&self, board_id: Uuid) -> Result<BoardWithMembers, BoardError> {
        lock(&self.boards).get(&board_id).cloned().ok_or(BoardError::NotFound(board_id))
    }
}

#[derive(Default)]
pub struct MemoryPosts {
    posts: Mutex<HashMap<Uuid, Post>>,
    groups: Mutex<HashMap<Uuid, PostGroup>>,
    calls: AtomicUsize,
    fail: AtomicBool,
}

impl MemoryPosts {
    /// Number of storage operations reached after validation.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make every following storage operation fail with a database error.
    pub fn fail_storage(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn get(&self, id: Uuid) -> Option<Post> {
        lock(&self.posts).get(&id).cloned()
    }

    pub fn group(&self, id: Uuid) -> Option<PostGroup> {
        lock(&self.groups).get(&id).cloned()
    }

    fn enter(&self) -> Result<(), PostError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PostError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }

    fn ensure_group(&self, board_id: Uuid, group_id: Uuid) -> Result<(), PostError> {
        match lock(&self.groups).get(&group_id) {
            Some(group) if group.board_id == board_id => Ok(()),
            _ => Err(PostError::GroupNotFound(group_id)),
        }
    }
}

#[async_trait]
impl PostService for MemoryPosts {
    async fn create_post(&self, input: CreatePostInput) -> Result<Post, PostError> {
        let new = input.validate()?;
        self.enter()?;
        let now = OffsetDateTime::now_utc();
        let post_group_id = match new.post_group_id {
            Some(group_id) => {
                self.ensure_group(new.board_id, group_id)?;
                group_id
            }
            None => {
                let group = PostGroup {
                    id: Uuid::new_v4(),
                    board_id: new.board_id,
                    title: String::new(),
                    pos_x: new.pos_x,
                    pos_y: new.pos_y,
                    z_index: new.z_index,
                    created_at: now,
                    updated_at: now,
                };
                let id = group.id;
                lock(&self.groups).insert(id, group);
                id
            }
        };
        let post = Post {
            id: Uuid::new_v4(),
            board_id: new.board_id,
            user_id: new.user_id,
            post_group_id,
            content: new.content,
            pos_x: new.pos_x,
            pos_y: new.pos_y,
            color: new.color,
            height: new.height,
            z_index: new.z_index,
            post_order: new.post_order,
            created_at: now,
            updated_at: now,
        };
        lock(&self.posts).insert(post.id, post.clone());
        Ok(post)
    }

    async fn update_post(&self, input: UpdatePostInput) -> Result<Post, PostError> {
        let target = input.validate()?;
        self.enter()?;
        if let Some(group_id) = target.post_group_id {
            self.ensure_group(input.board_id, group_id)?;
        }
        let mut posts = lock(&self.posts);
        let post = posts
            .get_mut(&target.id)
            .filter(|p| p.board_id == input.board_id)
            .ok_or(PostError::NotFound(target.id))?;
        if let Some(content) = input.content {
            post.content = content;
        }
        if let Some(x) = input.pos_x {
            post.pos_x = x;
        }
        if let Some(y) = input.pos_y {
            post.pos_y = y;
        }
        if let Some(color) = input.color {
            post.color = color;
        }
        if let Some(height) = input.height {
            post.height = height;
        }
        if let Some(z) = input.z_index {
            post.z_index = z;
        }
        if let Some(order) = input.post_order {
            post.post_order = order;
        }
        if let Some(group_id) = target.post_group_id {
            post.post_group_id = group_id;
        }
        post.updated_at = OffsetDateTime::now_utc();
        Ok(post.clone())
    }

    async fn delete_post(&self, board_id: Uuid, post_id: Uuid) -> Result<(), PostError> {
        self.enter()?;
        let mut posts = lock(&self.posts);
        match posts.get(&post_id) {
            Some(post) if post.board_id == board_id => {
                posts.remove(&post_id);
                Ok(())
            }
            _ => Err(PostError::NotFound(post_id)),
        }
    }

    async fn update_post_group(&self, input: UpdatePostGroupInput) -> Result<PostGroup, PostError> {
        let id = input.validate()?;
        self.enter()?;
        let mut groups = lock(&self.groups);
        let group = groups
            .get_mut(&id)
            .filter(|g| g.board_id == input.board_id)
            .ok_or(PostError::GroupNotFound(id))?;
        if let Some(title) = input.title {
            group.title = title;
        }
        if let Some(x) = input.pos_x {
            group.pos_x = x;
        }
        if let Some(y) = input.pos_y {
            group.pos_y = y;
        }
        if let Some(z) = input.z_index {
            group.z_index = z;
        }
        group.updated_at = OffsetDateTime::now_utc();
        Ok(group.clone())
    }

    async fn delete_post_group(&self, board_id: Uuid, group_id: Uuid) -> Result<(), PostError> {
        self.enter()?;
        self.ensure_group(board_id, group_id)?;
        lock(&self.groups).remove(&group_id);
        lock(&self.posts).retain(|_, post| post.post_group_id != group_id);
        Ok(())
    }
}
