//! Collaborator services the board session layer talks to.
//!
//! ARCHITECTURE
//! ============
//! Each service is a trait so the dispatcher can run against Postgres in
//! production and against in-memory fakes in tests. The session layer only
//! ever holds `Arc<dyn ...>` handles from `AppState`.

pub mod board;
#[cfg(test)]
pub mod memory;
pub mod post;
pub mod token;
pub mod user;
