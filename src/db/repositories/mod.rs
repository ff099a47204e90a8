//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the storage operations for one entity.

pub mod session;
pub mod task;
pub mod user;

#[cfg(feature = "redis-sessions")]
pub mod redis_session;

pub use session::{SessionRepository, SqlxSessionRepository};
pub use task::{JoinOutcome, SqlxTaskRepository, TaskRepository};
pub use user::{SqlxUserRepository, UserRepository};

#[cfg(feature = "redis-sessions")]
pub use redis_session::RedisSessionRepository;

use anyhow::{Context, Result};
use uuid::Uuid;

/// Parse an identifier column stored as text
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).with_context(|| format!("Invalid identifier in database: {}", value))
}
