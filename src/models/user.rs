//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Longest accepted username, in characters (`VARCHAR(64)`)
pub const MAX_USERNAME_LEN: usize = 64;

/// Longest accepted email, in characters (`VARCHAR(255)`)
pub const MAX_EMAIL_LEN: usize = 255;

/// A registered user.
///
/// `username` and `email` are unique across the system and compared exactly
/// (no case folding). Users are never mutated or deleted after registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: Uuid,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2id PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new User with a fresh identifier.
    ///
    /// The password must already be hashed; see `services::password::hash_password`.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            created_at: Utc::now(),
        }
    }
}
