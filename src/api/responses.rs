//! Response bodies shared by the handlers
//!
//! All payloads use camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Task, User};

/// Public view of a user; the password hash never leaves the server
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub capacity: u32,
    pub creator_id: Uuid,
    pub participants: Vec<Uuid>,
    pub remaining_slots: u32,
    pub created_at: DateTime<Utc>,
}

impl From<Task> for TaskResponse {
    fn from(task: Task) -> Self {
        let remaining_slots = task.remaining_slots();
        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            tags: task.tags,
            capacity: task.capacity,
            creator_id: task.creator_id,
            participants: task.participants,
            remaining_slots,
            created_at: task.created_at,
        }
    }
}

/// Returned by a successful login
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}
