//! Data models
//!
//! Entities shared between the repositories, services and API layer:
//! users, sessions and tasks.

mod session;
mod task;
mod user;

pub use session::Session;
pub use task::{
    normalize_tags, CreateTaskInput, Task, MAX_CAPACITY, MAX_DESCRIPTION_LEN, MAX_TAGS,
    MAX_TAG_LEN, MAX_TITLE_LEN,
};
pub use user::{User, MAX_EMAIL_LEN, MAX_USERNAME_LEN};
