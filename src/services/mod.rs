//! Services layer - Business logic
//!
//! Services validate input, apply the domain rules and translate repository
//! results into typed errors. They hold their repositories behind trait
//! objects and are shared across handlers through `AppState`.

pub mod password;
pub mod session;
pub mod suggest;
pub mod task;
pub mod user;

pub use password::{hash_password, verify_password};
pub use session::SessionStore;
pub use suggest::{build_suggester, KeywordSuggester, LlmSuggester, SuggestError, TagSuggester};
pub use task::{NewTask, TaskService, TaskServiceError};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
