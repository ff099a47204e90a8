//! Database layer
//!
//! Storage for users, sessions and tasks on SQLite (default, single file) or
//! MySQL. The driver is selected by configuration; repositories only see the
//! [`DatabasePool`] trait.
//!
//! # Usage
//!
//! ```ignore
//! use taskhive::config::DatabaseConfig;
//! use taskhive::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, Backend, DatabasePool, DynDatabasePool, MysqlDatabase,
    SqliteDatabase,
};

/// Whether an error chain bottoms out in a unique-constraint violation.
///
/// Used to turn races on unique columns into domain errors instead of
/// internal failures.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .is_some_and(|db| db.is_unique_violation())
    })
}
