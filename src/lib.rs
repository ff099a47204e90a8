//! Taskhive - capacity-bounded collaborative tasks
//!
//! Users publish tasks with a participant limit, others join until the limit
//! is reached, and a tag assistant suggests descriptive tags. Joins are
//! admitted by a single conditional write in the database, so capacity and
//! uniqueness hold under concurrent requests.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
