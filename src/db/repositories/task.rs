//! Task repository
//!
//! Persists tasks and their participant lists, and owns the join operation.
//!
//! Joining is a single conditional write: the `UPDATE` that bumps
//! `participant_count` only matches when the task has a free slot, the user
//! exists and the user is not already a participant. The storage engine
//! evaluates that predicate and performs the increment as one step, so two
//! callers racing for the last slot can never both succeed. The participant
//! row is inserted in the same transaction as the increment.

use crate::db::{is_unique_violation, Backend, DynDatabasePool};
use crate::models::Task;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{MySqlConnection, MySqlPool, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::parse_uuid;

/// Result of a join attempt
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    /// The user was admitted; carries the updated task
    Joined(Task),
    TaskNotFound,
    UserNotFound,
    AlreadyJoined,
    TaskFull,
}

/// Task repository trait
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Persist a new task
    async fn create(&self, task: &Task) -> Result<Task>;

    /// Get task by ID, including its participants
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>>;

    /// List all tasks in creation order
    async fn list(&self) -> Result<Vec<Task>>;

    /// Atomically admit `user_id` into the task's participant list
    async fn join(&self, task_id: Uuid, user_id: Uuid) -> Result<JoinOutcome>;
}

/// SQLx-based task repository implementation
///
/// Supports both SQLite and MySQL databases.
pub struct SqlxTaskRepository {
    pool: DynDatabasePool,
}

impl SqlxTaskRepository {
    /// Create a new SQLx task repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TaskRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TaskRepository for SqlxTaskRepository {
    async fn create(&self, task: &Task) -> Result<Task> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => create_task_sqlite(pool, task).await,
            Backend::Mysql(pool) => create_task_mysql(pool, task).await,
        }
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Task>> {
        let id = id.to_string();
        match self.pool.backend() {
            Backend::Sqlite(pool) => {
                let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
                load_task_sqlite(&mut conn, &id).await
            }
            Backend::Mysql(pool) => {
                let mut conn = pool.acquire().await.context("Failed to acquire connection")?;
                load_task_mysql(&mut conn, &id).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Task>> {
        match self.pool.backend() {
            Backend::Sqlite(pool) => list_tasks_sqlite(pool).await,
            Backend::Mysql(pool) => list_tasks_mysql(pool).await,
        }
    }

    async fn join(&self, task_id: Uuid, user_id: Uuid) -> Result<JoinOutcome> {
        let task_id = task_id.to_string();
        let user_id = user_id.to_string();
        match self.pool.backend() {
            Backend::Sqlite(pool) => join_task_sqlite(pool, &task_id, &user_id).await,
            Backend::Mysql(pool) => join_task_mysql(pool, &task_id, &user_id).await,
        }
    }
}

const INSERT_TASK: &str = r#"
    INSERT INTO tasks
        (id, title, description, tags, capacity, participant_count, creator_id, created_at)
    VALUES (?, ?, ?, ?, ?, 0, ?, ?)
"#;

const SELECT_TASK_BY_ID: &str = r#"
    SELECT id, title, description, tags, capacity, creator_id, created_at
    FROM tasks
    WHERE id = ?
"#;

const SELECT_ALL_TASKS: &str = r#"
    SELECT id, title, description, tags, capacity, creator_id, created_at
    FROM tasks
    ORDER BY seq
"#;

const SELECT_TASK_PARTICIPANTS: &str =
    "SELECT user_id FROM task_participants WHERE task_id = ? ORDER BY seq";

const SELECT_ALL_PARTICIPANTS: &str =
    "SELECT task_id, user_id FROM task_participants ORDER BY seq";

/// Binds: task id, user id, task id, user id
const CLAIM_SLOT: &str = r#"
    UPDATE tasks
    SET participant_count = participant_count + 1
    WHERE id = ?
      AND participant_count < capacity
      AND EXISTS (SELECT 1 FROM users WHERE id = ?)
      AND NOT EXISTS (
          SELECT 1 FROM task_participants WHERE task_id = ? AND user_id = ?
      )
"#;

const INSERT_PARTICIPANT: &str =
    "INSERT INTO task_participants (task_id, user_id, joined_at) VALUES (?, ?, ?)";

const TASK_EXISTS: &str = "SELECT 1 FROM tasks WHERE id = ?";
const USER_EXISTS: &str = "SELECT 1 FROM users WHERE id = ?";
const PARTICIPANT_EXISTS: &str =
    "SELECT 1 FROM task_participants WHERE task_id = ? AND user_id = ?";

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).context("Failed to encode task tags")
}

fn decode_tags(raw: &str) -> Result<Vec<String>> {
    serde_json::from_str(raw).with_context(|| format!("Invalid task tags in database: {}", raw))
}

fn group_participants(pairs: Vec<(String, String)>) -> Result<HashMap<String, Vec<Uuid>>> {
    let mut grouped: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (task_id, user_id) in pairs {
        grouped.entry(task_id).or_default().push(parse_uuid(&user_id)?);
    }
    Ok(grouped)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_task_sqlite(pool: &SqlitePool, task: &Task) -> Result<Task> {
    sqlx::query(INSERT_TASK)
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(encode_tags(&task.tags)?)
        .bind(i64::from(task.capacity))
        .bind(task.creator_id.to_string())
        .bind(task.created_at)
        .execute(pool)
        .await
        .context("Failed to create task")?;

    Ok(Task {
        participants: Vec::new(),
        ..task.clone()
    })
}

async fn load_task_sqlite(conn: &mut SqliteConnection, id: &str) -> Result<Option<Task>> {
    let Some(row) = sqlx::query(SELECT_TASK_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get task by ID")?
    else {
        return Ok(None);
    };

    let participants = sqlx::query(SELECT_TASK_PARTICIPANTS)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to get task participants")?
        .iter()
        .map(|r| parse_uuid(&r.get::<String, _>("user_id")))
        .collect::<Result<Vec<_>>>()?;

    row_to_task_sqlite(&row, participants).map(Some)
}

async fn list_tasks_sqlite(pool: &SqlitePool) -> Result<Vec<Task>> {
    // One read transaction so tasks and participants come from the same snapshot
    let mut tx = pool.begin().await.context("Failed to begin read transaction")?;

    let rows = sqlx::query(SELECT_ALL_TASKS)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list tasks")?;

    let pairs = sqlx::query(SELECT_ALL_PARTICIPANTS)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list task participants")?
        .iter()
        .map(|r| (r.get::<String, _>("task_id"), r.get::<String, _>("user_id")))
        .collect();

    tx.commit().await.context("Failed to finish read transaction")?;

    let mut grouped = group_participants(pairs)?;
    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let participants = grouped.remove(&id).unwrap_or_default();
            row_to_task_sqlite(row, participants)
        })
        .collect()
}

async fn join_task_sqlite(pool: &SqlitePool, task_id: &str, user_id: &str) -> Result<JoinOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin join transaction")?;

    let claimed = sqlx::query(CLAIM_SLOT)
        .bind(task_id)
        .bind(user_id)
        .bind(task_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim task slot")?;

    if claimed.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back join")?;
        return classify_rejection_sqlite(pool, task_id, user_id).await;
    }

    let inserted = sqlx::query(INSERT_PARTICIPANT)
        .bind(task_id)
        .bind(user_id)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to record participant");

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            tx.rollback().await.context("Failed to roll back join")?;
            return Ok(JoinOutcome::AlreadyJoined);
        }
        Err(e) => return Err(e),
    }

    let task = load_task_sqlite(&mut tx, task_id)
        .await?
        .ok_or_else(|| anyhow!("Task {} disappeared during join", task_id))?;

    tx.commit().await.context("Failed to commit join")?;
    Ok(JoinOutcome::Joined(task))
}

/// Work out why the conditional update matched no row
async fn classify_rejection_sqlite(
    pool: &SqlitePool,
    task_id: &str,
    user_id: &str,
) -> Result<JoinOutcome> {
    let task_exists = sqlx::query(TASK_EXISTS)
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up task")?
        .is_some();
    if !task_exists {
        return Ok(JoinOutcome::TaskNotFound);
    }

    let user_exists = sqlx::query(USER_EXISTS)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up user")?
        .is_some();
    if !user_exists {
        return Ok(JoinOutcome::UserNotFound);
    }

    let already_joined = sqlx::query(PARTICIPANT_EXISTS)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up participant")?
        .is_some();

    Ok(if already_joined {
        JoinOutcome::AlreadyJoined
    } else {
        JoinOutcome::TaskFull
    })
}

fn row_to_task_sqlite(row: &sqlx::sqlite::SqliteRow, participants: Vec<Uuid>) -> Result<Task> {
    let id: String = row.get("id");
    let creator_id: String = row.get("creator_id");
    let tags: String = row.get("tags");
    let capacity: i64 = row.get("capacity");

    Ok(Task {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        description: row.get("description"),
        tags: decode_tags(&tags)?,
        capacity: u32::try_from(capacity).context("Task capacity out of range")?,
        creator_id: parse_uuid(&creator_id)?,
        participants,
        created_at: row.get("created_at"),
    })
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_task_mysql(pool: &MySqlPool, task: &Task) -> Result<Task> {
    sqlx::query(INSERT_TASK)
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(encode_tags(&task.tags)?)
        .bind(i64::from(task.capacity))
        .bind(task.creator_id.to_string())
        .bind(task.created_at)
        .execute(pool)
        .await
        .context("Failed to create task")?;

    Ok(Task {
        participants: Vec::new(),
        ..task.clone()
    })
}

async fn load_task_mysql(conn: &mut MySqlConnection, id: &str) -> Result<Option<Task>> {
    let Some(row) = sqlx::query(SELECT_TASK_BY_ID)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to get task by ID")?
    else {
        return Ok(None);
    };

    let participants = sqlx::query(SELECT_TASK_PARTICIPANTS)
        .bind(id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to get task participants")?
        .iter()
        .map(|r| parse_uuid(&r.get::<String, _>("user_id")))
        .collect::<Result<Vec<_>>>()?;

    row_to_task_mysql(&row, participants).map(Some)
}

async fn list_tasks_mysql(pool: &MySqlPool) -> Result<Vec<Task>> {
    let mut tx = pool.begin().await.context("Failed to begin read transaction")?;

    let rows = sqlx::query(SELECT_ALL_TASKS)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list tasks")?;

    let pairs = sqlx::query(SELECT_ALL_PARTICIPANTS)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to list task participants")?
        .iter()
        .map(|r| (r.get::<String, _>("task_id"), r.get::<String, _>("user_id")))
        .collect();

    tx.commit().await.context("Failed to finish read transaction")?;

    let mut grouped = group_participants(pairs)?;
    rows.iter()
        .map(|row| {
            let id: String = row.get("id");
            let participants = grouped.remove(&id).unwrap_or_default();
            row_to_task_mysql(row, participants)
        })
        .collect()
}

async fn join_task_mysql(pool: &MySqlPool, task_id: &str, user_id: &str) -> Result<JoinOutcome> {
    let mut tx = pool.begin().await.context("Failed to begin join transaction")?;

    // InnoDB holds the task row lock from here until commit
    let claimed = sqlx::query(CLAIM_SLOT)
        .bind(task_id)
        .bind(user_id)
        .bind(task_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to claim task slot")?;

    if claimed.rows_affected() == 0 {
        tx.rollback().await.context("Failed to roll back join")?;
        return classify_rejection_mysql(pool, task_id, user_id).await;
    }

    let inserted = sqlx::query(INSERT_PARTICIPANT)
        .bind(task_id)
        .bind(user_id)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await
        .context("Failed to record participant");

    match inserted {
        Ok(_) => {}
        Err(e) if is_unique_violation(&e) => {
            tx.rollback().await.context("Failed to roll back join")?;
            return Ok(JoinOutcome::AlreadyJoined);
        }
        Err(e) => return Err(e),
    }

    let task = load_task_mysql(&mut tx, task_id)
        .await?
        .ok_or_else(|| anyhow!("Task {} disappeared during join", task_id))?;

    tx.commit().await.context("Failed to commit join")?;
    Ok(JoinOutcome::Joined(task))
}

async fn classify_rejection_mysql(
    pool: &MySqlPool,
    task_id: &str,
    user_id: &str,
) -> Result<JoinOutcome> {
    let task_exists = sqlx::query(TASK_EXISTS)
        .bind(task_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up task")?
        .is_some();
    if !task_exists {
        return Ok(JoinOutcome::TaskNotFound);
    }

    let user_exists = sqlx::query(USER_EXISTS)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up user")?
        .is_some();
    if !user_exists {
        return Ok(JoinOutcome::UserNotFound);
    }

    let already_joined = sqlx::query(PARTICIPANT_EXISTS)
        .bind(task_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to look up participant")?
        .is_some();

    Ok(if already_joined {
        JoinOutcome::AlreadyJoined
    } else {
        JoinOutcome::TaskFull
    })
}

fn row_to_task_mysql(row: &sqlx::mysql::MySqlRow, participants: Vec<Uuid>) -> Result<Task> {
    let id: String = row.get("id");
    let creator_id: String = row.get("creator_id");
    let tags: String = row.get("tags");
    let capacity: i32 = row.get("capacity");

    Ok(Task {
        id: parse_uuid(&id)?,
        title: row.get("title"),
        description: row.get("description"),
        tags: decode_tags(&tags)?,
        capacity: u32::try_from(capacity).context("Task capacity out of range")?,
        creator_id: parse_uuid(&creator_id)?,
        participants,
        created_at: row.get("created_at"),
    })
}
