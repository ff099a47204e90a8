//! Task service
//!
//! Validates task input and turns [`JoinOutcome`]s from the repository into
//! typed errors. Capacity and duplicate checks live in the repository's
//! conditional write; this layer never reads a task to decide whether a join
//! may proceed.

use crate::db::repositories::{JoinOutcome, TaskRepository, UserRepository};
use crate::models::{
    normalize_tags, CreateTaskInput, Task, MAX_CAPACITY, MAX_DESCRIPTION_LEN, MAX_TAGS,
    MAX_TAG_LEN, MAX_TITLE_LEN,
};
use anyhow::Context;
use std::sync::Arc;
use uuid::Uuid;

/// Error types for task operations
#[derive(Debug, thiserror::Error)]
pub enum TaskServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Task is full")]
    TaskFull,

    #[error("User has already joined this task")]
    AlreadyJoined,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Unvalidated input for creating a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub capacity: i64,
    pub creator_id: Uuid,
}

pub struct TaskService {
    task_repo: Arc<dyn TaskRepository>,
    user_repo: Arc<dyn UserRepository>,
}

impl TaskService {
    pub fn new(task_repo: Arc<dyn TaskRepository>, user_repo: Arc<dyn UserRepository>) -> Self {
        Self {
            task_repo,
            user_repo,
        }
    }

    /// Publish a new task with no participants.
    ///
    /// Tags are trimmed, emptied entries dropped and duplicates removed before
    /// the limit of [`MAX_TAGS`] is enforced.
    pub async fn create(&self, input: NewTask) -> Result<Task, TaskServiceError> {
        let validated = validate_new_task(input)?;

        if self
            .user_repo
            .get_by_id(validated.creator_id)
            .await
            .context("Failed to look up task creator")?
            .is_none()
        {
            return Err(TaskServiceError::NotFound("User"));
        }

        let task = Task::new(validated);
        let created = self
            .task_repo
            .create(&task)
            .await
            .context("Failed to create task")?;

        tracing::info!(
            task_id = %created.id,
            creator_id = %created.creator_id,
            capacity = created.capacity,
            "Task created"
        );
        Ok(created)
    }

    pub async fn get(&self, id: Uuid) -> Result<Task, TaskServiceError> {
        self.task_repo
            .get_by_id(id)
            .await
            .context("Failed to get task")?
            .ok_or(TaskServiceError::NotFound("Task"))
    }

    /// All tasks in creation order
    pub async fn list(&self) -> Result<Vec<Task>, TaskServiceError> {
        Ok(self.task_repo.list().await.context("Failed to list tasks")?)
    }

    /// Admit `user_id` into the task, returning the updated task.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the task or the user does not exist
    /// - `AlreadyJoined` if the user is already a participant, even when the
    ///   task is also full
    /// - `TaskFull` if no slot is left
    pub async fn join(&self, task_id: Uuid, user_id: Uuid) -> Result<Task, TaskServiceError> {
        let outcome = self
            .task_repo
            .join(task_id, user_id)
            .await
            .context("Failed to join task")?;

        let result = match outcome {
            JoinOutcome::Joined(task) => Ok(task),
            JoinOutcome::TaskNotFound => Err(TaskServiceError::NotFound("Task")),
            JoinOutcome::UserNotFound => Err(TaskServiceError::NotFound("User")),
            JoinOutcome::AlreadyJoined => Err(TaskServiceError::AlreadyJoined),
            JoinOutcome::TaskFull => Err(TaskServiceError::TaskFull),
        };

        match &result {
            Ok(task) => tracing::info!(
                task_id = %task_id,
                user_id = %user_id,
                participants = task.participants.len(),
                "Joined task"
            ),
            Err(e) => tracing::info!(
                task_id = %task_id,
                user_id = %user_id,
                outcome = %e,
                "Join rejected"
            ),
        }

        result
    }
}

fn validate_new_task(input: NewTask) -> Result<CreateTaskInput, TaskServiceError> {
    let title = input.title.trim();
    if title.is_empty() {
        return Err(validation("Title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(validation(format!(
            "Title must be at most {} characters",
            MAX_TITLE_LEN
        )));
    }

    let description = input.description.trim();
    if description.is_empty() {
        return Err(validation("Description is required"));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(validation(format!(
            "Description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }

    if input.capacity < 1 {
        return Err(validation("Capacity must be at least 1"));
    }
    let capacity = u32::try_from(input.capacity)
        .ok()
        .filter(|c| *c <= MAX_CAPACITY)
        .ok_or_else(|| validation(format!("Capacity must be at most {}", MAX_CAPACITY)))?;

    let tags = normalize_tags(&input.tags);
    if tags.len() > MAX_TAGS {
        return Err(validation(format!("At most {} tags are allowed", MAX_TAGS)));
    }
    if tags.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
        return Err(validation(format!(
            "Tags must be at most {} characters",
            MAX_TAG_LEN
        )));
    }

    Ok(CreateTaskInput {
        title: title.to_string(),
        description: description.to_string(),
        tags,
        capacity,
        creator_id: input.creator_id,
    })
}

fn validation(message: impl Into<String>) -> TaskServiceError {
    TaskServiceError::Validation(message.into())
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::db::repositories::{SqlxTaskRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// For any capacity and any sequence of joins (with repeats), the
        /// participant count never exceeds capacity, no user appears twice and
        /// every rejection is explained by fullness or a repeat.
        #[test]
        fn join_sequence_respects_capacity(
            capacity in 1i64..6,
            attempts in prop::collection::vec(0usize..8, 0..24)
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let result: Result<(), TestCaseError> = rt.block_on(async {
                let pool = create_test_pool().await.unwrap();
                migrations::run_migrations(&pool).await.unwrap();
                let users = SqlxUserRepository::boxed(pool.clone());
                let service =
                    TaskService::new(SqlxTaskRepository::boxed(pool.clone()), users.clone());

                let mut ids = Vec::new();
                for i in 0..8 {
                    let user = User::new(
                        format!("user{}", i),
                        format!("user{}@example.com", i),
                        "hash".into(),
                    );
                    users.create(&user).await.unwrap();
                    ids.push(user.id);
                }

                let task = service
                    .create(NewTask {
                        title: "Property".into(),
                        description: "Capacity invariant".into(),
                        tags: Vec::new(),
                        capacity,
                        creator_id: ids[0],
                    })
                    .await
                    .unwrap();

                let mut admitted: Vec<Uuid> = Vec::new();
                for idx in attempts {
                    let user = ids[idx];
                    match service.join(task.id, user).await {
                        Ok(updated) => {
                            prop_assert!(!admitted.contains(&user));
                            admitted.push(user);
                            prop_assert_eq!(&updated.participants, &admitted);
                        }
                        Err(TaskServiceError::AlreadyJoined) => {
                            prop_assert!(admitted.contains(&user));
                        }
                        Err(TaskServiceError::TaskFull) => {
                            prop_assert!(!admitted.contains(&user));
                            prop_assert_eq!(admitted.len() as i64, capacity);
                        }
                        Err(e) => prop_assert!(false, "unexpected error: {:?}", e),
                    }
                    prop_assert!(admitted.len() as i64 <= capacity);
                }

                let stored = service.get(task.id).await.unwrap();
                prop_assert_eq!(stored.participants, admitted);
                Ok(())
            });
            result?;
        }
    }
}
