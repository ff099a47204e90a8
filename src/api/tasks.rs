//! Task API endpoints
//!
//! - GET /api/tasks - List tasks in creation order
//! - POST /api/tasks - Publish a task (authenticated)
//! - GET /api/tasks/{id} - Get a task
//! - POST /api/tasks/{id} - Join a task (authenticated)

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::middleware::{parse_optional_body, ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::api::responses::TaskResponse;
use crate::services::task::NewTask;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    #[serde(default, alias = "metaTags")]
    pub tags: Vec<String>,
    #[serde(alias = "maxParticipants")]
    pub capacity: i64,
    pub creator_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinTaskRequest {
    pub user_id: Option<Uuid>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/{id}", get(get_task).post(join_task))
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::validation_error("Invalid task id"))
}

/// Acting on behalf of another user is forbidden
fn ensure_self(claimed: Option<Uuid>, caller: Uuid, field: &str) -> Result<(), ApiError> {
    match claimed {
        Some(id) if id != caller => Err(ApiError::forbidden(format!(
            "{} must match the authenticated user",
            field
        ))),
        _ => Ok(()),
    }
}

/// GET /api/tasks
async fn list_tasks(State(state): State<AppState>) -> Result<Json<Vec<TaskResponse>>, ApiError> {
    let tasks = state.task_service.list().await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

/// POST /api/tasks
async fn create_task(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<CreateTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = user.0.id;
    ensure_self(body.creator_id, caller, "creatorId")?;

    let task = state
        .task_service
        .create(NewTask {
            title: body.title,
            description: body.description,
            tags: body.tags,
            capacity: body.capacity,
            creator_id: caller,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(TaskResponse::from(task))))
}

/// GET /api/tasks/{id}
async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskResponse>, ApiError> {
    let id = parse_task_id(&id)?;
    let task = state.task_service.get(id).await?;
    Ok(Json(task.into()))
}

/// POST /api/tasks/{id}
///
/// Joins the caller to the task. An optional `userId` in the body must name
/// the caller.
async fn join_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthenticatedUser,
    body: Bytes,
) -> Result<Json<TaskResponse>, ApiError> {
    let task_id = parse_task_id(&id)?;
    let request: JoinTaskRequest = parse_optional_body(&body)?;
    let caller = user.0.id;
    ensure_self(request.user_id, caller, "userId")?;

    let task = state.task_service.join(task_id, caller).await?;
    Ok(Json(task.into()))
}
