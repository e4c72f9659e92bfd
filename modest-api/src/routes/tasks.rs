/// Task JSON API
///
/// # Endpoints
///
/// - `GET /api/tasks` - List the caller's tasks
/// - `POST /api/tasks` - Create a task
/// - `PUT /api/tasks/:id/status` - Change a task's status
/// - `PUT /api/tasks/:id/text` - Change a task's text
/// - `DELETE /api/tasks/:id` - Delete a task
///
/// # Authentication
///
/// Requires either a session cookie or an API token
/// (`Authorization: Bearer <token>`). The authorization layer has already
/// checked the role table and task ownership when a handler runs; the
/// stores still filter every query on the caller's id.
///
/// # Example Response
///
/// ```json
/// {
///   "id": "3xJ9kQ2mZr8TbWcYpLa01d",
///   "owner": "9b2f5a7e-6c1d-4e8a-9f3b-2d7c1e0a4b56",
///   "text": "water the plants",
///   "status": "todo",
///   "created_at": "2025-03-01T10:00:00Z",
///   "updated_at": "2025-03-01T10:00:00Z"
/// }
/// ```

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    Extension, Json,
};
use modest_shared::{auth::principal::Principal, models::task::Task};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

/// Create or retext request
#[derive(Debug, Deserialize, Validate)]
pub struct TextRequest {
    #[validate(length(min = 1, message = "Text is required"))]
    pub text: String,
}

/// Status change request
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// One of `todo`, `inprogress`, `done`
    pub status: String,
}

/// Delete response
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
}

/// List tasks, oldest first
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state.stores().tasks.list(principal.account_id).await?;
    Ok(Json(tasks))
}

/// Create a task
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Blank text
pub async fn create_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<TextRequest>,
) -> ApiResult<Json<Task>> {
    req.validate()?;

    let task = state
        .stores()
        .tasks
        .create(principal.account_id, &req.text)
        .await?;

    info!(task_id = %task.id, account_id = %principal.account_id, "Task created");
    Ok(Json(task))
}

/// Change a task's status
///
/// # Errors
///
/// - `404 Not Found`: Unknown task, or owned by another account
/// - `422 Unprocessable Entity`: Unknown status
pub async fn update_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> ApiResult<Json<Task>> {
    let task = state
        .stores()
        .tasks
        .update_status(principal.account_id, &id, &req.status)
        .await?;

    Ok(Json(task))
}

pub async fn update_text(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Json(req): Json<TextRequest>,
) -> ApiResult<Json<Task>> {
    req.validate()?;

    let task = state
        .stores()
        .tasks
        .update_text(principal.account_id, &id, &req.text)
        .await?;

    Ok(Json(task))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    state.stores().tasks.delete(principal.account_id, &id).await?;

    info!(task_id = %id, account_id = %principal.account_id, "Task deleted");
    Ok(Json(DeleteResponse { success: true }))
}
