/// Task list page
///
/// Browser-facing twin of the JSON task API. Form posts redirect back to
/// `/app` so a reload never resubmits them.
///
/// # Endpoints
///
/// - `GET /app` - The caller's tasks
/// - `POST /app/tasks/new` - Add a task
/// - `POST /app/tasks/:id/edit` - Change a task's text
/// - `POST /app/tasks/:id/delete` - Remove a task

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    response::Redirect,
    Extension, Form, Json,
};
use modest_shared::{auth::principal::Principal, models::task::Task};
use serde::{Deserialize, Serialize};

/// App page view model
#[derive(Debug, Serialize, Deserialize)]
pub struct AppView {
    pub email: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskForm {
    #[serde(default)]
    pub text: String,
}

impl TaskForm {
    fn text(&self) -> ApiResult<&str> {
        let text = self.text.trim();
        if text.is_empty() {
            return Err(ApiError::validation("text", "Text is required"));
        }
        Ok(text)
    }
}

pub async fn app_page(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<AppView>> {
    let mut tasks = state.stores().tasks.list(principal.account_id).await?;
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    Ok(Json(AppView {
        email: principal.email,
        tasks,
    }))
}

pub async fn create_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Form(form): Form<TaskForm>,
) -> ApiResult<Redirect> {
    state
        .stores()
        .tasks
        .create(principal.account_id, form.text()?)
        .await?;

    Ok(Redirect::to("/app"))
}

pub async fn edit_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Form(form): Form<TaskForm>,
) -> ApiResult<Redirect> {
    state
        .stores()
        .tasks
        .update_text(principal.account_id, &id, form.text()?)
        .await?;

    Ok(Redirect::to("/app"))
}

pub async fn delete_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Redirect> {
    state.stores().tasks.delete(principal.account_id, &id).await?;
    Ok(Redirect::to("/app"))
}
