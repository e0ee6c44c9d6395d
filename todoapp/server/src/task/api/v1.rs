use crate::auth::CurrentUser;
use crate::task::web::TaskState;
use crate::task::{
    NewTask, Task, TaskChanges, TaskService, TaskServiceError, TaskStatus, TaskValidationError,
    parse_due_date,
};
use crate::web::api::ErrorResponse;
use axum::{
    Router,
    extract::{Extension, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub const TASK_NOT_FOUND: &str = "Task not found or not authorized";
pub const INVALID_JSON_BODY: &str = "Invalid JSON body.";

/// JSON representation of a Task for API responses.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TaskJson {
    /// Unique identifier for the task
    pub id: i32,
    /// What needs doing
    pub description: String,
    /// Optional due date (YYYY-MM-DD)
    pub due_date: Option<NaiveDate>,
    /// Either `in-progress` or `complete`
    pub status: TaskStatus,
    /// Date the task was completed (YYYY-MM-DD), null unless complete
    pub complete_date: Option<NaiveDate>,
}

impl From<Task> for TaskJson {
    fn from(task: Task) -> Self {
        Self {
            id: task.id(),
            description: task.description().to_string(),
            due_date: task.due_date(),
            status: task.status(),
            complete_date: task.complete_date(),
        }
    }
}

/// Request body for creating a task.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTaskRequest {
    /// Required, non-empty
    #[serde(default)]
    description: Option<String>,
    /// Optional due date (YYYY-MM-DD); null or empty means none
    #[serde(default)]
    due_date: Option<String>,
    /// Defaults to `in-progress`
    #[serde(default)]
    status: Option<String>,
}

/// Request body for a partial update. Omitted fields are left unchanged.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTaskRequest {
    #[serde(default)]
    description: Option<String>,
    /// A date sets the due date; null or empty clears it
    #[serde(default, deserialize_with = "deserialize_present")]
    #[schema(value_type = Option<String>)]
    due_date: Option<Option<String>>,
    #[serde(default)]
    status: Option<String>,
}

/// Distinguishes a field sent as `null` (`Some(None)`) from an omitted one (`None`).
fn deserialize_present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn parse_status(status: Option<&str>) -> Result<Option<TaskStatus>, TaskValidationError> {
    status.map(str::parse).transpose()
}

impl TryFrom<CreateTaskRequest> for NewTask {
    type Error = TaskValidationError;

    fn try_from(request: CreateTaskRequest) -> Result<Self, Self::Error> {
        let due_date = parse_due_date(request.due_date.as_deref())?;
        let status = parse_status(request.status.as_deref())?;
        NewTask::new(request.description, due_date, status)
    }
}

impl TryFrom<UpdateTaskRequest> for TaskChanges {
    type Error = TaskValidationError;

    fn try_from(request: UpdateTaskRequest) -> Result<Self, Self::Error> {
        let due_date = match request.due_date {
            Some(raw) => Some(parse_due_date(raw.as_deref())?),
            None => None,
        };
        let status = parse_status(request.status.as_deref())?;
        TaskChanges::new(request.description, due_date, status)
    }
}

/// Errors returned by the task API, each mapped to a JSON `{error}` body.
#[derive(Debug, thiserror::Error)]
pub enum TaskApiError {
    #[error(transparent)]
    Validation(#[from] TaskValidationError),
    #[error("Malformed request body: {0}")]
    MalformedBody(#[from] JsonRejection),
    /// Missing and not-owned tasks are reported identically.
    #[error("Task not found")]
    NotFound,
    #[error("Task service error: {0}")]
    Service(TaskServiceError),
}

impl From<TaskServiceError> for TaskApiError {
    fn from(err: TaskServiceError) -> Self {
        match err {
            TaskServiceError::NotFound(_) => TaskApiError::NotFound,
            other => TaskApiError::Service(other),
        }
    }
}

impl IntoResponse for TaskApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            TaskApiError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            TaskApiError::MalformedBody(rejection) => {
                tracing::debug!("Rejected request body: {}", rejection);
                (StatusCode::BAD_REQUEST, INVALID_JSON_BODY.to_string())
            }
            TaskApiError::NotFound => (StatusCode::NOT_FOUND, TASK_NOT_FOUND.to_string()),
            TaskApiError::Service(err) => {
                tracing::error!("Task request failed: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected error occurred while processing your request. Please try again later."
                        .to_string(),
                )
            }
        };
        (status, Json(ErrorResponse::new(message))).into_response()
    }
}

/// Task IDs that are not integers cannot name any task.
fn parse_task_id(raw: &str) -> Result<i32, TaskApiError> {
    raw.parse().map_err(|_| TaskApiError::NotFound)
}

/// Handler for GET /api/tasks/ - Returns the caller's tasks, newest first.
#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
#[utoipa::path(
    get,
    path = "/api/tasks/",
    responses(
        (status = 200, description = "Tasks owned by the caller", body = Vec<TaskJson>),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn list_tasks_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<Vec<TaskJson>>, TaskApiError> {
    let tasks = TaskService::new(&state.db).list_tasks(user.id).await?;
    Ok(Json(tasks.into_iter().map(TaskJson::from).collect()))
}

/// Handler for POST /api/tasks/ - Creates a task owned by the caller.
#[tracing::instrument(skip(state, user, payload), fields(user_id = user.id))]
#[utoipa::path(
    post,
    path = "/api/tasks/",
    request_body = CreateTaskRequest,
    responses(
        (status = 201, description = "Task created", body = TaskJson),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 403, description = "Missing or wrong CSRF token", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn create_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskJson>), TaskApiError> {
    let Json(request) = payload?;
    let new_task = NewTask::try_from(request)?;
    let task = TaskService::new(&state.db)
        .create_task(user.id, new_task)
        .await?;
    Ok((StatusCode::CREATED, Json(TaskJson::from(task))))
}

/// Handler for GET /api/tasks/{id}/ - Returns one of the caller's tasks.
#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
#[utoipa::path(
    get,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 200, description = "The task", body = TaskJson),
        (status = 404, description = "No such task owned by the caller", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn get_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let id = parse_task_id(&id)?;
    let task = TaskService::new(&state.db).get_task(user.id, id).await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for PUT/PATCH /api/tasks/{id}/ - Partially updates one of the caller's tasks.
#[tracing::instrument(skip(state, user, payload), fields(user_id = user.id))]
#[utoipa::path(
    patch,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "The updated task", body = TaskJson),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 404, description = "No such task owned by the caller", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn update_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<TaskJson>, TaskApiError> {
    let id = parse_task_id(&id)?;
    let Json(request) = payload?;
    let changes = TaskChanges::try_from(request)?;
    let task = TaskService::new(&state.db)
        .update_task(user.id, id, changes)
        .await?;
    Ok(Json(TaskJson::from(task)))
}

/// Handler for DELETE /api/tasks/{id}/ - Deletes one of the caller's tasks.
#[tracing::instrument(skip(state, user), fields(user_id = user.id))]
#[utoipa::path(
    delete,
    path = "/api/tasks/{id}/",
    params(("id" = i32, Path, description = "Task ID")),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 404, description = "No such task owned by the caller", body = ErrorResponse)
    ),
    tag = "Tasks"
)]
pub async fn delete_task_handler(
    State(state): State<Arc<TaskState>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, TaskApiError> {
    let id = parse_task_id(&id)?;
    TaskService::new(&state.db).delete_task(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Creates and returns the tasks API router.
/// Mount it behind the authentication and CSRF middlewares.
pub fn create_api_router(state: Arc<TaskState>) -> Router {
    Router::new()
        .route(
            "/api/tasks/",
            get(list_tasks_handler).post(create_task_handler),
        )
        .route(
            "/api/tasks/{id}/",
            get(get_task_handler)
                .put(update_task_handler)
                .patch(update_task_handler)
                .delete(delete_task_handler),
        )
        .with_state(state)
}
