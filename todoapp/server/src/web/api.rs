use std::sync::Arc;

use crate::auth::{self, AuthState};
use crate::task::web::TaskState;

use axum::{Json, Router, middleware::from_fn, routing::get};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use utoipa::{OpenApi, ToSchema};

/// JSON body returned by every failing API call.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Human-readable description of the failure
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::task::api::v1::list_tasks_handler,
        crate::task::api::v1::create_task_handler,
        crate::task::api::v1::get_task_handler,
        crate::task::api::v1::update_task_handler,
        crate::task::api::v1::delete_task_handler,
        crate::auth::api::v1::get_csrf_token_handler,
    ),
    components(schemas(ErrorResponse)),
    tags(
        (name = "Tasks", description = "Per-user task management"),
        (name = "Session", description = "Session helpers for the browser front end")
    )
)]
pub struct ApiDoc;

/// Handler for GET /api-docs/openapi.json.
pub async fn openapi_handler() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Creates the API routes for JSON API endpoints.
///
/// Task routes require a session and a matching CSRF token on mutating calls.
/// Expects `auth_user_middleware` to run further out.
pub fn create_api_router(auth_state: Arc<AuthState>, task_state: Arc<TaskState>) -> Router {
    let session_router = auth::api::v1::create_api_router(auth_state);
    let tasks_router = crate::task::api::v1::create_api_router(task_state).layer(
        ServiceBuilder::new()
            .layer(from_fn(auth::api::v1::require_auth_middleware))
            .layer(from_fn(auth::api::v1::csrf_protect_middleware)),
    );
    Router::new()
        .route("/api-docs/openapi.json", get(openapi_handler))
        .merge(session_router)
        .merge(tasks_router)
}
