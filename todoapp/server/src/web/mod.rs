use axum::Router;
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, COOKIE, SET_COOKIE};
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{Html, IntoResponse, Response};
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::sensitive_headers::{
    SetSensitiveRequestHeadersLayer, SetSensitiveResponseHeadersLayer,
};
use tower_http::trace::TraceLayer;

use crate::auth::{
    AuthState, FilteredMakeSpan, auth_user_middleware, create_login_router, create_logout_router,
    login_redirect_middleware,
};
use crate::config::Config;
use crate::task::web::{TaskState, create_task_page_router};

pub mod api;

/// Custom error type for web handler operations.
#[derive(Debug, thiserror::Error)]
pub enum WebError {
    /// Represents an error during template rendering.
    /// The specific `askama::Error` is captured as the source of this error.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        tracing::error!("Request failed: {}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Connects to the database and applies pending migrations.
#[tracing::instrument(skip(db_url))]
pub async fn connect_database(db_url: &str) -> anyhow::Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(db_url);
    options.sqlx_logging(false);
    if db_url.starts_with("sqlite::memory:") {
        // Every in-memory SQLite connection is its own database.
        options.min_connections(1).max_connections(1);
    }

    let db = Database::connect(options).await?;
    migration::Migrator::up(&db, None).await?;
    tracing::info!("Database migrations applied successfully");
    Ok(db)
}

/// Builds the full application router.
pub fn create_app(config: &Config, db: DatabaseConnection) -> Router {
    let db = Arc::new(db);
    let auth_state = Arc::new(AuthState::from_config(config, db.clone()));
    let task_state = Arc::new(TaskState { db });

    let protected_pages = create_task_page_router()
        .merge(create_logout_router(auth_state.clone()))
        .layer(from_fn(login_redirect_middleware));

    let public_pages = Router::new()
        .route("/health", axum::routing::get(health_check_handler))
        .merge(create_login_router(auth_state.clone()));

    let api_router = api::create_api_router(auth_state.clone(), task_state);

    let sensitive_headers = [AUTHORIZATION, COOKIE];
    Router::new()
        .merge(protected_pages)
        .merge(public_pages)
        .merge(api_router)
        .layer(
            ServiceBuilder::new()
                .layer(SetSensitiveRequestHeadersLayer::new(sensitive_headers))
                .layer(TraceLayer::new_for_http().make_span_with(FilteredMakeSpan))
                .layer(SetSensitiveResponseHeadersLayer::new([SET_COOKIE]))
                .layer(from_fn_with_state(auth_state, auth_user_middleware)),
        )
}

#[tracing::instrument(skip(config))]
pub async fn start_web_server(config: Config) -> anyhow::Result<()> {
    let server_address = format!("0.0.0.0:{}", &config.port);
    let listener = tokio::net::TcpListener::bind(&server_address).await?;
    tracing::info!("Web server running on http://{}", server_address);

    let db = connect_database(&config.db_url).await?;
    let app = create_app(&config, db);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tracing::instrument]
pub async fn health_check_handler() -> &'static str {
    "OK"
}
