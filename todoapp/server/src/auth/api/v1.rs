use crate::auth::{
    AuthState, CSRF_HEADER, CurrentUser, csrf_cookie, csrf_tokens_match, generate_csrf_token,
};
use crate::web::api::ErrorResponse;
use axum::{
    Json, Router,
    extract::{Extension, Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

pub const AUTHENTICATION_REQUIRED: &str = "Authentication credentials were not provided.";
pub const CSRF_REJECTED: &str = "CSRF token missing or incorrect.";

/// JSON response carrying an anti-forgery token.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CsrfTokenResponse {
    /// Token to send back in the `X-CSRFToken` header
    pub csrftoken: String,
}

/// Creates the JSON API router for session helpers.
pub fn create_api_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/api/get-csrf-token/", get(get_csrf_token_handler))
        .with_state(state)
}

/// Handler for GET /api/get-csrf-token/.
///
/// Logged-in callers get their session's token. Anonymous callers get a fresh
/// token that authorizes nothing until they log in.
#[tracing::instrument(skip(state, jar, current_user))]
#[utoipa::path(
    get,
    path = "/api/get-csrf-token/",
    responses(
        (status = 200, description = "Anti-forgery token for this session", body = CsrfTokenResponse)
    ),
    tag = "Session"
)]
pub async fn get_csrf_token_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    current_user: Option<Extension<CurrentUser>>,
) -> (CookieJar, Json<CsrfTokenResponse>) {
    let token = match current_user {
        Some(Extension(user)) => user.csrf_token,
        None => generate_csrf_token(),
    };
    let jar = jar.add(csrf_cookie(token.clone(), state.secure_cookies));
    (jar, Json(CsrfTokenResponse { csrftoken: token }))
}

/// Middleware that ensures the current user is authenticated.
/// Returns UNAUTHORIZED if the CurrentUser extension is not found in the request.
/// This middleware should be applied after auth_user_middleware.
pub async fn require_auth_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(AUTHENTICATION_REQUIRED)),
        )
            .into_response();
    }

    next.run(request).await
}

fn is_state_changing(method: &Method) -> bool {
    !matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Middleware that rejects state-changing requests whose `X-CSRFToken` header
/// does not match the session's anti-forgery token.
/// This middleware should be applied after require_auth_middleware.
pub async fn csrf_protect_middleware(request: Request, next: Next) -> Response {
    if is_state_changing(request.method()) {
        let expected = request
            .extensions()
            .get::<CurrentUser>()
            .map(|user| user.csrf_token.as_str());
        let provided = request
            .headers()
            .get(CSRF_HEADER)
            .and_then(|value| value.to_str().ok());

        let accepted = match (expected, provided) {
            (Some(expected), Some(provided)) => csrf_tokens_match(expected, provided),
            _ => false,
        };
        if !accepted {
            tracing::warn!(method = %request.method(), "Rejected request with bad CSRF token");
            return (StatusCode::FORBIDDEN, Json(ErrorResponse::new(CSRF_REJECTED))).into_response();
        }
    }

    next.run(request).await
}
