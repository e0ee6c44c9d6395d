use askama::Template;
use axum::Router;
use axum::extract::{Extension, Form, MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use rand::Rng;
use rand::distributions::Alphanumeric;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tower_http::trace::MakeSpan;
use tracing::Span;

use crate::config::Config;
use crate::user::{User, UserService, UserServiceError};

pub mod api;
pub mod forms;

use forms::{LoginRequest, LogoutRequest, SignupErrors, SignupRequest};

/// Cookie holding the session JWT.
pub const AUTH_COOKIE: &str = "auth_token";
/// JavaScript-readable cookie mirroring the session's anti-forgery token.
pub const CSRF_COOKIE: &str = "csrftoken";
/// Header the front end echoes the anti-forgery token in.
pub const CSRF_HEADER: &str = "x-csrftoken";
pub const CSRF_TOKEN_LENGTH: usize = 64;
/// One-shot cookie naming the notice to show on the next rendered page.
pub const FLASH_COOKIE: &str = "flash";

pub const INVALID_CREDENTIALS: &str = "Invalid username or password.";
pub const LOGOUT_CSRF_REJECTED: &str = "CSRF verification failed. Request aborted.";
pub const SIGNED_UP_MESSAGE: &str = "Account created successfully! You are now logged in.";
pub const LOGGED_OUT_MESSAGE: &str = "You have been logged out.";

/// Represents the currently authenticated user.
///
/// Inserted into request extensions by [`auth_user_middleware`] and handed to
/// handlers as an explicit `Extension<CurrentUser>` argument.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i32,
    pub username: String,
    pub csrf_token: String,
}

impl CurrentUser {
    /// Creates a new CurrentUser instance.
    pub fn new(id: i32, username: String, csrf_token: String) -> Self {
        Self {
            id,
            username,
            csrf_token,
        }
    }
}

/// Authentication state: user store access plus session signing settings.
#[derive(Clone)]
pub struct AuthState {
    pub db: Arc<DatabaseConnection>,
    pub jwt_secret: String,
    pub session_hours: i64,
    pub secure_cookies: bool,
}

impl AuthState {
    /// Creates a new AuthState from the application config.
    pub fn from_config(config: &Config, db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            jwt_secret: config.jwt_secret.clone(),
            session_hours: config.session_hours,
            secure_cookies: config.secure_cookies,
        }
    }
}

/// Creates the router for the signup and login pages.
pub fn create_login_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/login/", get(login_page_handler).post(login_handler))
        .route("/signup/", get(signup_page_handler).post(signup_handler))
        .with_state(state)
}

/// Creates the router for logging out. Mount it behind [`login_redirect_middleware`].
pub fn create_logout_router(state: Arc<AuthState>) -> Router<()> {
    Router::new()
        .route("/logout/", get(logout_handler).post(logout_form_handler))
        .with_state(state)
}

/// Authentication middleware that checks for a valid session cookie and sets CurrentUser extension.
/// This middleware only populates the CurrentUser extension and does not perform redirects.
pub async fn auth_user_middleware(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(current_user) = resolve_current_user(&state, &jar).await {
        request.extensions_mut().insert(current_user);
    }

    next.run(request).await
}

/// Decodes the session cookie and confirms its user still exists.
async fn resolve_current_user(state: &AuthState, jar: &CookieJar) -> Option<CurrentUser> {
    let token_cookie = jar.get(AUTH_COOKIE)?;
    let claims = decode_jwt(token_cookie.value(), &state.jwt_secret).ok()?;

    match UserService::new(&state.db)
        .get_user_by_id(claims.user_id)
        .await
    {
        Ok(Some(user)) => Some(CurrentUser::new(
            user.id(),
            user.username().to_string(),
            claims.csrf,
        )),
        Ok(None) => None,
        Err(err) => {
            tracing::error!("Failed to load session user {}: {}", claims.user_id, err);
            None
        }
    }
}

/// Login redirect middleware that redirects unauthenticated users to the login page.
/// This middleware should be applied after auth_user_middleware to check for CurrentUser extension.
pub async fn login_redirect_middleware(request: Request, next: Next) -> Response {
    let is_authenticated = request.extensions().get::<CurrentUser>().is_some();

    if !is_authenticated {
        return Redirect::to("/login/").into_response();
    }

    next.run(request).await
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
pub struct Claims {
    pub exp: usize,       // Expiry time of the token
    pub iat: usize,       // Issued at time of the token
    pub user_id: i32,     // ID of the authenticated user
    pub username: String, // Username of the authenticated user
    pub csrf: String,     // Anti-forgery token bound to this session
}

/// Custom error type for authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Represents an error during template rendering.
    #[error("Template rendering failed")]
    Template(#[from] askama::Error),
    /// Represents an error while signing the session token.
    #[error("JWT operation failed")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    /// Represents a failure in the user store.
    #[error("User service error: {0}")]
    UserService(#[from] UserServiceError),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        tracing::error!("Authentication request failed: {}", self);
        let user_facing_error_message =
            "An unexpected error occurred while processing your request. Please try again later.";
        (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!(
                "<h1>Internal Server Error</h1><p>{}</p>",
                user_facing_error_message
            )),
        )
            .into_response()
    }
}

/// Signs a session token for `user` carrying the given anti-forgery token.
pub fn encode_jwt(
    user: &User,
    csrf: String,
    jwt_secret: &str,
    session_hours: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now();
    let expire = chrono::Duration::hours(session_hours);
    let claims = Claims {
        exp: (now + expire).timestamp() as usize,
        iat: now.timestamp() as usize,
        user_id: user.id(),
        username: user.username().to_string(),
        csrf,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
}

pub fn decode_jwt(token: &str, jwt_secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = jsonwebtoken::decode(
        token,
        &jsonwebtoken::DecodingKey::from_secret(jwt_secret.as_bytes()),
        &jsonwebtoken::Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Generates a random alphanumeric anti-forgery token.
pub fn generate_csrf_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CSRF_TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// Compares two anti-forgery tokens in constant time.
pub fn csrf_tokens_match(expected: &str, provided: &str) -> bool {
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Builds the JavaScript-readable cookie carrying an anti-forgery token.
pub fn csrf_cookie(token: String, secure: bool) -> Cookie<'static> {
    Cookie::build((CSRF_COOKIE, token))
        .http_only(false)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Logs `user` in: signs a fresh session with a rotated anti-forgery token
/// and stores both in cookies.
pub fn establish_session(
    state: &AuthState,
    jar: CookieJar,
    user: &User,
) -> Result<CookieJar, AuthError> {
    let csrf_token = generate_csrf_token();
    let jwt_token = encode_jwt(
        user,
        csrf_token.clone(),
        &state.jwt_secret,
        state.session_hours,
    )?;

    let session_cookie = Cookie::build((AUTH_COOKIE, jwt_token))
        .http_only(true)
        .secure(state.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::hours(state.session_hours))
        .path("/")
        .build();

    Ok(jar
        .add(session_cookie)
        .add(csrf_cookie(csrf_token, state.secure_cookies)))
}

/// Removes the session and anti-forgery cookies.
pub fn end_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(AUTH_COOKIE).path("/"))
        .remove(Cookie::build(CSRF_COOKIE).path("/"))
}

/// Notices carried across a redirect in [`FLASH_COOKIE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    SignedUp,
    LoggedIn,
    LoggedOut,
}

impl Flash {
    fn as_str(self) -> &'static str {
        match self {
            Flash::SignedUp => "signed-up",
            Flash::LoggedIn => "logged-in",
            Flash::LoggedOut => "logged-out",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "signed-up" => Some(Flash::SignedUp),
            "logged-in" => Some(Flash::LoggedIn),
            "logged-out" => Some(Flash::LoggedOut),
            _ => None,
        }
    }

    /// The text shown to `username`.
    pub fn message(self, username: &str) -> String {
        match self {
            Flash::SignedUp => SIGNED_UP_MESSAGE.to_string(),
            Flash::LoggedIn => format!("Welcome back, {}!", username),
            Flash::LoggedOut => LOGGED_OUT_MESSAGE.to_string(),
        }
    }
}

/// Queues `flash` for the next page the browser renders.
pub fn set_flash(jar: CookieJar, flash: Flash, secure: bool) -> CookieJar {
    let cookie = Cookie::build((FLASH_COOKIE, flash.as_str()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build();
    jar.add(cookie)
}

/// Removes the pending notice, if any, and returns its text for `username`.
pub fn take_flash(jar: CookieJar, username: &str) -> (CookieJar, Option<String>) {
    let message = jar
        .get(FLASH_COOKIE)
        .and_then(|cookie| Flash::parse(cookie.value()))
        .map(|flash| flash.message(username));
    (jar.remove(Cookie::build(FLASH_COOKIE).path("/")), message)
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub username: String,
    pub error: Option<String>,
    pub logged_in_as: Option<String>,
    pub flash: Option<String>,
}

#[derive(Template)]
#[template(path = "signup.html")]
pub struct SignupTemplate {
    pub username: String,
    pub errors: SignupErrors,
    pub flash: Option<String>,
}

/// Handles GET requests to display the login page.
#[tracing::instrument(skip(jar))]
pub async fn login_page_handler(
    current_user: Option<Extension<CurrentUser>>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), AuthError> {
    let logged_in_as = current_user.map(|Extension(user)| user.username);
    let (jar, flash) = take_flash(jar, logged_in_as.as_deref().unwrap_or_default());
    let template = LoginTemplate {
        username: String::new(),
        error: None,
        logged_in_as,
        flash,
    };
    Ok((jar, Html(template.render()?)))
}

/// Handles the login form.
/// On success a session is established and the user is sent to the task list.
/// On failure the form is shown again with a message that does not reveal
/// whether the username exists.
#[tracing::instrument(skip(state, jar, payload))]
pub async fn login_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Form(payload): Form<LoginRequest>,
) -> Result<Response, AuthError> {
    let user = UserService::new(&state.db)
        .authenticate(&payload.username, &payload.password)
        .await?;

    let Some(user) = user else {
        tracing::info!("Rejected login attempt");
        let template = LoginTemplate {
            username: payload.username,
            error: Some(INVALID_CREDENTIALS.to_string()),
            logged_in_as: None,
            flash: None,
        };
        return Ok(Html(template.render()?).into_response());
    };

    let jar = establish_session(&state, jar, &user)?;
    let jar = set_flash(jar, Flash::LoggedIn, state.secure_cookies);
    tracing::info!(user_id = user.id(), "User logged in");
    Ok((jar, Redirect::to("/")).into_response())
}

/// Handles GET requests to display the signup page.
#[tracing::instrument]
pub async fn signup_page_handler() -> Result<Html<String>, AuthError> {
    let template = SignupTemplate {
        username: String::new(),
        errors: SignupErrors::default(),
        flash: None,
    };
    template.render().map(Html).map_err(AuthError::from)
}

/// Handles the signup form.
/// Creates the user, logs them in and redirects to the task list, or shows
/// the form again with field errors.
#[tracing::instrument(skip(state, jar, payload))]
pub async fn signup_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
    Form(payload): Form<SignupRequest>,
) -> Result<Response, AuthError> {
    if let Err(errors) = payload.validate() {
        return render_signup_errors(payload.username, errors);
    }

    let user = match UserService::new(&state.db)
        .create_user(&payload.username, &payload.password1)
        .await
    {
        Ok(user) => user,
        Err(UserServiceError::DuplicateUsername(_)) => {
            return render_signup_errors(payload.username, SignupErrors::duplicate_username());
        }
        Err(err) => return Err(err.into()),
    };

    let jar = establish_session(&state, jar, &user)?;
    let jar = set_flash(jar, Flash::SignedUp, state.secure_cookies);
    Ok((jar, Redirect::to("/")).into_response())
}

fn render_signup_errors(username: String, errors: SignupErrors) -> Result<Response, AuthError> {
    let template = SignupTemplate {
        username,
        errors,
        flash: None,
    };
    Ok(Html(template.render()?).into_response())
}

/// Destroys the session and returns to the login page.
#[tracing::instrument(skip(state, jar))]
pub async fn logout_handler(
    State(state): State<Arc<AuthState>>,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    log_out(&state, jar)
}

/// Handles the logout form, which must echo the session's anti-forgery token.
#[tracing::instrument(skip(state, user, jar, payload), fields(user_id = user.id))]
pub async fn logout_form_handler(
    State(state): State<Arc<AuthState>>,
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
    Form(payload): Form<LogoutRequest>,
) -> Response {
    if !csrf_tokens_match(&user.csrf_token, &payload.csrfmiddlewaretoken) {
        tracing::warn!("Rejected logout with bad CSRF token");
        return (
            axum::http::StatusCode::FORBIDDEN,
            Html(format!("<h1>Forbidden</h1><p>{}</p>", LOGOUT_CSRF_REJECTED)),
        )
            .into_response();
    }
    log_out(&state, jar).into_response()
}

fn log_out(state: &AuthState, jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = set_flash(end_session(jar), Flash::LoggedOut, state.secure_cookies);
    (jar, Redirect::to("/login/"))
}

/// Custom span maker that filters sensitive data from credential requests.
/// Login and signup spans carry no headers, cookies or bodies.
#[derive(Clone, Debug)]
pub struct FilteredMakeSpan;

impl<B> MakeSpan<B> for FilteredMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        let uri = request.uri();
        let method = request.method();
        let matched_path = request
            .extensions()
            .get::<MatchedPath>()
            .map(MatchedPath::as_str);

        if matches!(uri.path(), "/login/" | "/signup/") {
            tracing::info_span!(
                "request",
                method = %method,
                path = %uri.path(),
                matched_path,
                sensitive_route = true,
            )
        } else {
            tracing::info_span!(
                "request",
                method = %method,
                uri = %uri,
                matched_path,
            )
        }
    }
}
