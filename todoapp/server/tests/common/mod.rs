#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, StatusCode};
use sea_orm::DatabaseConnection;
use todoapp_server::auth::encode_jwt;
use todoapp_server::config::Config;
use todoapp_server::user::{User, UserService};
use tower::ServiceExt;

pub const TEST_PASSWORD: &str = "correct-horse-battery";

pub fn test_config() -> Config {
    Config {
        db_url: "sqlite::memory:".to_string(),
        port: 8080,
        jwt_secret: "test_secret".to_string(),
        session_hours: 24,
        secure_cookies: false,
    }
}

/// Test context holding a migrated in-memory database and the full router.
pub struct TestContext {
    pub config: Config,
    pub db: DatabaseConnection,
    pub app: Router,
}

pub async fn setup_db() -> anyhow::Result<DatabaseConnection> {
    todoapp_server::web::connect_database("sqlite::memory:").await
}

pub async fn setup() -> anyhow::Result<TestContext> {
    // Allow multiple calls to init for tests.
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let config = test_config();
    let db = setup_db().await?;
    let app = todoapp_server::web::create_app(&config, db.clone());
    Ok(TestContext { config, db, app })
}

/// A logged-in user together with the cookie and CSRF header a browser would send.
pub struct TestSession {
    pub user: User,
    pub cookie: String,
    pub csrf_token: String,
}

pub async fn login_as(context: &TestContext, username: &str) -> TestSession {
    let user = UserService::new(&context.db)
        .create_user(username, TEST_PASSWORD)
        .await
        .expect("Failed to create user");
    let csrf_token = format!("csrf-token-for-{}", username);
    let jwt = encode_jwt(
        &user,
        csrf_token.clone(),
        &context.config.jwt_secret,
        context.config.session_hours,
    )
    .expect("Failed to sign session");
    TestSession {
        user,
        cookie: format!("auth_token={}", jwt),
        csrf_token,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl TestResponse {
    pub async fn from_response(response: Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        Self {
            status,
            headers,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn location(&self) -> Option<&str> {
        self.headers.get("location").and_then(|v| v.to_str().ok())
    }

    /// Returns the value of the named cookie set by this response, if any.
    pub fn cookie(&self, name: &str) -> Option<String> {
        let prefix = format!("{}=", name);
        self.headers
            .get_all("set-cookie")
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|header| {
                let pair = header.split(';').next()?.trim();
                pair.strip_prefix(&prefix).map(str::to_string)
            })
    }
}

pub async fn send(app: &Router, request: Request<Body>) -> TestResponse {
    let response = app.clone().oneshot(request).await.unwrap();
    TestResponse::from_response(response).await
}

/// Sends a JSON API request as `session`, including the CSRF header.
pub async fn api_request(
    app: &Router,
    session: &TestSession,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> TestResponse {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", &session.cookie)
        .header("x-csrftoken", &session.csrf_token);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    send(app, request).await
}

pub async fn form_post(app: &Router, uri: &str, form: &str) -> TestResponse {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str, cookie: Option<&str>) -> TestResponse {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    send(app, builder.body(Body::empty()).unwrap()).await
}

pub fn today() -> String {
    chrono::Utc::now().date_naive().to_string()
}
