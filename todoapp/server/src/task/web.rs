use askama::Template;
use axum::{Router, extract::Extension, response::Html, routing::get};
use axum_extra::extract::CookieJar;
use std::sync::Arc;

use crate::auth::{CurrentUser, take_flash};
use crate::web::WebError;

#[derive(Clone, Debug)]
pub struct TaskState {
    pub db: Arc<sea_orm::DatabaseConnection>,
}

/// The task list page. Task data is loaded by the page itself through the JSON API.
#[derive(Template)]
#[template(path = "tasks.html")]
pub struct TasksTemplate {
    pub username: String,
    /// Posted back by the logout form.
    pub csrf_token: String,
    pub flash: Option<String>,
}

#[tracing::instrument(skip(user, jar), fields(user_id = user.id))]
pub async fn tasks_page_handler(
    Extension(user): Extension<CurrentUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), WebError> {
    let (jar, flash) = take_flash(jar, &user.username);
    let template = TasksTemplate {
        username: user.username,
        csrf_token: user.csrf_token,
        flash,
    };
    Ok((jar, Html(template.render()?)))
}

/// Creates the router for the task list page. Mount it behind the login redirect.
pub fn create_task_page_router() -> Router {
    Router::new().route("/", get(tasks_page_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_username_escaped() {
        let html = TasksTemplate {
            username: "<alice>".to_string(),
            csrf_token: "token".to_string(),
            flash: None,
        }
        .render()
        .unwrap();

        assert!(html.contains("&#60;alice&#62;") || html.contains("&lt;alice&gt;"));
        assert!(!html.contains("<alice>"));
    }

    #[test]
    fn renders_logout_token_and_notice() {
        let html = TasksTemplate {
            username: "alice".to_string(),
            csrf_token: "session-token".to_string(),
            flash: Some("Welcome back, alice!".to_string()),
        }
        .render()
        .unwrap();

        assert!(html.contains(r#"name="csrfmiddlewaretoken" value="session-token""#));
        assert!(html.contains("Welcome back, alice!"));
    }
}
