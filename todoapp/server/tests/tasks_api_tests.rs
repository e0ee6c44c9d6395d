use axum::body::Body;
use axum::http::{Request, StatusCode};
use insta::assert_snapshot;
use serde_json::json;

mod common;

use common::{api_request, get, send};

#[tokio::test]
async fn test_create_complete_and_list_task() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let created = api_request(
        &context.app,
        &alice,
        "POST",
        "/api/tasks/",
        Some(json!({"description": "Buy milk"})),
    )
    .await;
    assert_eq!(created.status, StatusCode::CREATED);
    assert_snapshot!(created.body, @r#"{"id":1,"description":"Buy milk","due_date":null,"status":"in-progress","complete_date":null}"#);

    let completed = api_request(
        &context.app,
        &alice,
        "PATCH",
        "/api/tasks/1/",
        Some(json!({"status": "complete"})),
    )
    .await;
    assert_eq!(completed.status, StatusCode::OK);
    assert_eq!(completed.json()["status"], "complete");
    assert_eq!(completed.json()["complete_date"], common::today());

    let listed = api_request(&context.app, &alice, "GET", "/api/tasks/", None).await;
    assert_eq!(listed.status, StatusCode::OK);
    assert_eq!(
        listed.json(),
        json!([{
            "id": 1,
            "description": "Buy milk",
            "due_date": null,
            "status": "complete",
            "complete_date": common::today(),
        }])
    );
    Ok(())
}

#[tokio::test]
async fn test_create_task_with_due_date_and_status() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let body = json!({"description": "File taxes", "due_date": "2030-04-15", "status": "complete"});

    let created = api_request(&context.app, &alice, "POST", "/api/tasks/", Some(body)).await;

    assert_eq!(created.status, StatusCode::CREATED);
    let body = created.json();
    assert_eq!(body["due_date"], "2030-04-15");
    assert_eq!(body["status"], "complete");
    assert_eq!(body["complete_date"], common::today());
    Ok(())
}

#[tokio::test]
async fn test_create_task_without_description_is_rejected() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    for body in [
        json!({}),
        json!({"description": ""}),
        json!({"due_date": "2030-01-01"}),
    ] {
        let response = api_request(&context.app, &alice, "POST", "/api/tasks/", Some(body)).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body, r#"{"error":"Description is required."}"#);
    }

    let listed = api_request(&context.app, &alice, "GET", "/api/tasks/", None).await;
    assert_snapshot!(listed.body, @"[]");
    Ok(())
}

#[tokio::test]
async fn test_create_task_with_blank_description() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;
    let body = json!({"description": "   "});

    let created = api_request(&context.app, &alice, "POST", "/api/tasks/", Some(body)).await;

    assert_eq!(created.status, StatusCode::CREATED);
    assert_eq!(created.json()["description"], "   ");
    Ok(())
}

#[tokio::test]
async fn test_create_task_rejects_invalid_fields() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let bad_date = api_request(
        &context.app,
        &alice,
        "POST",
        "/api/tasks/",
        Some(json!({"description": "Call mum", "due_date": "next week"})),
    )
    .await;
    assert_eq!(bad_date.status, StatusCode::BAD_REQUEST);
    assert_snapshot!(bad_date.body, @r#"{"error":"Invalid due date. Use YYYY-MM-DD."}"#);

    let bad_status = api_request(
        &context.app,
        &alice,
        "POST",
        "/api/tasks/",
        Some(json!({"description": "Call mum", "status": "archived"})),
    )
    .await;
    assert_eq!(bad_status.status, StatusCode::BAD_REQUEST);
    assert_snapshot!(bad_status.body, @r#"{"error":"Status must be one of: in-progress, complete."}"#);
    Ok(())
}

#[tokio::test]
async fn test_malformed_json_is_rejected() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks/")
        .header("cookie", &alice.cookie)
        .header("x-csrftoken", &alice.csrf_token)
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = send(&context.app, request).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_snapshot!(response.body, @r#"{"error":"Invalid JSON body."}"#);
    Ok(())
}

#[tokio::test]
async fn test_update_clears_due_date_and_keeps_other_fields() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;
    let body = json!({"description": "Renew passport", "due_date": "2030-06-01"});
    api_request(&context.app, &alice, "POST", "/api/tasks/", Some(body)).await;

    let updated = api_request(
        &context.app,
        &alice,
        "PUT",
        "/api/tasks/1/",
        Some(json!({"due_date": null})),
    )
    .await;

    assert_eq!(updated.status, StatusCode::OK);
    assert_snapshot!(updated.body, @r#"{"id":1,"description":"Renew passport","due_date":null,"status":"in-progress","complete_date":null}"#);

    let emptied = api_request(
        &context.app,
        &alice,
        "PATCH",
        "/api/tasks/1/",
        Some(json!({"description": ""})),
    )
    .await;
    assert_eq!(emptied.status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn test_other_users_tasks_are_not_found() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;
    let bob = common::login_as(&context, "bob").await;
    api_request(
        &context.app,
        &alice,
        "POST",
        "/api/tasks/",
        Some(json!({"description": "Alice's secret"})),
    )
    .await;

    let fetched = api_request(&context.app, &bob, "GET", "/api/tasks/1/", None).await;
    assert_eq!(fetched.status, StatusCode::NOT_FOUND);
    assert_snapshot!(fetched.body, @r#"{"error":"Task not found or not authorized"}"#);

    let missing = api_request(&context.app, &bob, "GET", "/api/tasks/99/", None).await;
    assert_eq!(missing.body, fetched.body);

    let updated = api_request(
        &context.app,
        &bob,
        "PATCH",
        "/api/tasks/1/",
        Some(json!({"status": "complete"})),
    )
    .await;
    assert_eq!(updated.status, StatusCode::NOT_FOUND);

    let deleted = api_request(&context.app, &bob, "DELETE", "/api/tasks/1/", None).await;
    assert_eq!(deleted.status, StatusCode::NOT_FOUND);

    let listed = api_request(&context.app, &bob, "GET", "/api/tasks/", None).await;
    assert_snapshot!(listed.body, @"[]");

    let still_there = api_request(&context.app, &alice, "GET", "/api/tasks/1/", None).await;
    assert_eq!(still_there.json()["status"], "in-progress");
    Ok(())
}

#[tokio::test]
async fn test_delete_task_then_not_found() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;
    api_request(
        &context.app,
        &alice,
        "POST",
        "/api/tasks/",
        Some(json!({"description": "Short-lived"})),
    )
    .await;

    let deleted = api_request(&context.app, &alice, "DELETE", "/api/tasks/1/", None).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);
    assert!(deleted.body.is_empty());

    let again = api_request(&context.app, &alice, "DELETE", "/api/tasks/1/", None).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);

    let fetched = api_request(&context.app, &alice, "GET", "/api/tasks/1/", None).await;
    assert_eq!(fetched.status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_non_integer_task_id_is_not_found() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let response = api_request(&context.app, &alice, "GET", "/api/tasks/abc/", None).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_snapshot!(response.body, @r#"{"error":"Task not found or not authorized"}"#);
    Ok(())
}

#[tokio::test]
async fn test_anonymous_api_calls_are_unauthorized() -> anyhow::Result<()> {
    let context = common::setup().await?;

    let listed = get(&context.app, "/api/tasks/", None).await;
    assert_eq!(listed.status, StatusCode::UNAUTHORIZED);
    assert_snapshot!(listed.body, @r#"{"error":"Authentication credentials were not provided."}"#);

    let request = Request::builder()
        .method("POST")
        .uri("/api/tasks/")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"description":"Sneaky"}"#))
        .unwrap();
    let created = send(&context.app, request).await;
    assert_eq!(created.status, StatusCode::UNAUTHORIZED);

    let forged = get(&context.app, "/api/tasks/", Some("auth_token=not-a-jwt")).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn test_mutations_without_csrf_token_are_forbidden() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let missing_header = Request::builder()
        .method("POST")
        .uri("/api/tasks/")
        .header("cookie", &alice.cookie)
        .header("content-type", "application/json")
        .body(Body::from(r#"{"description":"No token"}"#))
        .unwrap();
    let response = send(&context.app, missing_header).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_snapshot!(response.body, @r#"{"error":"CSRF token missing or incorrect."}"#);

    let wrong_header = Request::builder()
        .method("POST")
        .uri("/api/tasks/")
        .header("cookie", &alice.cookie)
        .header("x-csrftoken", "guessed")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"description":"Wrong token"}"#))
        .unwrap();
    let response = send(&context.app, wrong_header).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let listed = api_request(&context.app, &alice, "GET", "/api/tasks/", None).await;
    assert_snapshot!(listed.body, @"[]");
    Ok(())
}

#[tokio::test]
async fn test_get_csrf_token() -> anyhow::Result<()> {
    let context = common::setup().await?;
    let alice = common::login_as(&context, "alice").await;

    let session_token = get(&context.app, "/api/get-csrf-token/", Some(&alice.cookie)).await;
    assert_eq!(session_token.status, StatusCode::OK);
    assert_eq!(session_token.json()["csrftoken"], alice.csrf_token);
    assert_eq!(
        session_token.cookie("csrftoken"),
        Some(alice.csrf_token.clone())
    );

    let anonymous_token = get(&context.app, "/api/get-csrf-token/", None).await;
    assert_eq!(anonymous_token.status, StatusCode::OK);
    let token = anonymous_token.json()["csrftoken"]
        .as_str()
        .unwrap()
        .to_string();
    assert_eq!(token.len(), 64);
    assert_eq!(anonymous_token.cookie("csrftoken"), Some(token));
    Ok(())
}

#[tokio::test]
async fn test_openapi_document_is_served() -> anyhow::Result<()> {
    let context = common::setup().await?;

    let response = get(&context.app, "/api-docs/openapi.json", None).await;

    assert_eq!(response.status, StatusCode::OK);
    let paths = &response.json()["paths"];
    assert!(paths.get("/api/tasks/").is_some());
    assert!(paths.get("/api/tasks/{id}/").is_some());
    Ok(())
}
