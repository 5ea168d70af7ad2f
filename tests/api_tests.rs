//! HTTP contract tests driving the router in-process.

mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{app, app_with, app_with_config, config, DownDirectory, PASSWORD, SERVICE, USERNAME};
use credential_broker::directory::StaticDirectory;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn post(router: &Router, uri: &str, body: Value) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    send(router, request).await
}

async fn get(router: &Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(router, request).await
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, String) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

fn error_code(body: &str) -> String {
    let value: Value = serde_json::from_str(body).unwrap();
    value["error"]["code"].as_str().unwrap_or_default().to_string()
}

async fn issue(router: &Router) -> String {
    let (status, body) = post(
        router,
        "/authenticate",
        json!({"username": USERNAME, "password": PASSWORD, "service": SERVICE, "groups": ["admins"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let value: Value = serde_json::from_str(&body).unwrap();
    value["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_authenticate_then_validate() {
    let app = app();
    let token = issue(&app.router).await;

    let (status, body) = post(
        &app.router,
        "/validate",
        json!({"username": USERNAME, "service": SERVICE, "token": token}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_empty());
    assert_eq!(app.sessions.len(), 1);
}

#[tokio::test]
async fn test_missing_field_is_bad_request() {
    let app = app();

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": USERNAME, "service": SERVICE, "groups": ["admins"]}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
    assert!(body.contains("password"));
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let app = app();
    let request = Request::builder()
        .method("POST")
        .uri("/validate")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&body), "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_unregistered_service_is_forbidden() {
    let app = app();

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": USERNAME, "password": PASSWORD, "service": "payroll", "groups": ["admins"]}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "SERVICE_NOT_REGISTERED");
}

#[tokio::test]
async fn test_bad_password_is_unauthorized() {
    let app = app();

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": USERNAME, "password": "nope", "service": SERVICE, "groups": ["admins"]}),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(error_code(&body), "AUTHENTICATION_ERROR");
}

#[tokio::test]
async fn test_no_matching_group_is_forbidden() {
    let app = app();

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": "asmith", "password": "hunter2", "service": SERVICE, "groups": ["admins"]}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCESS_DENIED");
}

#[tokio::test]
async fn test_validate_with_other_user_is_not_found() {
    let app = app();
    let token = issue(&app.router).await;

    let (status, body) = post(
        &app.router,
        "/validate",
        json!({"username": "asmith", "service": SERVICE, "token": token}),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(error_code(&body), "TOKEN_NOT_FOUND");
}

#[tokio::test]
async fn test_validate_unregistered_service_is_forbidden() {
    let app = app();
    let token = issue(&app.router).await;

    let (status, _) = post(
        &app.router,
        "/validate",
        json!({"username": USERNAME, "service": "payroll", "token": token}),
    )
    .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_directory_down_hides_detail() {
    let app = app_with(Arc::new(DownDirectory), false);

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": USERNAME, "password": PASSWORD, "service": SERVICE, "groups": ["admins"]}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_code(&body), "DIRECTORY_UNAVAILABLE");
    assert!(!body.contains("connection refused"));
}

#[tokio::test]
async fn test_directory_down_detail_in_debug() {
    let app = app_with(Arc::new(DownDirectory), true);

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": USERNAME, "password": PASSWORD, "service": SERVICE, "groups": ["admins"]}),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("connection refused"));
}

#[tokio::test]
async fn test_health_reports_each_component() {
    let app = app_with(Arc::new(DownDirectory), false);

    let (status, body) = get(&app.router, "/health").await;
    assert_eq!(status, StatusCode::OK);

    let value: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["ldap"]["status"], "Unavailable");
    assert_eq!(value["redis"]["status"], "Available");
    assert_eq!(value["security"]["status"], "Available");
    assert!(value["ldap"].get("detail").is_none());
}

#[tokio::test]
async fn test_request_id_propagated() {
    let app = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_metrics_exposed() {
    let app = app();
    issue(&app.router).await;

    let (status, body) = get(&app.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("broker_authentications_total"));
}

#[tokio::test]
async fn test_served_files() {
    let dir = std::env::temp_dir().join(format!("broker-files-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    let revision = dir.join("rev.txt");
    let docs = dir.join("openapi.yaml");
    std::fs::write(&revision, "3f2a9c1\n").unwrap();
    std::fs::write(&docs, "openapi: 3.0.0\n").unwrap();

    let app = app_with_config(
        Arc::new(common::directory()),
        &credential_broker::Config {
            revision_file: Some(revision),
            docs_file: Some(docs),
            ..config(false)
        },
    );

    let (status, body) = get(&app.router, "/rev.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "3f2a9c1\n");

    let (status, body) = get(&app.router, "/docs").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("openapi"));

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_served_files_absent_by_default() {
    let app = app();

    let (status, _) = get(&app.router, "/rev.txt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app.router, "/docs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_development_directory_issues_mock_groups() {
    let app = app_with(Arc::new(StaticDirectory::development()), false);

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": "anyone", "password": "anything", "service": SERVICE, "groups": ["mock"]}),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = post(
        &app.router,
        "/authenticate",
        json!({"username": "anyone", "password": "anything", "service": SERVICE, "groups": ["admins"]}),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(error_code(&body), "ACCESS_DENIED");
}
