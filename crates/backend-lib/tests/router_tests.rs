//! HTTP surface tests driven through `tower::ServiceExt::oneshot`.
mod common;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use common::{library, state_with_store, test_settings};
use serde_json::Value;
use tower::ServiceExt;
use tunepool_backend::{provider::FixtureProvider, routes::create_router, storage::MemoryStorage};

fn app() -> Router {
    let provider = FixtureProvider::new(50);
    provider.insert("alice".to_string(), library(&["t1", "t2"], vec![]));
    provider.insert("bob".to_string(), library(&["t2"], vec![]));
    let (state, _telemetry) = state_with_store(Arc::new(MemoryStorage::new()), provider, test_settings(50));
    create_router(state)
}

fn request(method: &str, uri: &str, user: Option<&str>, body: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create(app: &Router, user: &str, name: &str) -> String {
    let body = format!(r#"{{"room_name":"{name}"}}"#);
    let (status, json) = send(app, request("POST", "/rooms", Some(user), Some(&body))).await;
    assert_eq!(status, StatusCode::CREATED);
    json["room_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let (status, json) = send(&app(), request("GET", "/health", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let (status, json) = send(&app(), request("GET", "/rooms", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "AUTH_001");
}

#[tokio::test]
async fn test_create_and_get_room() {
    let app = app();
    let room_id = create(&app, "alice", "").await;

    let (status, json) = send(&app, request("GET", &format!("/rooms/{room_id}"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["name"], format!("Room #{room_id}"));
    assert_eq!(json["status"], "unprocessed");
    assert_eq!(json["is_owner"], true);

    let (status, json) = send(&app, request("GET", &format!("/rooms/{room_id}"), Some("bob"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "AUTH_002");

    let (status, _) = send(&app, request("GET", "/rooms/unknown", Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_join_lock_and_list() {
    let app = app();
    let room_id = create(&app, "alice", "Road trip").await;

    let (status, _) = send(&app, request("POST", &format!("/rooms/{room_id}/users"), Some("bob"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, request("POST", &format!("/rooms/{room_id}/lock"), Some("bob"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"]["code"], "AUTH_003");

    let (status, _) = send(&app, request("POST", &format!("/rooms/{room_id}/lock"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, json) = send(&app, request("POST", &format!("/rooms/{room_id}/users"), Some("carol"), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "ROOM_002");

    let (status, json) = send(&app, request("GET", "/rooms", Some("bob"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["name"], "Road trip");
}

#[tokio::test]
async fn test_process_and_result() {
    let app = app();
    let room_id = create(&app, "alice", "").await;

    let (status, json) = send(&app, request("GET", &format!("/rooms/{room_id}/result"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"]["code"], "PROC_002");

    let (status, json) = send(&app, request("POST", &format!("/rooms/{room_id}/process"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "started");

    let (status, json) = send(&app, request("POST", &format!("/rooms/{room_id}/process"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["status"] == "already_running" || json["status"] == "already_processed");
}

#[tokio::test]
async fn test_delete_room() {
    let app = app();
    let room_id = create(&app, "alice", "").await;

    let (status, _) = send(&app, request("DELETE", &format!("/rooms/{room_id}"), Some("bob"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(&app, request("DELETE", &format!("/rooms/{room_id}"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, request("GET", &format!("/rooms/{room_id}"), Some("alice"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
