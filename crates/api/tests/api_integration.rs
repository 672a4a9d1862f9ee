//! Integration tests for the API server.

use std::sync::OnceLock;

use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> Router {
    let state = api::create_default_state(&Config::default()).unwrap();
    api::create_app(state, get_metrics_handle())
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };
    app.clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap()
}

async fn json_body(response: Response<Body>) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn register(app: &Router, nickname: &str) -> String {
    let response = send(
        app,
        "POST",
        "/users",
        None,
        Some(json!({ "nickname": nickname })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    json_body(response).await["id"].as_str().unwrap().to_string()
}

async fn befriend(app: &Router, a: &str, b: &str) {
    let response = send(
        app,
        "POST",
        "/friend-requests",
        Some(a),
        Some(json!({ "receiver_id": b, "remark": "hi" })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let request_id = json_body(response).await["id"].as_i64().unwrap();

    let response = send(
        app,
        "POST",
        &format!("/friend-requests/{request_id}/accept"),
        Some(b),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let response = send(&app, "GET", "/health", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = send(&app, "GET", "/metrics", None, None).await;

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_missing_user_header_is_unauthorized() {
    let app = setup();

    let response = send(&app, "GET", "/friends", None, None).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let json = json_body(response).await;
    assert!(json["error"].as_str().unwrap().contains("x-user-id"));
}

#[tokio::test]
async fn test_register_rejects_blank_nickname() {
    let app = setup();

    let response = send(&app, "POST", "/users", None, Some(json!({ "nickname": "  " }))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_friend_request_flow() {
    let app = setup();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;

    let response = send(
        &app,
        "POST",
        "/friend-requests",
        Some(&alice),
        Some(json!({ "receiver_id": bob })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let request_id = json_body(response).await["id"].as_i64().unwrap();

    let response = send(&app, "GET", "/friend-requests", Some(&bob), None).await;
    let pending = json_body(response).await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
    assert_eq!(pending[0]["sender_id"], alice.as_str());

    // only the receiver may answer
    let response = send(
        &app,
        "POST",
        &format!("/friend-requests/{request_id}/accept"),
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(
        &app,
        "POST",
        &format!("/friend-requests/{request_id}/accept"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let handled = json_body(response).await;
    assert_eq!(handled["status"], "accepted");
    assert!(handled["dialog_id"].is_i64());

    let response = send(&app, "GET", "/friends", Some(&alice), None).await;
    let friends = json_body(response).await;
    assert_eq!(friends.as_array().unwrap().len(), 1);
    assert_eq!(friends[0]["user_id"], bob.as_str());
    assert_eq!(friends[0]["nickname"], "bob");
}

#[tokio::test]
async fn test_duplicate_friend_request_conflicts() {
    let app = setup();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let body = json!({ "receiver_id": bob });

    let first = send(&app, "POST", "/friend-requests", Some(&alice), Some(body.clone())).await;
    let second = send(&app, "POST", "/friend-requests", Some(&alice), Some(body)).await;

    assert_eq!(first.status(), StatusCode::CREATED);
    assert_eq!(second.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_reject_then_accept_conflicts() {
    let app = setup();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    let response = send(
        &app,
        "POST",
        "/friend-requests",
        Some(&alice),
        Some(json!({ "receiver_id": bob })),
    )
    .await;
    let request_id = json_body(response).await["id"].as_i64().unwrap();

    let rejected = send(
        &app,
        "POST",
        &format!("/friend-requests/{request_id}/reject"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::OK);
    assert_eq!(json_body(rejected).await["status"], "rejected");

    let accepted = send(
        &app,
        "POST",
        &format!("/friend-requests/{request_id}/accept"),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(accepted.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_friend() {
    let app = setup();
    let alice = register(&app, "alice").await;
    let bob = register(&app, "bob").await;
    befriend(&app, &alice, &bob).await;

    let response = send(&app, "DELETE", &format!("/friends/{bob}"), Some(&alice), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["friend_id"], bob.as_str());

    let response = send(&app, "GET", "/friends", Some(&alice), None).await;
    assert!(json_body(response).await.as_array().unwrap().is_empty());

    let again = send(&app, "DELETE", &format!("/friends/{bob}"), Some(&alice), None).await;
    assert_eq!(again.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_group_lifecycle() {
    let app = setup();
    let owner = register(&app, "owner").await;
    let carol = register(&app, "carol").await;
    let dave = register(&app, "dave").await;
    befriend(&app, &owner, &carol).await;
    befriend(&app, &owner, &dave).await;

    let response = send(
        &app,
        "POST",
        "/groups",
        Some(&owner),
        Some(json!({ "name": "rustaceans", "member_ids": [carol, dave] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await;
    let group_id = created["group"]["id"].as_i64().unwrap();
    assert_eq!(created["group"]["name"], "rustaceans");

    let response = send(&app, "GET", &format!("/groups/{group_id}"), None, None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["creator_id"], owner.as_str());

    let response = send(
        &app,
        "GET",
        &format!("/groups/{group_id}/members"),
        Some(&carol),
        None,
    )
    .await;
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 3);

    let response = send(
        &app,
        "DELETE",
        &format!("/groups/{group_id}/members"),
        Some(&owner),
        Some(json!({ "member_ids": [dave] })),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(
        &app,
        "GET",
        &format!("/groups/{group_id}/members"),
        Some(&dave),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // members cannot dissolve the group
    let response = send(&app, "DELETE", &format!("/groups/{group_id}"), Some(&carol), None).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = send(&app, "DELETE", &format!("/groups/{group_id}"), Some(&owner), None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["group_id"], group_id);

    let response = send(&app, "GET", &format!("/groups/{group_id}"), None, None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_group_with_stranger_is_forbidden() {
    let app = setup();
    let owner = register(&app, "owner").await;
    let stranger = register(&app, "stranger").await;

    let response = send(
        &app,
        "POST",
        "/groups",
        Some(&owner),
        Some(json!({ "name": "club", "member_ids": [stranger] })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_ids_are_bad_requests() {
    let app = setup();
    let alice = register(&app, "alice").await;

    let group = send(&app, "GET", "/groups/not-a-number", None, None).await;
    let friend = send(&app, "DELETE", "/friends/not-a-uuid", Some(&alice), None).await;

    assert_eq!(group.status(), StatusCode::BAD_REQUEST);
    assert_eq!(friend.status(), StatusCode::BAD_REQUEST);
}
