//! End-to-end tests through the public and admin HTTP APIs.

use std::sync::Arc;
use std::time::Duration;

use failover_gateway::admin::setup_admin_router;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

mod common;

#[tokio::test]
async fn test_health() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;

    let res = common::client().get(gateway.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    gateway.stop().await;
}

#[tokio::test]
async fn test_no_messages_is_no_content() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;

    let res = common::client().get(gateway.url("/api/message")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    gateway.stop().await;
}

#[tokio::test]
async fn test_sent_message_is_consumed() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;
    let client = common::client();

    let res = client
        .post(gateway.url("/api/message"))
        .json(&json!({ "body": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let store = gateway.gateway.store().clone();
    assert!(common::eventually(Duration::from_secs(5), || store.len() == 1).await);

    let res = client.get(gateway.url("/api/message")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let listed: Vec<String> = res.json().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].starts_with("Sender: primary Receiver: primary-receiver-"));
    assert!(listed[0].ends_with("Body: hello"));

    gateway.stop().await;
}

#[tokio::test]
async fn test_message_via_secondary_when_primary_down() {
    let registry = common::registry();
    let gateway = common::start_gateway(common::test_config(), registry.clone()).await;
    registry.namespace("primary").set_available(false);

    let res = common::client()
        .post(gateway.url("/api/message"))
        .json(&json!({ "body": "rerouted" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let store = gateway.gateway.store().clone();
    assert!(common::eventually(Duration::from_secs(5), || store.len() == 1).await);
    let message = &store.list()[0];
    assert_eq!(message.sender, "secondary");
    assert_eq!(message.body, "rerouted");

    gateway.stop().await;
}

#[tokio::test]
async fn test_missing_body_is_bad_request() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;
    let client = common::client();

    let res = client.post(gateway.url("/api/message")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert!(body["error"].is_string());

    let res = client
        .post(gateway.url("/api/blob"))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    gateway.stop().await;
}

#[tokio::test]
async fn test_blob_round_trip() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;
    let client = common::client();

    let res = client
        .post(gateway.url("/api/blob"))
        .json(&json!({ "body": "contents", "name": "report", "container": "docs" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let saved: Value = res.json().await.unwrap();
    assert_eq!(saved, json!({ "body": "contents", "name": "report", "container": "docs" }));

    let res = client.get(gateway.url("/api/blob/docs/report")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let fetched: Value = res.json().await.unwrap();
    assert_eq!(fetched, saved);

    gateway.stop().await;
}

#[tokio::test]
async fn test_blob_defaults_applied() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;

    let res = common::client()
        .post(gateway.url("/api/blob"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let saved: Value = res.json().await.unwrap();
    assert_eq!(saved["body"], "empty");
    assert_eq!(saved["name"], "defaultblob");
    assert_eq!(saved["container"], "default-container");

    gateway.stop().await;
}

#[tokio::test]
async fn test_missing_blob_is_not_found() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;

    let res = common::client()
        .get(gateway.url("/api/blob/docs/nothing"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    gateway.stop().await;
}

#[tokio::test]
async fn test_all_endpoints_down_returns_generic_error() {
    let registry = common::registry();
    let gateway = common::start_gateway(common::test_config(), registry.clone()).await;
    registry.namespace("primary").set_available(false);
    registry.namespace("secondary").set_available(false);
    let client = common::client();

    let res = client
        .post(gateway.url("/api/message"))
        .json(&json!({ "body": "lost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = res.text().await.unwrap();
    assert!(text.contains("Failed to send message."));
    assert!(!text.contains("primary"));
    assert!(!text.contains("secondary"));

    let res = client
        .post(gateway.url("/api/blob"))
        .json(&json!({ "body": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.text().await.unwrap().contains("Failed to save blob data."));

    let res = client.get(gateway.url("/api/blob/docs/report")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(res.text().await.unwrap().contains("Failed to read blob data."));

    gateway.stop().await;
}

#[tokio::test]
async fn test_admin_status_requires_key() {
    let gateway = common::start_gateway(common::test_config(), common::registry()).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = setup_admin_router(Arc::clone(&gateway.gateway));
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    let client = common::client();
    let url = format!("http://{}/admin/status", addr);

    let res = client.get(&url).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(&url).bearer_auth("wrong").send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client.get(&url).bearer_auth(common::ADMIN_KEY).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let status: Value = res.json().await.unwrap();
    assert_eq!(status["messaging"]["breaker"]["state"], "closed");
    assert_eq!(status["storage"]["primary"], "memory://primary");
    assert_eq!(status["receiver_running"], true);

    gateway.stop().await;
}
