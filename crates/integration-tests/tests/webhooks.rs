//! Payment webhook signature checks and duplicate delivery handling.
//!
//! Only event types that need no database are delivered here; order updates
//! are covered by the database-backed flow test.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use sagebrush_integration_tests::{TestApp, WEBHOOK_SECRET, from_ip, signed_webhook};
use sagebrush_server::config::WindowLimit;
use sagebrush_server::services::webhooks::{SIGNATURE_HEADER, sign};
use serde_json::{Value, json};

fn ignored_event(id: &str) -> Value {
    json!({
        "id": id,
        "type": "customer.created",
        "data": { "object": { "id": "cus_123" } }
    })
}

fn delivery(body: &str, signature: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/payments")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(signature) = signature {
        builder = builder.header(SIGNATURE_HEADER, signature);
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

#[tokio::test]
async fn test_missing_signature_is_unauthorized() {
    let app = TestApp::offline();
    let body = ignored_event("evt_nosig").to_string();

    let (status, body) = app.send_json(delivery(&body, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid webhook signature");
}

#[tokio::test]
async fn test_wrong_secret_is_unauthorized() {
    let app = TestApp::offline();
    let body = ignored_event("evt_wrong").to_string();
    let signature = sign("whsec_someone_else", Utc::now().timestamp(), body.as_bytes()).unwrap();

    let response = app.send(delivery(&body, Some(&signature))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_stale_signature_is_unauthorized() {
    let app = TestApp::offline();
    let body = ignored_event("evt_stale").to_string();
    let signature = sign(WEBHOOK_SECRET, Utc::now().timestamp() - 3_600, body.as_bytes()).unwrap();

    let response = app.send(delivery(&body, Some(&signature))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_tampered_body_is_unauthorized() {
    let app = TestApp::offline();
    let body = ignored_event("evt_tamper").to_string();
    let signature = sign(WEBHOOK_SECRET, Utc::now().timestamp(), body.as_bytes()).unwrap();
    let tampered = ignored_event("evt_tamper_2").to_string();

    let response = app.send(delivery(&tampered, Some(&signature))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_payload_is_bad_request() {
    let app = TestApp::offline();

    let (status, _) = app.send_json(signed_webhook(&json!({ "hello": "world" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_redelivered_event_is_acknowledged_once() {
    let app = TestApp::offline();
    let event = ignored_event("evt_dup_1");

    let (status, body) = app.send_json(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true, "duplicate": false }));

    let (status, body) = app.send_json(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true, "duplicate": true }));

    let (_, body) = app.send_json(signed_webhook(&ignored_event("evt_dup_2"))).await;
    assert_eq!(body["duplicate"], false);
}

#[tokio::test]
async fn test_failed_processing_releases_the_claim() {
    let app = TestApp::offline();
    // a known type whose object cannot be parsed fails before any query
    let event = json!({
        "id": "evt_bad_object",
        "type": "payment_intent.succeeded",
        "data": { "object": { "unexpected": true } }
    });

    let (status, _) = app.send_json(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // the retry is processed again rather than treated as a duplicate
    let (status, _) = app.send_json(signed_webhook(&event)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_is_rate_limited() {
    let app = TestApp::offline_with(|config| {
        config.rate_limit.webhook = WindowLimit {
            max_requests: 2,
            window: Duration::from_secs(60),
        };
    });

    for n in 0..2 {
        let request = from_ip(signed_webhook(&ignored_event(&format!("evt_rl_{n}"))), "203.0.113.80");
        assert_eq!(app.send(request).await.status(), StatusCode::OK);
    }

    let request = from_ip(signed_webhook(&ignored_event("evt_rl_2")), "203.0.113.80");
    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
}
