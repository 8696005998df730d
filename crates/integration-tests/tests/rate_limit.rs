//! Sliding-window limits on storefront and webhook traffic.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::{StatusCode, header};
use sagebrush_integration_tests::{TestApp, from_ip, get};
use sagebrush_server::config::WindowLimit;

fn strict_app() -> TestApp {
    TestApp::offline_with(|config| {
        config.rate_limit.api = WindowLimit {
            max_requests: 3,
            window: Duration::from_secs(60),
        };
        config.rate_limit.webhook = WindowLimit {
            max_requests: 2,
            window: Duration::from_secs(60),
        };
        config.rate_limit.block = Duration::from_secs(120);
    })
}

#[tokio::test]
async fn test_store_requests_over_limit_are_blocked() {
    let app = strict_app();

    for _ in 0..3 {
        let response = app.send(from_ip(get("/store/me/membership"), "203.0.113.7")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let response = app.send(from_ip(get("/store/me/membership"), "203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "120");

    // still blocked, with the remaining wait
    let response = app.send(from_ip(get("/store/me/membership"), "203.0.113.7")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=120).contains(&retry));
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let app = strict_app();

    for _ in 0..4 {
        app.send(from_ip(get("/store/me/points"), "198.51.100.1")).await;
    }
    let response = app.send(from_ip(get("/store/me/points"), "198.51.100.1")).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

    let response = app.send(from_ip(get("/store/me/points"), "198.51.100.2")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_and_admin_are_not_store_limited() {
    let app = strict_app();

    for _ in 0..10 {
        let response = app.send(from_ip(get("/health"), "192.0.2.9")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    for _ in 0..10 {
        let response = app.send(from_ip(get("/admin/tiers"), "192.0.2.9")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn test_rate_limited_body_is_json_error() {
    let app = strict_app();
    for _ in 0..3 {
        app.send(from_ip(get("/store/orders"), "203.0.113.50")).await;
    }

    let (status, body) = app
        .send_json(from_ip(get("/store/orders"), "203.0.113.50"))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());
}
