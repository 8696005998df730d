//! Admin routes require the shared bearer token.

#![allow(clippy::unwrap_used)]

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use sagebrush_integration_tests::{TestApp, get, json_request};
use serde_json::json;

#[tokio::test]
async fn test_admin_routes_reject_missing_token() {
    let app = TestApp::offline();

    for uri in [
        "/admin/orders",
        "/admin/returns",
        "/admin/reviews",
        "/admin/banners",
        "/admin/tiers",
        "/admin/shipping-settings",
        "/admin/customers",
        "/admin/inventory/low-stock",
    ] {
        let (status, body) = app.send_json(get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "Missing bearer token", "{uri}");
    }
}

#[tokio::test]
async fn test_admin_routes_reject_wrong_token() {
    let app = TestApp::offline();
    let request = Request::builder()
        .uri("/admin/tiers")
        .header(header::AUTHORIZATION, "Bearer not-the-admin-token")
        .body(Body::empty())
        .unwrap();

    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid bearer token");
}

#[tokio::test]
async fn test_admin_mutations_reject_missing_token() {
    let app = TestApp::offline();
    let request = json_request(
        "POST",
        "/admin/customers/1/points/adjust",
        &json!({ "amount": 500, "note": "goodwill" }),
    );

    let response = app.send(request).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
