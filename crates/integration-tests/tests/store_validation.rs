//! Storefront identity and input checks that fail before any query runs.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use sagebrush_integration_tests::{TestApp, as_customer, get, json_request};
use serde_json::json;

#[tokio::test]
async fn test_customer_routes_require_identity() {
    let app = TestApp::offline();

    for uri in ["/store/me/membership", "/store/me/points", "/store/orders", "/store/returns"] {
        let (status, body) = app.send_json(get(uri)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "Customer login required", "{uri}");
    }
}

#[tokio::test]
async fn test_malformed_customer_header_is_rejected() {
    let app = TestApp::offline();
    let mut request = get("/store/me/membership");
    request
        .headers_mut()
        .insert("x-customer-id", "abc".parse().unwrap());

    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Malformed customer id");

    let request = as_customer(get("/store/me/membership"), 0);
    let (status, _) = app.send_json(request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guest_review_requires_email() {
    let app = TestApp::offline();
    let request = json_request(
        "POST",
        "/store/products/1/reviews",
        &json!({
            "author_name": "Dana",
            "rating": 5,
            "body": "Fits well."
        }),
    );

    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("guest_email"));
}

#[tokio::test]
async fn test_guest_review_rejects_invalid_email() {
    let app = TestApp::offline();
    let request = json_request(
        "POST",
        "/store/products/1/reviews",
        &json!({
            "author_name": "Dana",
            "rating": 4,
            "body": "Fits well.",
            "guest_email": "not-an-email"
        }),
    );

    let (status, _) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_shipping_rates_validate_destination() {
    let app = TestApp::offline();
    let request = json_request(
        "POST",
        "/store/shipping/rates",
        &json!({
            "subtotal_cents": 4_500,
            "destination": { "country_code": "USA" }
        }),
    );

    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("country"));
}

#[tokio::test]
async fn test_shipping_rates_reject_negative_subtotal() {
    let app = TestApp::offline();
    let request = json_request(
        "POST",
        "/store/shipping/rates",
        &json!({
            "subtotal_cents": -1,
            "destination": { "country_code": "US" }
        }),
    );

    let (status, body) = app.send_json(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "subtotal_cents must not be negative");
}
