//! Admin-edited content reads back exactly as it was saved.
//!
//! Requires `TEST_DATABASE_URL`; run with `cargo test -- --ignored`.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sagebrush_integration_tests::{TestApp, as_admin, get, json_request};
use serde_json::{Value, json};
use uuid::Uuid;

/// Compare `fields` of `submitted` against `stored`, exactly.
fn assert_fields(submitted: &Value, stored: &Value, fields: &[&str]) {
    for field in fields {
        assert_eq!(submitted[field], stored[field], "{field}: {stored}");
    }
}

/// Compare NUMERIC fields by value; the column scale pads trailing zeros.
fn assert_decimals(submitted: &Value, stored: &Value, fields: &[&str]) {
    for field in fields {
        let expected: Decimal = submitted[field].as_str().unwrap().parse().unwrap();
        let actual: Decimal = stored[field].as_str().unwrap().parse().unwrap();
        assert_eq!(expected, actual, "{field}: {stored}");
    }
}

fn assert_instants(submitted: &Value, stored: &Value, fields: &[&str]) {
    for field in fields {
        let parse = |v: &Value| -> DateTime<Utc> { v.as_str().unwrap().parse().unwrap() };
        assert_eq!(parse(&submitted[field]), parse(&stored[field]), "{field}: {stored}");
    }
}

async fn admin(app: &TestApp, method: &str, uri: &str, body: &Value) -> (StatusCode, Value) {
    app.send_json(as_admin(json_request(method, uri, body))).await
}

async fn admin_get(app: &TestApp, uri: &str) -> Value {
    let (status, body) = app.send_json(as_admin(get(uri))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_banner_round_trip() {
    const FIELDS: &[&str] = &[
        "title",
        "subtitle",
        "image_url",
        "link_url",
        "sort_order",
        "is_active",
    ];
    let Some(app) = TestApp::database().await else {
        return;
    };

    let submitted = json!({
        "title": "Spring restock",
        "subtitle": "New colours in every size",
        "image_url": "https://cdn.sagebrush.test/banners/spring.png",
        "link_url": "https://shop.sagebrush.test/collections/spring",
        "sort_order": 3,
        "is_active": true,
        "starts_at": "2026-03-01T08:00:00Z",
        "ends_at": "2026-04-01T08:00:00Z"
    });
    let (status, created) = admin(&app, "POST", "/admin/banners", &submitted).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let uri = format!("/admin/banners/{}", created["id"]);

    let stored = admin_get(&app, &uri).await;
    assert_fields(&submitted, &stored, FIELDS);
    assert_instants(&submitted, &stored, &["starts_at", "ends_at"]);

    let replaced = json!({
        "title": "Summer sale",
        "subtitle": null,
        "image_url": "https://cdn.sagebrush.test/banners/summer.png",
        "link_url": null,
        "sort_order": 1,
        "is_active": false,
        "starts_at": null,
        "ends_at": "2026-09-01T00:00:00Z"
    });
    let (status, updated) = admin(&app, "PUT", &uri, &replaced).await;
    assert_eq!(status, StatusCode::OK, "{updated}");

    let stored = admin_get(&app, &uri).await;
    assert_fields(&replaced, &stored, FIELDS);
    assert_fields(&replaced, &stored, &["starts_at"]);
    assert_instants(&replaced, &stored, &["ends_at"]);
    assert_eq!(stored["id"], created["id"]);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_tier_round_trip() {
    const FIELDS: &[&str] = &[
        "name",
        "rank",
        "order_threshold",
        "spend_threshold_cents",
        "is_default",
        "is_active",
        "description",
    ];
    const DECIMALS: &[&str] = &["points_multiplier", "discount_percent"];
    let Some(app) = TestApp::database().await else {
        return;
    };

    // name and rank are unique across runs against the same database
    let suffix = Uuid::new_v4().simple().to_string();
    let rank = i32::try_from(Uuid::new_v4().as_u128() % 1_000_000).unwrap() + 1_000;

    let submitted = json!({
        "name": format!("Juniper {suffix}"),
        "rank": rank,
        "order_threshold": 4,
        "spend_threshold_cents": 25_000,
        "points_multiplier": "1.2345",
        "discount_percent": "7.25",
        "is_default": false,
        "is_active": true,
        "description": "Four orders and $250 a year"
    });
    let (status, created) = admin(&app, "POST", "/admin/tiers", &submitted).await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let uri = format!("/admin/tiers/{}", created["id"]);

    let stored = admin_get(&app, &uri).await;
    assert_fields(&submitted, &stored, FIELDS);
    assert_decimals(&submitted, &stored, DECIMALS);

    let replaced = json!({
        "name": format!("Sage {suffix}"),
        "rank": rank,
        "order_threshold": 6,
        "spend_threshold_cents": 40_000,
        "points_multiplier": "9999.9999",
        "discount_percent": "100",
        "is_default": false,
        "is_active": false,
        "description": null
    });
    let (status, updated) = admin(&app, "PUT", &uri, &replaced).await;
    assert_eq!(status, StatusCode::OK, "{updated}");

    let stored = admin_get(&app, &uri).await;
    assert_fields(&replaced, &stored, FIELDS);
    assert_decimals(&replaced, &stored, DECIMALS);

    // finer than the column holds is refused, not rounded
    let mut too_precise = replaced.clone();
    too_precise["points_multiplier"] = json!("1.23456");
    let (status, body) = admin(&app, "PUT", &uri, &too_precise).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, _) = app
        .send_json(as_admin(json_request("DELETE", &uri, &Value::Null)))
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_shipping_settings_round_trip() {
    const FIELDS: &[&str] = &[
        "free_shipping_threshold_cents",
        "flat_rate_cents",
        "currency_code",
        "origin_postal_code",
        "origin_country_code",
        "use_live_rates",
    ];
    let Some(app) = TestApp::database().await else {
        return;
    };

    let submitted = json!({
        "free_shipping_threshold_cents": 7_500,
        "flat_rate_cents": 895,
        "currency_code": "CAD",
        "origin_postal_code": "V6B 1A1",
        "origin_country_code": "CA",
        "use_live_rates": true
    });
    let (status, saved) = admin(&app, "PUT", "/admin/shipping-settings", &submitted).await;
    assert_eq!(status, StatusCode::OK, "{saved}");
    assert_fields(&submitted, &saved, FIELDS);

    let stored = admin_get(&app, "/admin/shipping-settings").await;
    assert_fields(&submitted, &stored, FIELDS);

    let replaced = json!({
        "free_shipping_threshold_cents": null,
        "flat_rate_cents": 0,
        "currency_code": "USD",
        "origin_postal_code": null,
        "origin_country_code": null,
        "use_live_rates": false
    });
    let (status, saved) = admin(&app, "PUT", "/admin/shipping-settings", &replaced).await;
    assert_eq!(status, StatusCode::OK, "{saved}");

    let stored = admin_get(&app, "/admin/shipping-settings").await;
    assert_fields(&replaced, &stored, FIELDS);
}
