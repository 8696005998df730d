//! End-to-end order, loyalty and return flow against PostgreSQL.
//!
//! Requires `TEST_DATABASE_URL`; run with `cargo test -- --ignored`.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use sagebrush_integration_tests::{
    TestApp, as_admin, as_customer, get, json_request, signed_webhook,
};
use serde_json::{Value, json};
use uuid::Uuid;

async fn create_customer(app: &TestApp) -> i32 {
    let email = format!("flow-{}@example.com", Uuid::new_v4().simple());
    let (status, body) = app
        .send_json(as_admin(json_request(
            "POST",
            "/admin/customers",
            &json!({ "email": email, "first_name": "Flow" }),
        )))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    i32::try_from(body["id"].as_i64().unwrap()).unwrap()
}

async fn create_order(app: &TestApp, customer_id: i32, total_cents: i64, reference: &str) -> Value {
    let (status, body) = app
        .send_json(as_admin(json_request(
            "POST",
            "/admin/orders",
            &json!({
                "customer_id": customer_id,
                "email": "orders@example.com",
                "total_cents": total_cents,
                "payment_reference": reference
            }),
        )))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

async fn balance(app: &TestApp, customer_id: i32) -> i64 {
    let (status, body) = app
        .send_json(as_customer(get("/store/me/membership"), customer_id))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["points_balance"].as_i64().unwrap()
}

fn payment_succeeded(reference: &str, order_id: &Value) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "payment_intent.succeeded",
        "data": { "object": {
            "id": reference,
            "metadata": { "order_id": order_id.to_string() }
        } }
    })
}

fn charge_refunded(reference: &str, amount_refunded: i64) -> Value {
    json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": "charge.refunded",
        "data": { "object": {
            "id": format!("ch_{}", Uuid::new_v4().simple()),
            "payment_intent": reference,
            "amount_refunded": amount_refunded
        } }
    })
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_payment_refund_and_return_flow() {
    let Some(app) = TestApp::database().await else {
        return;
    };

    let customer_id = create_customer(&app).await;
    let reference = format!("pi_{}", Uuid::new_v4().simple());
    let order = create_order(&app, customer_id, 10_000, &reference).await;
    let order_id = order["id"].clone();
    assert_eq!(order["extension"]["payment_status"], "awaiting");
    assert_eq!(balance(&app, customer_id).await, 0);

    // payment earns one point per cent before any tier applies
    let paid = payment_succeeded(&reference, &order_id);
    let (status, ack) = app.send_json(signed_webhook(&paid)).await;
    assert_eq!(status, StatusCode::OK, "{ack}");
    assert_eq!(ack["duplicate"], false);
    assert_eq!(balance(&app, customer_id).await, 10_000);

    // the same delivery again changes nothing
    let (_, ack) = app.send_json(signed_webhook(&paid)).await;
    assert_eq!(ack["duplicate"], true);
    assert_eq!(balance(&app, customer_id).await, 10_000);

    // a quarter refunded at the provider takes back a quarter of the points
    let (status, _) = app
        .send_json(signed_webhook(&charge_refunded(&reference, 2_500)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance(&app, customer_id).await, 7_500);

    // a later notification with the same cumulative amount is a no-op
    app.send_json(signed_webhook(&charge_refunded(&reference, 2_500)))
        .await;
    assert_eq!(balance(&app, customer_id).await, 7_500);

    let (status, order) = app
        .send_json(as_admin(get(&format!("/admin/orders/{order_id}"))))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["extension"]["payment_status"], "partially_refunded");
    assert_eq!(order["extension"]["refunded_cents"], 2_500);

    // redemption
    let (status, redeemed) = app
        .send_json(as_customer(
            json_request("POST", "/store/me/points/redeem", &json!({ "points": 500 })),
            customer_id,
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{redeemed}");
    assert_eq!(redeemed["points_balance"], 7_000);

    let (status, _) = app
        .send_json(as_customer(
            json_request("POST", "/store/me/points/redeem", &json!({ "points": 1_000_000 })),
            customer_id,
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // return workflow
    let (status, ret) = app
        .send_json(as_customer(
            json_request(
                "POST",
                "/store/returns",
                &json!({
                    "order_id": order_id,
                    "reason": "Too small",
                    "items": [{ "variant_id": 1, "quantity": 1 }]
                }),
            ),
            customer_id,
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{ret}");
    assert_eq!(ret["status"], "requested");
    let return_id = ret["id"].clone();

    // a second open return on the same order is refused
    let (status, _) = app
        .send_json(as_customer(
            json_request(
                "POST",
                "/store/returns",
                &json!({
                    "order_id": order_id,
                    "reason": "Again",
                    "items": [{ "variant_id": 1, "quantity": 1 }]
                }),
            ),
            customer_id,
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // refund before receipt is an invalid transition
    let refund_uri = format!("/admin/returns/{return_id}/refund");
    let (status, _) = app
        .send_json(as_admin(json_request(
            "POST",
            &refund_uri,
            &json!({ "amount_cents": 2_500 }),
        )))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    for step in ["approve", "received"] {
        let (status, body) = app
            .send_json(as_admin(json_request(
                "POST",
                &format!("/admin/returns/{return_id}/{step}"),
                &json!({}),
            )))
            .await;
        assert_eq!(status, StatusCode::OK, "{step}: {body}");
    }

    // more than what is left to refund
    let (status, _) = app
        .send_json(as_admin(json_request(
            "POST",
            &refund_uri,
            &json!({ "amount_cents": 8_000 }),
        )))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, refunded) = app
        .send_json(as_admin(json_request(
            "POST",
            &refund_uri,
            &json!({ "amount_cents": 2_500, "note": "One item back" }),
        )))
        .await;
    assert_eq!(status, StatusCode::OK, "{refunded}");
    assert_eq!(refunded["status"], "refunded");
    assert_eq!(refunded["refund_cents"], 2_500);

    // half refunded in total, so half of the earned points are gone
    assert_eq!(balance(&app, customer_id).await, 4_500);

    let (status, done) = app
        .send_json(as_admin(json_request(
            "POST",
            &format!("/admin/returns/{return_id}/complete"),
            &json!({}),
        )))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");
    assert!(done["resolved_at"].is_string());

    // the ledger records every change, newest first
    let (status, ledger) = app
        .send_json(as_customer(get("/store/me/points"), customer_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    let kinds: Vec<&str> = ledger
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, ["revoke", "redeem", "revoke", "earn"]);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn test_customer_cannot_return_someone_elses_order() {
    let Some(app) = TestApp::database().await else {
        return;
    };

    let owner = create_customer(&app).await;
    let stranger = create_customer(&app).await;
    let reference = format!("pi_{}", Uuid::new_v4().simple());
    let order = create_order(&app, owner, 4_000, &reference).await;

    let (status, _) = app
        .send_json(as_customer(
            json_request(
                "POST",
                "/store/returns",
                &json!({
                    "order_id": order["id"],
                    "reason": "Not mine",
                    "items": [{ "variant_id": 1, "quantity": 1 }]
                }),
            ),
            stranger,
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // unpaid orders cannot be returned by their owner either
    let (status, _) = app
        .send_json(as_customer(
            json_request(
                "POST",
                "/store/returns",
                &json!({
                    "order_id": order["id"],
                    "reason": "Changed my mind",
                    "items": [{ "variant_id": 1, "quantity": 1 }]
                }),
            ),
            owner,
        ))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
