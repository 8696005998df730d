//! Payment provider webhooks.
//!
//! Deliveries are signed with `payment-signature: t=<unix>,v1=<hex>` where
//! the signature is HMAC-SHA256 over `"{t}.{raw body}"`. Deliveries older
//! than five minutes are refused to limit replay.
//!
//! # Handled events
//!
//! - `payment_intent.succeeded` - mark the order paid, credit points, re-evaluate the tier
//! - `charge.refunded` - record the provider's refunded total and revoke points
//! - `payment_intent.payment_failed` - logged only
//!
//! Any other event type is acknowledged and ignored.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::Sha256;
use sqlx::PgPool;
use thiserror::Error;
use tracing::instrument;

use sagebrush_core::{Cents, OrderId, PaymentStatus};

use super::loyalty::revoke_for_refund_tx;
use super::{LoyaltyService, ServiceError};
use crate::config::LoyaltyConfig;
use crate::db::{OrderRepository, orders};
use crate::middleware::auth::constant_time_compare;
use crate::models::{OrderDetail, ValidationError};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

/// Accepted clock difference between the provider and us.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Why a delivery's signature was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing signature header")]
    Missing,
    #[error("malformed signature header")]
    Malformed,
    #[error("signature timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

fn compute_signature(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Build a signature header value for `body`, as the provider would.
///
/// # Errors
///
/// Returns `SignatureError::Malformed` if the secret cannot key the MAC.
pub fn sign(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    Ok(format!("t={timestamp},v1={}", compute_signature(secret, timestamp, body)?))
}

/// Check a delivery's signature header against the raw body.
///
/// Any of several `v1` entries may match, which allows secret rotation.
///
/// # Errors
///
/// Returns `SignatureError` describing the first problem found.
pub fn verify_signature(
    secret: &SecretString,
    header: Option<&str>,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let header = header.ok_or(SignatureError::Missing)?;

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| SignatureError::Malformed)?);
            }
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(SignatureError::Expired);
    }

    let expected = compute_signature(secret.expose_secret(), timestamp, body)?;
    if signatures
        .iter()
        .any(|candidate| constant_time_compare(candidate, &expected))
    {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

// =============================================================================
// Event payloads
// =============================================================================

/// A webhook delivery.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    last_payment_error: Option<PaymentErrorObject>,
}

#[derive(Debug, Deserialize)]
struct PaymentErrorObject {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChargeObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    amount_refunded: i64,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Event types this service acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PaymentSucceeded,
    ChargeRefunded,
    PaymentFailed,
    Ignored,
}

impl EventKind {
    #[must_use]
    pub fn of(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => Self::PaymentSucceeded,
            "charge.refunded" => Self::ChargeRefunded,
            "payment_intent.payment_failed" => Self::PaymentFailed,
            _ => Self::Ignored,
        }
    }
}

fn object<T: DeserializeOwned>(event: &PaymentEvent) -> Result<T, ServiceError> {
    serde_json::from_value(event.data.object.clone()).map_err(|e| {
        ServiceError::Validation(ValidationError(format!(
            "malformed {} payload: {e}",
            event.event_type
        )))
    })
}

fn metadata_order_id(metadata: &HashMap<String, String>) -> Option<OrderId> {
    metadata.get("order_id").and_then(|id| id.parse().ok())
}

// =============================================================================
// Dispatch
// =============================================================================

/// Applies webhook events to orders and loyalty.
pub struct WebhookProcessor<'a> {
    pool: &'a PgPool,
    loyalty: &'a LoyaltyConfig,
}

impl<'a> WebhookProcessor<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, loyalty: &'a LoyaltyConfig) -> Self {
        Self { pool, loyalty }
    }

    /// Apply one event.
    ///
    /// Events for orders we do not know are logged and acknowledged.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` for malformed payloads and database failures;
    /// the caller releases the idempotency claim so the delivery is retried.
    #[instrument(skip(self, event), fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn process(&self, event: &PaymentEvent) -> Result<(), ServiceError> {
        match EventKind::of(&event.event_type) {
            EventKind::PaymentSucceeded => self.payment_succeeded(object(event)?).await,
            EventKind::ChargeRefunded => self.charge_refunded(object(event)?).await,
            EventKind::PaymentFailed => {
                let intent: PaymentIntentObject = object(event)?;
                let reason = intent
                    .last_payment_error
                    .and_then(|e| e.message)
                    .unwrap_or_default();
                tracing::warn!(payment_intent = %intent.id, %reason, "Payment failed");
                Ok(())
            }
            EventKind::Ignored => {
                tracing::debug!("Ignoring webhook event type");
                Ok(())
            }
        }
    }

    async fn locate(
        &self,
        order_id: Option<OrderId>,
        reference: Option<&str>,
    ) -> Result<Option<OrderDetail>, ServiceError> {
        let repo = OrderRepository::new(self.pool);
        if let Some(id) = order_id
            && let Some(order) = repo.get(id).await?
        {
            return Ok(Some(order));
        }
        match reference {
            Some(reference) => Ok(repo.find_by_payment_reference(reference).await?),
            None => Ok(None),
        }
    }

    async fn payment_succeeded(&self, intent: PaymentIntentObject) -> Result<(), ServiceError> {
        let Some(order) = self
            .locate(metadata_order_id(&intent.metadata), Some(&intent.id))
            .await?
        else {
            tracing::warn!(payment_intent = %intent.id, "Payment for unknown order");
            return Ok(());
        };
        let order_id = order.order.id;

        if OrderRepository::new(self.pool)
            .mark_paid(order_id, &intent.id)
            .await?
        {
            tracing::info!(%order_id, payment_intent = %intent.id, "Order paid");
        }

        let loyalty = LoyaltyService::new(self.pool, self.loyalty);
        loyalty.award_order_points(order_id).await?;
        if let Some(customer_id) = order.order.customer_id {
            loyalty.evaluate_customer(customer_id).await?;
        }
        Ok(())
    }

    async fn charge_refunded(&self, charge: ChargeObject) -> Result<(), ServiceError> {
        let Some(located) = self
            .locate(metadata_order_id(&charge.metadata), charge.payment_intent.as_deref())
            .await?
        else {
            tracing::warn!(charge = %charge.id, "Refund for unknown order");
            return Ok(());
        };

        let mut tx = self.pool.begin().await?;
        let order = orders::fetch_detail(&mut *tx, located.order.id, true)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;

        let total = order.order.total_cents;
        let Some(refunded_total) =
            refunded_total_after(order.extension.refunded_cents, charge.amount_refunded, total)
        else {
            tracing::debug!(order_id = %order.order.id, "Refund already recorded");
            return Ok(());
        };

        orders::set_refunded(
            &mut *tx,
            order.order.id,
            refunded_total,
            PaymentStatus::after_refund(total, refunded_total),
        )
        .await?;
        revoke_for_refund_tx(&mut *tx, &order, refunded_total).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.order.id,
            refunded = refunded_total.get(),
            "Refund recorded from provider"
        );

        if let Some(customer_id) = order.order.customer_id {
            LoyaltyService::new(self.pool, self.loyalty)
                .evaluate_customer(customer_id)
                .await?;
        }
        Ok(())
    }
}

/// The provider reports the cumulative refunded amount. Returns the new
/// total to store, or `None` when nothing beyond what we know was refunded.
fn refunded_total_after(recorded: Cents, reported: i64, order_total: Cents) -> Option<Cents> {
    let reported = Cents::new(reported).min(order_total);
    (reported > recorded).then_some(reported)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_5f1c9a0e7d3b";

    fn secret() -> SecretString {
        SecretString::from(SECRET)
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign(SECRET, 1_700_000_000, body).unwrap();
        assert!(verify_signature(&secret(), Some(&header), body, 1_700_000_100).is_ok());
    }

    #[test]
    fn test_tampered_body_rejected() {
        let header = sign(SECRET, 1_700_000_000, b"original").unwrap();
        assert_eq!(
            verify_signature(&secret(), Some(&header), b"tampered", 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_old_signature_rejected() {
        let body = b"{}";
        let header = sign(SECRET, 1_700_000_000, body).unwrap();
        assert_eq!(
            verify_signature(&secret(), Some(&header), body, 1_700_000_301),
            Err(SignatureError::Expired)
        );
        assert!(verify_signature(&secret(), Some(&header), body, 1_700_000_300).is_ok());
    }

    #[test]
    fn test_malformed_headers() {
        assert_eq!(
            verify_signature(&secret(), None, b"{}", 0),
            Err(SignatureError::Missing)
        );
        for header in ["", "v1=abc", "t=abc,v1=abc", "t=100"] {
            assert_eq!(
                verify_signature(&secret(), Some(header), b"{}", 100),
                Err(SignatureError::Malformed),
                "{header}"
            );
        }
    }

    #[test]
    fn test_extreme_timestamps_expire() {
        let now = 1_700_000_000;
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={t},v1=00");
            assert_eq!(
                verify_signature(&secret(), Some(&header), b"{}", now),
                Err(SignatureError::Expired),
                "{t}"
            );
        }
    }

    #[test]
    fn test_any_v1_may_match() {
        let body = b"{}";
        let good = sign(SECRET, 500, body).unwrap();
        let v1 = good.split_once("v1=").unwrap().1;
        let header = format!("t=500,v1=deadbeef,v1={v1}");
        assert!(verify_signature(&secret(), Some(&header), body, 500).is_ok());
    }

    #[test]
    fn test_event_parsing() {
        let event: PaymentEvent = serde_json::from_str(
            r#"{
                "id": "evt_123",
                "type": "charge.refunded",
                "data": {"object": {"id": "ch_1", "payment_intent": "pi_1", "amount_refunded": 2500}}
            }"#,
        )
        .unwrap();
        assert_eq!(EventKind::of(&event.event_type), EventKind::ChargeRefunded);

        let charge: ChargeObject = object(&event).unwrap();
        assert_eq!(charge.payment_intent.as_deref(), Some("pi_1"));
        assert_eq!(charge.amount_refunded, 2_500);
    }

    #[test]
    fn test_malformed_object_is_validation_error() {
        let event = PaymentEvent {
            id: "evt_1".to_string(),
            event_type: "charge.refunded".to_string(),
            data: EventData {
                object: serde_json::json!({"id": "ch_1"}),
            },
        };
        assert!(matches!(
            object::<ChargeObject>(&event),
            Err(ServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_event_kinds() {
        assert_eq!(EventKind::of("payment_intent.succeeded"), EventKind::PaymentSucceeded);
        assert_eq!(EventKind::of("payment_intent.payment_failed"), EventKind::PaymentFailed);
        assert_eq!(EventKind::of("customer.created"), EventKind::Ignored);
    }

    #[test]
    fn test_refunded_total_only_grows() {
        let total = Cents::new(10_000);
        assert_eq!(
            refunded_total_after(Cents::ZERO, 2_500, total),
            Some(Cents::new(2_500))
        );
        assert_eq!(refunded_total_after(Cents::new(2_500), 2_500, total), None);
        assert_eq!(refunded_total_after(Cents::new(5_000), 2_500, total), None);
        assert_eq!(
            refunded_total_after(Cents::new(5_000), 99_999, total),
            Some(total)
        );
    }

    #[test]
    fn test_metadata_order_id() {
        let mut metadata = HashMap::new();
        assert_eq!(metadata_order_id(&metadata), None);
        metadata.insert("order_id".to_string(), "42".to_string());
        assert_eq!(metadata_order_id(&metadata), Some(OrderId::new(42)));
        metadata.insert("order_id".to_string(), "x".to_string());
        assert_eq!(metadata_order_id(&metadata), None);
    }
}
