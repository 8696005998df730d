//! Orders and their payment/fulfillment extension.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::{
    Cents, CurrencyCode, CustomerId, Email, FulfillmentStatus, OrderExtensionId, OrderId,
    PaymentStatus,
};

use super::{ValidationError, http_url, optional_text};

/// An order as recorded by checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    /// `None` for guest checkouts.
    pub customer_id: Option<CustomerId>,
    pub email: Email,
    pub total_cents: Cents,
    pub currency_code: CurrencyCode,
    pub created_at: DateTime<Utc>,
}

/// Payment and shipping state kept alongside an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderExtension {
    pub id: OrderExtensionId,
    pub order_id: OrderId,
    pub payment_status: PaymentStatus,
    pub fulfillment_status: FulfillmentStatus,
    pub payment_reference: Option<String>,
    pub refunded_cents: Cents,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl OrderExtension {
    /// Amount still refundable.
    #[must_use]
    pub fn refundable(&self, order_total: Cents) -> Cents {
        order_total.saturating_sub(self.refunded_cents)
    }
}

/// An order joined with its extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub extension: OrderExtension,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub customer_id: Option<CustomerId>,
    pub email: Email,
    pub total_cents: Cents,
    #[serde(default)]
    pub currency_code: CurrencyCode,
    pub payment_reference: Option<String>,
}

impl CreateOrderInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for a negative total or an oversized reference.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.total_cents.is_negative() {
            return Err(ValidationError::new("total_cents must not be negative"));
        }
        Ok(Self {
            payment_reference: optional_text(
                "payment_reference",
                self.payment_reference.as_deref(),
                255,
            )?,
            ..self
        })
    }
}

/// Query filters for the admin order list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub payment_status: Option<PaymentStatus>,
    pub fulfillment_status: Option<FulfillmentStatus>,
    pub customer_id: Option<CustomerId>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Courier details for a shipment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UpdateTrackingInput {
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
}

impl UpdateTrackingInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for oversized fields or a non-http tracking URL.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let tracking_url = match optional_text("tracking_url", self.tracking_url.as_deref(), 2048)? {
            Some(url) => Some(http_url("tracking_url", &url)?),
            None => None,
        };
        Ok(Self {
            courier: optional_text("courier", self.courier.as_deref(), 100)?,
            tracking_number: optional_text("tracking_number", self.tracking_number.as_deref(), 100)?,
            tracking_url,
        })
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.courier.is_none() && self.tracking_number.is_none() && self.tracking_url.is_none()
    }
}

/// Body of `PATCH /admin/orders/{id}/fulfillment`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFulfillmentInput {
    pub status: FulfillmentStatus,
    #[serde(flatten)]
    pub tracking: UpdateTrackingInput,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_create_order_rejects_negative_total() {
        let input: CreateOrderInput = serde_json::from_value(serde_json::json!({
            "email": "buyer@example.com",
            "total_cents": -1
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_create_order_defaults_currency() {
        let input: CreateOrderInput = serde_json::from_value(serde_json::json!({
            "customer_id": 7,
            "email": "buyer@example.com",
            "total_cents": 10_000,
            "payment_reference": "  "
        }))
        .unwrap();
        let input = input.validate().unwrap();
        assert_eq!(input.currency_code, CurrencyCode::Usd);
        assert_eq!(input.payment_reference, None);
    }

    #[test]
    fn test_fulfillment_body_flattens_tracking() {
        let input: UpdateFulfillmentInput = serde_json::from_value(serde_json::json!({
            "status": "shipped",
            "courier": "UPS",
            "tracking_number": "1Z999"
        }))
        .unwrap();
        assert_eq!(input.status, FulfillmentStatus::Shipped);
        assert_eq!(input.tracking.courier.as_deref(), Some("UPS"));
    }

    #[test]
    fn test_tracking_url_must_be_http() {
        let input = UpdateTrackingInput {
            tracking_url: Some("file:///etc/passwd".to_string()),
            ..UpdateTrackingInput::default()
        };
        assert!(input.validate().is_err());
    }
}
