//! Return requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::{Cents, CustomerId, OrderId, ReturnId, ReturnStatus, VariantId};

use super::{ValidationError, optional_text, required_text};

/// Most distinct lines a single return may list.
pub const MAX_RETURN_ITEMS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItem {
    pub variant_id: VariantId,
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRequest {
    pub id: ReturnId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub status: ReturnStatus,
    pub reason: String,
    pub items: Vec<ReturnItem>,
    pub refund_cents: Cents,
    pub admin_note: Option<String>,
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Body of `POST /store/returns`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReturnInput {
    pub order_id: OrderId,
    pub reason: String,
    pub items: Vec<ReturnItem>,
}

impl CreateReturnInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank reason, no items, too many
    /// items, a non-positive quantity, or the same variant listed twice.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.items.is_empty() {
            return Err(ValidationError::new("at least one item is required"));
        }
        if self.items.len() > MAX_RETURN_ITEMS {
            return Err(ValidationError(format!(
                "a return may list at most {MAX_RETURN_ITEMS} items"
            )));
        }
        if self.items.iter().any(|item| item.quantity <= 0) {
            return Err(ValidationError::new("item quantities must be positive"));
        }
        let mut seen: Vec<VariantId> = self.items.iter().map(|i| i.variant_id).collect();
        seen.sort_unstable();
        if seen.windows(2).any(|w| w.first() == w.get(1)) {
            return Err(ValidationError::new("each variant may appear only once"));
        }
        Ok(Self {
            reason: required_text("reason", &self.reason, 1000)?,
            ..self
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnFilter {
    pub status: Option<ReturnStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Optional admin note attached to approve/reject/complete.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnDecisionInput {
    pub note: Option<String>,
}

impl ReturnDecisionInput {
    /// # Errors
    ///
    /// Returns `ValidationError` when the note is too long.
    pub fn note(&self) -> Result<Option<String>, ValidationError> {
        optional_text("note", self.note.as_deref(), 1000)
    }
}

/// Courier details once the customer has shipped the items back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReturnShipmentInput {
    pub courier: Option<String>,
    pub tracking_number: Option<String>,
}

impl ReturnShipmentInput {
    /// # Errors
    ///
    /// Returns `ValidationError` when a field is too long.
    pub fn validate(self) -> Result<Self, ValidationError> {
        Ok(Self {
            courier: optional_text("courier", self.courier.as_deref(), 100)?,
            tracking_number: optional_text("tracking_number", self.tracking_number.as_deref(), 100)?,
        })
    }
}

/// Body of `POST /admin/returns/{id}/refund`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefundInput {
    pub amount_cents: Cents,
    pub note: Option<String>,
}
