//! Customer membership and the points ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sagebrush_core::loyalty::CustomerActivity;
use sagebrush_core::{Cents, CustomerId, OrderId, PointsKind, PointsTransactionId, TierId};

use super::{ValidationError, required_text};

/// Tier fields shown alongside a membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSummary {
    pub id: TierId,
    pub name: String,
    pub rank: i32,
    pub points_multiplier: Decimal,
    pub discount_percent: Decimal,
}

/// A customer's current tier and points balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub customer_id: CustomerId,
    pub tier: Option<TierSummary>,
    pub points_balance: i64,
    pub evaluated_at: Option<DateTime<Utc>>,
}

/// One row of the append-only points ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsTransaction {
    pub id: PointsTransactionId,
    pub customer_id: CustomerId,
    pub kind: PointsKind,
    /// Signed change applied to the balance.
    pub amount: i64,
    pub balance_after: i64,
    pub order_id: Option<OrderId>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of re-evaluating a customer's tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipEvaluation {
    pub customer_id: CustomerId,
    pub activity: CustomerActivity,
    pub previous_tier_id: Option<TierId>,
    pub tier_id: Option<TierId>,
}

impl MembershipEvaluation {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous_tier_id != self.tier_id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedeemInput {
    pub points: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemResult {
    pub points_redeemed: i64,
    pub discount_cents: Cents,
    pub points_balance: i64,
}

/// Body of `POST /admin/customers/{id}/points/adjust`.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustPointsInput {
    /// Signed; negative removes points.
    pub amount: i64,
    pub note: String,
}

impl AdjustPointsInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for a zero amount or a blank note.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.amount == 0 {
            return Err(ValidationError::new("amount must not be zero"));
        }
        Ok(Self {
            note: required_text("note", &self.note, 500)?,
            ..self
        })
    }
}
