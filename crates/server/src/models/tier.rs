//! Membership tiers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use sagebrush_core::loyalty::TierRule;
use sagebrush_core::{Cents, TierId};

use super::{ValidationError, optional_text, required_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub name: String,
    pub rank: i32,
    pub order_threshold: i64,
    pub spend_threshold_cents: Cents,
    pub points_multiplier: Decimal,
    pub discount_percent: Decimal,
    pub is_default: bool,
    pub is_active: bool,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tier {
    /// The fields that decide qualification.
    #[must_use]
    pub fn rule(&self) -> TierRule {
        TierRule {
            id: self.id,
            rank: self.rank,
            order_threshold: self.order_threshold,
            spend_threshold: self.spend_threshold_cents,
            points_multiplier: self.points_multiplier,
            is_default: self.is_default,
            is_active: self.is_active,
        }
    }
}

/// Body for creating or replacing a tier; also the YAML seed format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierInput {
    pub name: String,
    pub rank: i32,
    #[serde(default)]
    pub order_threshold: i64,
    #[serde(default)]
    pub spend_threshold_cents: Cents,
    #[serde(default = "default_multiplier")]
    pub points_multiplier: Decimal,
    #[serde(default)]
    pub discount_percent: Decimal,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_active")]
    pub is_active: bool,
    pub description: Option<String>,
}

/// `points_multiplier NUMERIC(8, 4)`
const MULTIPLIER_SCALE: u32 = 4;
const MULTIPLIER_LIMIT: i64 = 10_000;
/// `discount_percent NUMERIC(5, 2)`
const DISCOUNT_SCALE: u32 = 2;

const fn default_multiplier() -> Decimal {
    Decimal::ONE
}

const fn default_active() -> bool {
    true
}

impl TierInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank name, negative thresholds or
    /// multiplier, or a discount outside `0..=100`. The multiplier is stored
    /// with four decimal places below 10000 and the discount with two, so
    /// anything finer is rejected rather than rounded.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.order_threshold < 0 {
            return Err(ValidationError::new("order_threshold must not be negative"));
        }
        if self.spend_threshold_cents.is_negative() {
            return Err(ValidationError::new("spend_threshold_cents must not be negative"));
        }
        if self.points_multiplier.is_sign_negative() {
            return Err(ValidationError::new("points_multiplier must not be negative"));
        }
        if self.points_multiplier.scale() > MULTIPLIER_SCALE
            || self.points_multiplier >= Decimal::new(MULTIPLIER_LIMIT, 0)
        {
            return Err(ValidationError::new(
                "points_multiplier must be below 10000 with at most 4 decimal places",
            ));
        }
        if self.discount_percent.is_sign_negative() || self.discount_percent > Decimal::ONE_HUNDRED {
            return Err(ValidationError::new("discount_percent must be between 0 and 100"));
        }
        if self.discount_percent.scale() > DISCOUNT_SCALE {
            return Err(ValidationError::new(
                "discount_percent must have at most 2 decimal places",
            ));
        }
        Ok(Self {
            name: required_text("name", &self.name, 100)?,
            description: optional_text("description", self.description.as_deref(), 1000)?,
            ..self
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_yaml_shape() {
        let input: TierInput = serde_json::from_value(serde_json::json!({
            "name": "Bronze",
            "rank": 0,
            "is_default": true
        }))
        .unwrap();
        assert_eq!(input.points_multiplier, Decimal::ONE);
        assert!(input.is_active);
        assert_eq!(input.spend_threshold_cents, Cents::ZERO);
    }

    #[test]
    fn test_discount_bounds() {
        let mut input: TierInput = serde_json::from_value(serde_json::json!({
            "name": "Gold",
            "rank": 20,
            "discount_percent": "100"
        }))
        .unwrap();
        assert!(input.clone().validate().is_ok());

        input.discount_percent = Decimal::new(10_001, 2);
        assert!(input.clone().validate().is_err());

        input.discount_percent = Decimal::new(-1, 0);
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_negative_thresholds_rejected() {
        let input: TierInput = serde_json::from_value(serde_json::json!({
            "name": "Silver",
            "rank": 10,
            "order_threshold": -1
        }))
        .unwrap();
        assert!(input.validate().is_err());
    }

    #[test]
    fn test_precision_limited_to_storage() {
        let gold = || -> TierInput {
            serde_json::from_value(serde_json::json!({
                "name": "Gold",
                "rank": 20,
                "points_multiplier": "1.2345",
                "discount_percent": "12.50"
            }))
            .unwrap()
        };
        assert!(gold().validate().is_ok());

        let mut input = gold();
        input.points_multiplier = "1.23456".parse().unwrap();
        assert!(input.validate().is_err());

        let mut input = gold();
        input.points_multiplier = Decimal::new(10_000, 0);
        assert!(input.validate().is_err());

        let mut input = gold();
        input.points_multiplier = "9999.9999".parse().unwrap();
        assert!(input.validate().is_ok());

        let mut input = gold();
        input.discount_percent = "12.345".parse().unwrap();
        assert!(input.validate().is_err());
    }
}
