//! Shipping settings and rate quotes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::{Cents, CurrencyCode};

use super::{ValidationError, optional_text, required_text};

/// Store-wide shipping settings (a single row).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSettings {
    /// Orders at or above this subtotal ship free; `None` disables free shipping.
    pub free_shipping_threshold_cents: Option<Cents>,
    pub flat_rate_cents: Cents,
    pub currency_code: CurrencyCode,
    pub origin_postal_code: Option<String>,
    pub origin_country_code: Option<String>,
    pub use_live_rates: bool,
    pub updated_at: DateTime<Utc>,
}

impl ShippingSettings {
    /// Settings used before an admin saves any.
    #[must_use]
    pub fn unset() -> Self {
        Self {
            free_shipping_threshold_cents: None,
            flat_rate_cents: Cents::ZERO,
            currency_code: CurrencyCode::default(),
            origin_postal_code: None,
            origin_country_code: None,
            use_live_rates: false,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Whether `subtotal` qualifies for free shipping.
    #[must_use]
    pub fn ships_free(&self, subtotal: Cents) -> bool {
        self.free_shipping_threshold_cents
            .is_some_and(|threshold| subtotal >= threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingSettingsInput {
    pub free_shipping_threshold_cents: Option<Cents>,
    pub flat_rate_cents: Cents,
    #[serde(default)]
    pub currency_code: CurrencyCode,
    pub origin_postal_code: Option<String>,
    pub origin_country_code: Option<String>,
    #[serde(default)]
    pub use_live_rates: bool,
}

impl ShippingSettingsInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for negative amounts or a malformed country code.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.flat_rate_cents.is_negative() {
            return Err(ValidationError::new("flat_rate_cents must not be negative"));
        }
        if self
            .free_shipping_threshold_cents
            .is_some_and(Cents::is_negative)
        {
            return Err(ValidationError::new(
                "free_shipping_threshold_cents must not be negative",
            ));
        }
        let origin_country_code =
            optional_text("origin_country_code", self.origin_country_code.as_deref(), 2)?
                .map(|c| normalize_country(&c))
                .transpose()?;
        Ok(Self {
            origin_postal_code: optional_text(
                "origin_postal_code",
                self.origin_postal_code.as_deref(),
                20,
            )?,
            origin_country_code,
            ..self
        })
    }
}

fn normalize_country(code: &str) -> Result<String, ValidationError> {
    if code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(ValidationError::new("country code must be two letters"))
    }
}

/// Where a parcel is going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub country_code: String,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

/// Body of `POST /store/shipping/rates`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateRequest {
    pub subtotal_cents: Cents,
    pub destination: Destination,
    #[serde(default)]
    pub weight_grams: i32,
}

impl RateRequest {
    /// # Errors
    ///
    /// Returns `ValidationError` for negative amounts or a malformed destination.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.subtotal_cents.is_negative() {
            return Err(ValidationError::new("subtotal_cents must not be negative"));
        }
        if self.weight_grams < 0 {
            return Err(ValidationError::new("weight_grams must not be negative"));
        }
        let country = required_text("destination.country_code", &self.destination.country_code, 2)?;
        let destination = Destination {
            country_code: normalize_country(&country)?,
            postal_code: optional_text(
                "destination.postal_code",
                self.destination.postal_code.as_deref(),
                20,
            )?,
            region: optional_text("destination.region", self.destination.region.as_deref(), 100)?,
            city: optional_text("destination.city", self.destination.city.as_deref(), 100)?,
        };
        Ok(Self {
            destination,
            ..self
        })
    }
}

/// How a quote was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSource {
    FreeThreshold,
    FlatRate,
    Live,
}

/// One shipping option offered to the customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub service: String,
    pub amount_cents: Cents,
    pub currency_code: CurrencyCode,
    pub estimated_days: Option<u32>,
    pub source: QuoteSource,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ships_free_at_threshold() {
        let mut settings = ShippingSettings::unset();
        assert!(!settings.ships_free(Cents::new(1_000_000)));

        settings.free_shipping_threshold_cents = Some(Cents::new(5_000));
        assert!(settings.ships_free(Cents::new(5_000)));
        assert!(!settings.ships_free(Cents::new(4_999)));
    }

    #[test]
    fn test_rate_request_normalizes_country() {
        let request: RateRequest = serde_json::from_value(serde_json::json!({
            "subtotal_cents": 2500,
            "destination": {"country_code": "us", "postal_code": " 97201 "},
            "weight_grams": 800
        }))
        .unwrap();
        let request = request.validate().unwrap();
        assert_eq!(request.destination.country_code, "US");
        assert_eq!(request.destination.postal_code.as_deref(), Some("97201"));
    }

    #[test]
    fn test_rate_request_rejects_bad_input() {
        let request: RateRequest = serde_json::from_value(serde_json::json!({
            "subtotal_cents": -5,
            "destination": {"country_code": "US"}
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let request: RateRequest = serde_json::from_value(serde_json::json!({
            "subtotal_cents": 5,
            "destination": {"country_code": "USA"}
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
