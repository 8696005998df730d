//! Domain models for the commerce API.
//!
//! Each module pairs the stored record with the input types accepted by the
//! HTTP layer. Inputs validate themselves before any query runs.

pub mod banner;
pub mod catalog;
pub mod customer;
pub mod low_stock;
pub mod membership;
pub mod order;
pub mod returns;
pub mod review;
pub mod shipping;
pub mod tier;

use thiserror::Error;
use url::Url;

pub use banner::{Banner, BannerInput};
pub use catalog::{
    CreateProductInput, CreateVariantInput, InventoryChange, Product, ProductVariant,
    UpdateInventoryInput,
};
pub use customer::{CreateCustomerInput, Customer};
pub use low_stock::{LowStockAlert, LowStockReport};
pub use membership::{
    AdjustPointsInput, Membership, MembershipEvaluation, PointsTransaction, RedeemInput,
    RedeemResult, TierSummary,
};
pub use order::{
    CreateOrderInput, Order, OrderDetail, OrderExtension, OrderFilter, UpdateFulfillmentInput,
    UpdateTrackingInput,
};
pub use returns::{
    CreateReturnInput, RefundInput, ReturnDecisionInput, ReturnFilter, ReturnItem, ReturnRequest,
    ReturnShipmentInput,
};
pub use review::{NewReview, Review, ReviewAuthor, ReviewFilter, ReviewSummary, SubmitReviewInput};
pub use shipping::{
    Destination, QuoteSource, RateRequest, ShippingQuote, ShippingSettings, ShippingSettingsInput,
};
pub use tier::{Tier, TierInput};

/// Input rejected before reaching the database.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Trim `value` and require it to be non-empty and at most `max` characters.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError(format!("{field} is required")));
    }
    optional_text(field, Some(trimmed), max).map(|v| v.unwrap_or_default())
}

/// Trim an optional `value`; blank becomes `None`.
pub(crate) fn optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(trimmed) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > max {
        return Err(ValidationError(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(Some(trimmed.to_string()))
}

/// Require an absolute `http` or `https` URL.
pub(crate) fn http_url(field: &str, value: &str) -> Result<String, ValidationError> {
    let parsed = Url::parse(value.trim())
        .map_err(|_| ValidationError(format!("{field} must be a valid URL")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ValidationError(format!("{field} must use http or https")));
    }
    Ok(parsed.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_required_text() {
        assert_eq!(required_text("name", "  Gold ", 10).unwrap(), "Gold");
        assert!(required_text("name", "   ", 10).is_err());
        assert!(required_text("name", "abcdefghijk", 10).is_err());
    }

    #[test]
    fn test_optional_text_blank_is_none() {
        assert_eq!(optional_text("note", Some("  "), 10).unwrap(), None);
        assert_eq!(optional_text("note", None, 10).unwrap(), None);
    }

    #[test]
    fn test_http_url() {
        assert!(http_url("image", "https://cdn.example.com/a.png").is_ok());
        assert!(http_url("image", "ftp://cdn.example.com/a.png").is_err());
        assert!(http_url("image", "javascript:alert(1)").is_err());
        assert!(http_url("image", "not a url").is_err());
    }
}
