//! Products and their stock-keeping variants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::{ProductId, VariantId};

use super::{ValidationError, required_text};

/// A product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub handle: String,
    pub created_at: DateTime<Utc>,
}

/// A purchasable variant with its on-hand quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: VariantId,
    pub product_id: ProductId,
    pub sku: String,
    pub title: String,
    pub inventory_quantity: i32,
    /// Falls back to the configured default when `None`.
    pub low_stock_threshold: Option<i32>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProductInput {
    pub title: String,
    pub handle: String,
}

impl CreateProductInput {
    /// Trim the title and check the handle is a lowercase slug.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank title or a malformed handle.
    pub fn validate(self) -> Result<Self, ValidationError> {
        let title = required_text("title", &self.title, 255)?;
        let handle = required_text("handle", &self.handle, 255)?;
        let is_slug = handle
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
            && !handle.starts_with('-')
            && !handle.ends_with('-');
        if !is_slug {
            return Err(ValidationError::new(
                "handle may only contain lowercase letters, digits and inner hyphens",
            ));
        }
        Ok(Self { title, handle })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVariantInput {
    pub sku: String,
    pub title: String,
    #[serde(default)]
    pub inventory_quantity: i32,
    pub low_stock_threshold: Option<i32>,
}

impl CreateVariantInput {
    /// # Errors
    ///
    /// Returns `ValidationError` for a blank SKU/title or a negative threshold.
    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.low_stock_threshold.is_some_and(|t| t < 0) {
            return Err(ValidationError::new("low_stock_threshold must not be negative"));
        }
        Ok(Self {
            sku: required_text("sku", &self.sku, 64)?,
            title: required_text("title", &self.title, 255)?,
            ..self
        })
    }
}

/// How a variant's stock changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InventoryChange {
    /// Replace the on-hand quantity.
    Set(i32),
    /// Add a signed delta to the on-hand quantity.
    Adjust(i32),
}

/// Body of `PATCH /admin/variants/{id}/inventory`.
///
/// Exactly one of `set` and `adjust` must be given.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateInventoryInput {
    pub set: Option<i32>,
    pub adjust: Option<i32>,
}

impl UpdateInventoryInput {
    /// # Errors
    ///
    /// Returns `ValidationError` unless exactly one of the fields is present.
    pub fn change(&self) -> Result<InventoryChange, ValidationError> {
        match (self.set, self.adjust) {
            (Some(quantity), None) => Ok(InventoryChange::Set(quantity)),
            (None, Some(delta)) => Ok(InventoryChange::Adjust(delta)),
            _ => Err(ValidationError::new("provide exactly one of 'set' or 'adjust'")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_product_handle_rules() {
        let ok = CreateProductInput {
            title: " Trail Shoe ".to_string(),
            handle: "trail-shoe-2".to_string(),
        };
        assert_eq!(ok.validate().unwrap().title, "Trail Shoe");

        for bad in ["Trail", "trail shoe", "-trail", "trail_shoe"] {
            let input = CreateProductInput {
                title: "Trail".to_string(),
                handle: bad.to_string(),
            };
            assert!(input.validate().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_inventory_change() {
        let set = UpdateInventoryInput {
            set: Some(4),
            adjust: None,
        };
        assert_eq!(set.change().unwrap(), InventoryChange::Set(4));

        let both = UpdateInventoryInput {
            set: Some(4),
            adjust: Some(-1),
        };
        assert!(both.change().is_err());
        assert!(UpdateInventoryInput::default().change().is_err());
    }
}
