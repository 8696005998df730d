//! Database operations for the commerce `PostgreSQL` schema.
//!
//! # Tables (schema `commerce`)
//!
//! - `customer`, `product`, `product_variant`, `order` - Catalog and order records
//! - `order_extension` - Payment/fulfillment state, one row per order
//! - `review` - Product reviews (customer or guest)
//! - `banner`, `tier`, `shipping_settings` - Admin-managed storefront settings
//! - `customer_membership`, `points_transaction` - Tier assignment and points ledger
//! - `return_request` - Return workflow
//! - `processed_webhook_event` - Webhook idempotency markers
//! - `low_stock_alert` - Latest low-stock snapshot
//!
//! # Migrations
//!
//! Migrations are stored in `crates/server/migrations/` and run via:
//! ```bash
//! cargo run -p sagebrush-cli -- migrate
//! ```

pub mod banners;
pub mod catalog;
pub mod customers;
pub mod loyalty;
pub mod low_stock;
pub mod orders;
pub mod returns;
pub mod reviews;
pub mod shipping_settings;
pub mod tiers;
pub mod webhook_events;

use std::time::Duration;

use secrecy::ExposeSecret;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use banners::BannerRepository;
pub use catalog::CatalogRepository;
pub use customers::CustomerRepository;
pub use loyalty::LoyaltyRepository;
pub use low_stock::LowStockRepository;
pub use orders::OrderRepository;
pub use returns::ReturnRepository;
pub use reviews::ReviewRepository;
pub use shipping_settings::ShippingSettingsRepository;
pub use tiers::TierRepository;
pub use webhook_events::WebhookEventRepository;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique handle).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Turn unique and check violations into `Conflict`, keeping other errors.
    pub(crate) fn from_constraint(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // 23505 unique_violation, 23514 check_violation, 23503 foreign_key_violation
            match db_err.code().as_deref() {
                Some("23505") => return Self::Conflict(format!("{what} already exists")),
                Some("23514") => return Self::Conflict(format!("{what} violates a constraint")),
                Some("23503") => return Self::Conflict(format!("{what} references a missing row")),
                _ => {}
            }
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Limit/offset pagination from a query string.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    const DEFAULT_LIMIT: i64 = 50;
    const MAX_LIMIT: i64 = 200;

    /// Row limit, clamped to `1..=200`.
    #[must_use]
    pub fn limit(self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }

    /// Row offset, never negative.
    #[must_use]
    pub fn offset(self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        let page = Page {
            limit: Some(10_000),
            offset: Some(-3),
        };
        assert_eq!(page.limit(), 200);
        assert_eq!(page.offset(), 0);

        let page = Page::default();
        assert_eq!(page.limit(), 50);

        let page = Page {
            limit: Some(0),
            offset: Some(20),
        };
        assert_eq!(page.limit(), 1);
        assert_eq!(page.offset(), 20);
    }
}
