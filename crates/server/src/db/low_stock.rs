//! Low-stock snapshot.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use sagebrush_core::VariantId;

use super::RepositoryError;
use crate::models::{LowStockAlert, LowStockReport};

#[derive(Debug, sqlx::FromRow)]
struct AlertRow {
    variant_id: i32,
    sku: String,
    title: String,
    inventory_quantity: i32,
    threshold: i32,
    detected_at: DateTime<Utc>,
}

impl From<AlertRow> for LowStockAlert {
    fn from(row: AlertRow) -> Self {
        Self {
            variant_id: VariantId::new(row.variant_id),
            sku: row.sku,
            title: row.title,
            inventory_quantity: row.inventory_quantity,
            threshold: row.threshold,
            detected_at: row.detected_at,
        }
    }
}

/// Repository for `commerce.low_stock_alert`.
pub struct LowStockRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LowStockRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Recompute the snapshot: every variant at or below its threshold
    /// replaces the previous contents in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn refresh(
        &self,
        default_threshold: i32,
        detected_at: DateTime<Utc>,
    ) -> Result<Vec<LowStockAlert>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM commerce.low_stock_alert")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query_as::<_, AlertRow>(
            r"
            INSERT INTO commerce.low_stock_alert
                (variant_id, sku, title, inventory_quantity, threshold, detected_at)
            SELECT v.id, v.sku, p.title || ' / ' || v.title, v.inventory_quantity,
                   COALESCE(v.low_stock_threshold, $1), $2
            FROM commerce.product_variant v
            JOIN commerce.product p ON p.id = v.product_id
            WHERE v.inventory_quantity <= COALESCE(v.low_stock_threshold, $1)
            RETURNING variant_id, sku, title, inventory_quantity, threshold, detected_at
            ",
        )
        .bind(default_threshold)
        .bind(detected_at)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        let mut alerts: Vec<LowStockAlert> = rows.into_iter().map(Into::into).collect();
        alerts.sort_by_key(|a| (a.inventory_quantity, a.variant_id));
        Ok(alerts)
    }

    /// The stored snapshot, emptiest stock first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn report(&self) -> Result<LowStockReport, RepositoryError> {
        let rows = sqlx::query_as::<_, AlertRow>(
            r"
            SELECT variant_id, sku, title, inventory_quantity, threshold, detected_at
            FROM commerce.low_stock_alert
            ORDER BY inventory_quantity, variant_id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        let alerts: Vec<LowStockAlert> = rows.into_iter().map(Into::into).collect();
        Ok(LowStockReport {
            detected_at: alerts.iter().map(|a| a.detected_at).max(),
            alerts,
        })
    }
}
