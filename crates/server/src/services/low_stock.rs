//! Periodic low-stock scan.
//!
//! Every interval the monitor recomputes which variants are at or below
//! their threshold and replaces the stored snapshot. Admins read the
//! snapshot; nothing is pushed anywhere.

use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::db::{LowStockRepository, RepositoryError};
use crate::models::LowStockAlert;

/// Runs the low-stock scan.
#[derive(Debug, Clone)]
pub struct LowStockMonitor {
    pool: PgPool,
    default_threshold: i32,
}

impl LowStockMonitor {
    #[must_use]
    pub const fn new(pool: PgPool, default_threshold: i32) -> Self {
        Self {
            pool,
            default_threshold,
        }
    }

    /// Rebuild the snapshot now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the scan transaction fails; the previous
    /// snapshot is kept in that case.
    #[instrument(skip(self), fields(default_threshold = self.default_threshold))]
    pub async fn scan(&self) -> Result<Vec<LowStockAlert>, RepositoryError> {
        let alerts = LowStockRepository::new(&self.pool)
            .refresh(self.default_threshold, Utc::now())
            .await?;

        if alerts.is_empty() {
            tracing::info!("Low-stock scan finished, all variants above threshold");
        } else {
            let out_of_stock = alerts.iter().filter(|a| a.inventory_quantity <= 0).count();
            tracing::warn!(
                low = alerts.len(),
                out_of_stock,
                "Low-stock scan found variants at or below threshold"
            );
        }
        Ok(alerts)
    }

    /// Scan once at start-up and then every `every`.
    ///
    /// A failed scan is logged and retried on the next tick.
    pub fn spawn(self, every: Duration) -> JoinHandle<()> {
        tracing::info!(interval_secs = every.as_secs(), "Starting low-stock monitor");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                // first tick completes immediately
                ticker.tick().await;
                if let Err(e) = self.scan().await {
                    tracing::error!(error = %e, "Low-stock scan failed");
                }
            }
        })
    }
}
