//! Inventory jobs.

use sagebrush_server::config::LowStockConfig;
use sagebrush_server::services::LowStockMonitor;

use super::{CommandError, connect};

/// Rebuild the low-stock snapshot and log what it found.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the scan fails.
pub async fn scan() -> Result<(), CommandError> {
    let config = LowStockConfig::from_env()?;
    let pool = connect().await?;

    let alerts = LowStockMonitor::new(pool, config.default_threshold)
        .scan()
        .await?;

    tracing::info!("Low-stock scan complete: {} variant(s)", alerts.len());
    for alert in &alerts {
        tracing::info!(
            "  {} ({}): {} on hand, threshold {}",
            alert.sku,
            alert.title,
            alert.inventory_quantity,
            alert.threshold
        );
    }
    Ok(())
}
