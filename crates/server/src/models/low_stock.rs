//! Low-stock snapshot produced by the periodic scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::VariantId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockAlert {
    pub variant_id: VariantId,
    pub sku: String,
    pub title: String,
    pub inventory_quantity: i32,
    pub threshold: i32,
    pub detected_at: DateTime<Utc>,
}

/// The stored snapshot; `detected_at` is `None` before the first scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockReport {
    pub detected_at: Option<DateTime<Utc>>,
    pub alerts: Vec<LowStockAlert>,
}
