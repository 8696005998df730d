//! Products, variants, stock levels and the low-stock report.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};

use sagebrush_core::{ProductId, VariantId};

use crate::db::{CatalogRepository, LowStockRepository};
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{
    CreateProductInput, CreateVariantInput, LowStockReport, Product, ProductVariant,
    UpdateInventoryInput,
};
use crate::services::LowStockMonitor;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/products", post(create_product))
        .route("/products/{id}/variants", post(create_variant))
        .route("/variants/{id}/inventory", patch(update_inventory))
        .route("/inventory/low-stock", get(low_stock))
        .route("/inventory/low-stock/scan", post(scan_now))
}

async fn create_product(
    _: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    let input = input.validate()?;
    let product = CatalogRepository::new(state.pool())
        .create_product(&input)
        .await?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn create_variant(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Json(input): Json<CreateVariantInput>,
) -> Result<(StatusCode, Json<ProductVariant>), AppError> {
    let input = input.validate()?;
    let variant = CatalogRepository::new(state.pool())
        .create_variant(product_id, &input)
        .await?;
    Ok((StatusCode::CREATED, Json(variant)))
}

/// Set or adjust the stock of one variant.
async fn update_inventory(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<VariantId>,
    Json(input): Json<UpdateInventoryInput>,
) -> Result<Json<ProductVariant>, AppError> {
    let change = input.change()?;
    let variant = CatalogRepository::new(state.pool())
        .update_inventory(id, change)
        .await?;
    tracing::info!(
        variant_id = %id,
        quantity = variant.inventory_quantity,
        "Inventory updated"
    );
    Ok(Json(variant))
}

/// The snapshot written by the last scan.
async fn low_stock(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<LowStockReport>, AppError> {
    Ok(Json(LowStockRepository::new(state.pool()).report().await?))
}

/// Rebuild the snapshot without waiting for the next scheduled scan.
async fn scan_now(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<LowStockReport>, AppError> {
    let monitor = LowStockMonitor::new(
        state.pool().clone(),
        state.config().low_stock.default_threshold,
    );
    monitor.scan().await?;
    Ok(Json(LowStockRepository::new(state.pool()).report().await?))
}
