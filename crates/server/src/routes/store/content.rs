//! Banners and the public tier table.

use axum::{Json, Router, extract::State, routing::get};
use chrono::Utc;

use crate::db::{BannerRepository, TierRepository};
use crate::error::AppError;
use crate::models::{Banner, Tier};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/banners", get(banners))
        .route("/tiers", get(tiers))
}

/// Banners live right now, in display order.
async fn banners(State(state): State<AppState>) -> Result<Json<Vec<Banner>>, AppError> {
    let banners = BannerRepository::new(state.pool())
        .list_live(Utc::now())
        .await?;
    Ok(Json(banners))
}

/// Active tiers, lowest rank first.
async fn tiers(State(state): State<AppState>) -> Result<Json<Vec<Tier>>, AppError> {
    Ok(Json(TierRepository::new(state.pool()).list_active().await?))
}
