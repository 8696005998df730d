//! Storefront banner management.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use sagebrush_core::BannerId;

use crate::db::BannerRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{Banner, BannerInput};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/banners", get(list).post(create))
        .route("/banners/{id}", get(show).put(update).delete(remove))
}

async fn list(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<Vec<Banner>>, AppError> {
    Ok(Json(BannerRepository::new(state.pool()).list().await?))
}

async fn create(
    _: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<BannerInput>,
) -> Result<(StatusCode, Json<Banner>), AppError> {
    let input = input.validate()?;
    let banner = BannerRepository::new(state.pool()).create(&input).await?;
    tracing::info!(banner_id = %banner.id, "Banner created");
    Ok((StatusCode::CREATED, Json(banner)))
}

async fn show(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<BannerId>,
) -> Result<Json<Banner>, AppError> {
    BannerRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("banner"))
}

async fn update(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<BannerId>,
    Json(input): Json<BannerInput>,
) -> Result<Json<Banner>, AppError> {
    let input = input.validate()?;
    Ok(Json(BannerRepository::new(state.pool()).update(id, &input).await?))
}

async fn remove(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<BannerId>,
) -> Result<StatusCode, AppError> {
    BannerRepository::new(state.pool()).delete(id).await?;
    tracing::info!(banner_id = %id, "Banner deleted");
    Ok(StatusCode::NO_CONTENT)
}
