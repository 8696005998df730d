//! Membership tier management.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use sagebrush_core::TierId;

use crate::db::TierRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{Tier, TierInput};
use crate::services::LoyaltyService;
use crate::services::loyalty::EvaluationSummary;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tiers", get(list).post(create))
        .route("/tiers/evaluate", post(evaluate_all))
        .route("/tiers/{id}", get(show).put(update).delete(remove))
}

async fn list(_: RequireAdmin, State(state): State<AppState>) -> Result<Json<Vec<Tier>>, AppError> {
    Ok(Json(TierRepository::new(state.pool()).list().await?))
}

async fn create(
    _: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<TierInput>,
) -> Result<(StatusCode, Json<Tier>), AppError> {
    let input = input.validate()?;
    let tier = TierRepository::new(state.pool()).create(&input).await?;
    tracing::info!(tier_id = %tier.id, name = %tier.name, "Tier created");
    Ok((StatusCode::CREATED, Json(tier)))
}

async fn show(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<TierId>,
) -> Result<Json<Tier>, AppError> {
    TierRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("tier"))
}

async fn update(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<TierId>,
    Json(input): Json<TierInput>,
) -> Result<Json<Tier>, AppError> {
    let input = input.validate()?;
    Ok(Json(TierRepository::new(state.pool()).update(id, &input).await?))
}

async fn remove(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<TierId>,
) -> Result<StatusCode, AppError> {
    TierRepository::new(state.pool()).delete(id).await?;
    tracing::info!(tier_id = %id, "Tier deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Re-evaluate every customer after the tier table changed.
async fn evaluate_all(
    _: RequireAdmin,
    State(state): State<AppState>,
) -> Result<Json<EvaluationSummary>, AppError> {
    let summary = LoyaltyService::new(state.pool(), &state.config().loyalty)
        .evaluate_all()
        .await?;
    Ok(Json(summary))
}
