//! Return review and refunds.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};

use sagebrush_core::ReturnId;

use crate::db::ReturnRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{
    RefundInput, ReturnDecisionInput, ReturnFilter, ReturnRequest, ReturnShipmentInput,
};
use crate::services::ReturnService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/returns", get(list))
        .route("/returns/{id}", get(show))
        .route("/returns/{id}/approve", post(approve))
        .route("/returns/{id}/reject", post(reject))
        .route("/returns/{id}/in-transit", post(in_transit))
        .route("/returns/{id}/received", post(received))
        .route("/returns/{id}/refund", post(refund))
        .route("/returns/{id}/complete", post(complete))
}

fn service(state: &AppState) -> ReturnService<'_> {
    ReturnService::new(state.pool(), state.payments(), &state.config().loyalty)
}

async fn list(
    _: RequireAdmin,
    State(state): State<AppState>,
    Query(filter): Query<ReturnFilter>,
) -> Result<Json<Vec<ReturnRequest>>, AppError> {
    let returns = ReturnRepository::new(state.pool()).list(&filter).await?;
    Ok(Json(returns))
}

async fn show(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
) -> Result<Json<ReturnRequest>, AppError> {
    ReturnRepository::new(state.pool())
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found("return"))
}

async fn approve(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
    Json(input): Json<ReturnDecisionInput>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(service(&state).approve(id, &input).await?))
}

async fn reject(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
    Json(input): Json<ReturnDecisionInput>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(service(&state).reject(id, &input).await?))
}

async fn in_transit(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
    Json(input): Json<ReturnShipmentInput>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(service(&state).mark_in_transit(id, input).await?))
}

async fn received(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
    Json(input): Json<ReturnDecisionInput>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(service(&state).mark_received(id, &input).await?))
}

/// Refund part or all of the order; points are revoked in proportion.
async fn refund(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
    Json(input): Json<RefundInput>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(service(&state).refund(id, input).await?))
}

async fn complete(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
    Json(input): Json<ReturnDecisionInput>,
) -> Result<Json<ReturnRequest>, AppError> {
    Ok(Json(service(&state).complete(id, &input).await?))
}
