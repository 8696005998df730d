//! The signed-in customer's tier and points.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};

use crate::db::{LoyaltyRepository, Page};
use crate::error::AppError;
use crate::middleware::CurrentCustomer;
use crate::models::{Membership, PointsTransaction, RedeemInput, RedeemResult};
use crate::services::LoyaltyService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/me/membership", get(membership))
        .route("/me/points", get(points))
        .route("/me/points/redeem", post(redeem))
}

async fn membership(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
) -> Result<Json<Membership>, AppError> {
    Ok(Json(
        LoyaltyRepository::new(state.pool())
            .membership(customer_id)
            .await?,
    ))
}

async fn points(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<PointsTransaction>>, AppError> {
    let ledger = LoyaltyRepository::new(state.pool())
        .transactions(customer_id, page)
        .await?;
    Ok(Json(ledger))
}

/// Spend points for a discount on the next checkout.
async fn redeem(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
    Json(input): Json<RedeemInput>,
) -> Result<Json<RedeemResult>, AppError> {
    let result = LoyaltyService::new(state.pool(), &state.config().loyalty)
        .redeem(customer_id, input.points)
        .await?;
    Ok(Json(result))
}
