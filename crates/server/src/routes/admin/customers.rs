//! Customers, memberships and points corrections.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use sagebrush_core::CustomerId;

use crate::db::{CustomerRepository, LoyaltyRepository, Page};
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{
    AdjustPointsInput, CreateCustomerInput, Customer, Membership, MembershipEvaluation,
    PointsTransaction,
};
use crate::services::LoyaltyService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/customers", get(list).post(create))
        .route("/customers/{id}/membership", get(membership))
        .route("/customers/{id}/membership/evaluate", post(evaluate))
        .route("/customers/{id}/points", get(points))
        .route("/customers/{id}/points/adjust", post(adjust))
}

async fn list(
    _: RequireAdmin,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Customer>>, AppError> {
    Ok(Json(CustomerRepository::new(state.pool()).list(page).await?))
}

async fn create(
    _: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateCustomerInput>,
) -> Result<(StatusCode, Json<Customer>), AppError> {
    let input = input.normalized()?;
    let customer = CustomerRepository::new(state.pool()).create(&input).await?;
    tracing::info!(customer_id = %customer.id, "Customer created");
    Ok((StatusCode::CREATED, Json(customer)))
}

async fn ensure_customer(state: &AppState, id: CustomerId) -> Result<(), AppError> {
    CustomerRepository::new(state.pool())
        .get(id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::not_found("customer"))
}

async fn membership(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<Membership>, AppError> {
    ensure_customer(&state, id).await?;
    Ok(Json(LoyaltyRepository::new(state.pool()).membership(id).await?))
}

async fn evaluate(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
) -> Result<Json<MembershipEvaluation>, AppError> {
    let evaluation = LoyaltyService::new(state.pool(), &state.config().loyalty)
        .evaluate_customer(id)
        .await?;
    Ok(Json(evaluation))
}

async fn points(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<PointsTransaction>>, AppError> {
    ensure_customer(&state, id).await?;
    let ledger = LoyaltyRepository::new(state.pool())
        .transactions(id, page)
        .await?;
    Ok(Json(ledger))
}

async fn adjust(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<CustomerId>,
    Json(input): Json<AdjustPointsInput>,
) -> Result<(StatusCode, Json<PointsTransaction>), AppError> {
    let row = LoyaltyService::new(state.pool(), &state.config().loyalty)
        .adjust(id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(row)))
}
