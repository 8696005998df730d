//! Order registration and fulfillment.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use tracing::instrument;

use sagebrush_core::OrderId;

use crate::db::OrderRepository;
use crate::error::AppError;
use crate::middleware::RequireAdmin;
use crate::models::{
    CreateOrderInput, OrderDetail, OrderFilter, UpdateFulfillmentInput, UpdateTrackingInput,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create).get(list))
        .route("/orders/{id}", get(show))
        .route("/orders/{id}/fulfillment", patch(update_fulfillment))
        .route("/orders/{id}/tracking", patch(update_tracking))
}

/// Register an order placed through checkout.
#[instrument(skip(state, input))]
async fn create(
    _: RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateOrderInput>,
) -> Result<(StatusCode, Json<OrderDetail>), AppError> {
    let input = input.validate()?;
    let order = OrderRepository::new(state.pool()).create(&input).await?;
    tracing::info!(order_id = %order.order.id, "Order registered");
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list(
    _: RequireAdmin,
    State(state): State<AppState>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<Vec<OrderDetail>>, AppError> {
    let orders = OrderRepository::new(state.pool()).list(&filter).await?;
    Ok(Json(orders))
}

async fn show(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
) -> Result<Json<OrderDetail>, AppError> {
    load(&state, id).await.map(Json)
}

/// Move the order to the next fulfillment status.
///
/// Shipping stamps `shipped_at` and may carry courier details; delivery
/// stamps `delivered_at`.
#[instrument(skip(state, input), fields(next = %input.status))]
async fn update_fulfillment(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(input): Json<UpdateFulfillmentInput>,
) -> Result<Json<OrderDetail>, AppError> {
    let tracking = input.tracking.validate()?;
    let current = load(&state, id).await?;
    let from = current.extension.fulfillment_status;
    from.transition(input.status)?;

    let repo = OrderRepository::new(state.pool());
    if !repo
        .transition_fulfillment(id, from, input.status, &tracking)
        .await?
    {
        return Err(AppError::Conflict(
            "order was changed by another request, reload and retry".to_string(),
        ));
    }
    tracing::info!(order_id = %id, %from, to = %input.status, "Fulfillment status changed");

    load(&state, id).await.map(Json)
}

async fn update_tracking(
    _: RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    Json(input): Json<UpdateTrackingInput>,
) -> Result<Json<OrderDetail>, AppError> {
    let tracking = input.validate()?;
    OrderRepository::new(state.pool())
        .update_tracking(id, &tracking)
        .await?;
    load(&state, id).await.map(Json)
}

async fn load(state: &AppState, id: OrderId) -> Result<OrderDetail, AppError> {
    OrderRepository::new(state.pool())
        .get(id)
        .await?
        .ok_or_else(|| AppError::not_found("order"))
}
