//! Customer return requests.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};

use sagebrush_core::ReturnId;

use crate::db::{Page, ReturnRepository};
use crate::error::AppError;
use crate::middleware::CurrentCustomer;
use crate::models::{CreateReturnInput, ReturnRequest};
use crate::services::ReturnService;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/returns", get(list).post(create))
        .route("/returns/{id}/cancel", post(cancel))
}

async fn list(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<ReturnRequest>>, AppError> {
    let returns = ReturnRepository::new(state.pool())
        .list_for_customer(customer_id, page)
        .await?;
    Ok(Json(returns))
}

async fn create(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
    Json(input): Json<CreateReturnInput>,
) -> Result<(StatusCode, Json<ReturnRequest>), AppError> {
    let created = ReturnService::new(state.pool(), state.payments(), &state.config().loyalty)
        .request(customer_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn cancel(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
    Path(id): Path<ReturnId>,
) -> Result<Json<ReturnRequest>, AppError> {
    let cancelled = ReturnService::new(state.pool(), state.payments(), &state.config().loyalty)
        .cancel(customer_id, id)
        .await?;
    Ok(Json(cancelled))
}
