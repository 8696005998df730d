//! Order history for the signed-in customer.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::db::{OrderRepository, Page};
use crate::error::AppError;
use crate::middleware::CurrentCustomer;
use crate::models::{OrderDetail, OrderFilter};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/orders", get(list))
}

async fn list(
    CurrentCustomer(customer_id): CurrentCustomer,
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<OrderDetail>>, AppError> {
    let filter = OrderFilter {
        customer_id: Some(customer_id),
        limit: page.limit,
        offset: page.offset,
        ..OrderFilter::default()
    };
    Ok(Json(OrderRepository::new(state.pool()).list(&filter).await?))
}
