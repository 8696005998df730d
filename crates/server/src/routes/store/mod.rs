//! Storefront API, nested under `/store`.
//!
//! Every route is behind the `api` rate limiter. Customer-specific routes
//! read the customer from the `x-customer-id` header set by the session
//! gateway in front of this service.

use axum::Router;
use axum::middleware::from_fn_with_state;

use crate::middleware::api_rate_limit;
use crate::state::AppState;

pub mod content;
pub mod membership;
pub mod orders;
pub mod returns;
pub mod reviews;
pub mod shipping;

/// Build the storefront router.
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(content::router())
        .merge(reviews::router())
        .merge(membership::router())
        .merge(orders::router())
        .merge(returns::router())
        .merge(shipping::router())
        .layer(from_fn_with_state(state.clone(), api_rate_limit))
}
