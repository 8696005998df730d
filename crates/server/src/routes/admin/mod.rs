//! Admin API, nested under `/admin`.
//!
//! Every handler takes the [`RequireAdmin`](crate::middleware::RequireAdmin)
//! extractor, so a missing or wrong bearer token is rejected with 401 before
//! the body is parsed.

use axum::Router;

use crate::state::AppState;

pub mod banners;
pub mod catalog;
pub mod customers;
pub mod orders;
pub mod returns;
pub mod reviews;
pub mod shipping;
pub mod tiers;

/// Build the admin router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(orders::router())
        .merge(returns::router())
        .merge(reviews::router())
        .merge(banners::router())
        .merge(tiers::router())
        .merge(shipping::router())
        .merge(customers::router())
        .merge(catalog::router())
}
