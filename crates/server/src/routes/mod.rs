//! HTTP routes.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                              - Liveness
//! GET  /health/ready                        - Readiness (database reachable)
//!
//! # Storefront (rate limited, customer from x-customer-id)
//! GET  /store/banners                       - Live banners
//! GET  /store/tiers                         - Active tiers
//! GET  /store/products/{id}/reviews         - Approved reviews
//! POST /store/products/{id}/reviews         - Submit a review
//! GET  /store/products/{id}/reviews/summary - Count and average rating
//! GET  /store/me/membership                 - Tier and balance
//! GET  /store/me/points                     - Points ledger
//! POST /store/me/points/redeem              - Redeem points
//! GET  /store/orders                        - Order history
//! GET  /store/returns                       - Return requests
//! POST /store/returns                       - Request a return
//! POST /store/returns/{id}/cancel           - Withdraw a return
//! POST /store/shipping/rates                - Shipping quotes
//!
//! # Admin (bearer token)
//! /admin/orders, /admin/returns, /admin/reviews, /admin/banners,
//! /admin/tiers, /admin/shipping-settings, /admin/customers,
//! /admin/products, /admin/variants, /admin/inventory/low-stock
//!
//! # Webhooks (rate limited, signed)
//! POST /webhooks/payments                   - Payment provider events
//! ```

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::from_fn,
    routing::get,
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::middleware::request_id_middleware;
use crate::state::AppState;

pub mod admin;
pub mod store;
pub mod webhooks;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .nest("/admin", admin::router())
        .nest("/store", store::router(&state))
        .merge(webhooks::router(&state))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the database is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").fetch_one(state.pool()).await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
