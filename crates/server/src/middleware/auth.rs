//! Authentication extractors.
//!
//! Admin routes are called by the back-office with a shared bearer token.
//! Storefront routes trust the `x-customer-id` header that the upstream
//! session gateway sets after it has authenticated the shopper.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn my_orders(
//!     CurrentCustomer(customer_id): CurrentCustomer,
//! ) -> impl IntoResponse {
//!     format!("orders for {customer_id}")
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use secrecy::ExposeSecret;

use sagebrush_core::CustomerId;

use crate::error::{AppError, set_sentry_customer};
use crate::state::AppState;

/// Header carrying the authenticated customer's id.
pub const CUSTOMER_ID_HEADER: &str = "x-customer-id";

/// Extractor that requires the admin bearer token.
#[derive(Debug, Clone, Copy)]
pub struct RequireAdmin;

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        if !constant_time_compare(token.trim(), state.config().admin_token.expose_secret()) {
            tracing::warn!(path = %parts.uri.path(), "Rejected admin token");
            return Err(AppError::Unauthorized("Invalid bearer token".to_string()));
        }

        Ok(Self)
    }
}

/// Extractor that requires an authenticated customer.
#[derive(Debug, Clone, Copy)]
pub struct CurrentCustomer(pub CustomerId);

impl<S> FromRequestParts<S> for CurrentCustomer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match customer_from_headers(parts)? {
            Some(id) => Ok(Self(id)),
            None => Err(AppError::Unauthorized("Customer login required".to_string())),
        }
    }
}

/// Extractor for routes open to guests.
///
/// A present but malformed header is still rejected.
#[derive(Debug, Clone, Copy)]
pub struct MaybeCustomer(pub Option<CustomerId>);

impl<S> FromRequestParts<S> for MaybeCustomer
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        customer_from_headers(parts).map(Self)
    }
}

fn customer_from_headers(parts: &Parts) -> Result<Option<CustomerId>, AppError> {
    let Some(raw) = parts.headers.get(CUSTOMER_ID_HEADER) else {
        return Ok(None);
    };

    let id = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<CustomerId>().ok())
        .filter(|id| id.as_i32() > 0)
        .ok_or_else(|| AppError::Unauthorized("Malformed customer id".to_string()))?;

    set_sentry_customer(id);
    Ok(Some(id))
}

/// Constant-time string comparison to prevent timing attacks.
pub(crate) fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}
