//! HTTP middleware and request extractors.

pub mod auth;
pub mod rate_limit;
pub mod request_id;

pub use auth::{CurrentCustomer, MaybeCustomer, RequireAdmin};
pub use rate_limit::{SlidingWindowLimiter, api_rate_limit, webhook_rate_limit};
pub use request_id::request_id_middleware;
