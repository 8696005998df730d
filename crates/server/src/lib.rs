//! Sagebrush Server - commerce API for the storefront, admin tools and the
//! payment provider.
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out
//! - `PostgreSQL` via sqlx for orders, loyalty, returns and storefront settings
//! - Payment provider REST API for refunds, signed webhooks for payment events
//! - Optional shipping-rate API with a short-lived cache
//! - In-process sliding-window rate limiting
//!
//! # Modules
//!
//! - [`config`] - Environment configuration
//! - [`db`] - Repositories over the `commerce` schema
//! - [`models`] - Records and validated inputs
//! - [`services`] - Loyalty, returns, webhooks and the low-stock job
//! - [`middleware`] - Auth extractors, rate limiting, request ids
//! - [`routes`] - HTTP handlers

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ServerConfig;
pub use error::AppError;
pub use routes::router;
pub use state::AppState;
