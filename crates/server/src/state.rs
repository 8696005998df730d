//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::ServerConfig;
use crate::middleware::SlidingWindowLimiter;
use crate::services::payments::PaymentError;
use crate::services::shipping::ShippingError;
use crate::services::{IdempotencyStore, PaymentClient, ShippingClient};

/// Error building the application state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("payment client: {0}")]
    Payment(#[from] PaymentError),
    #[error("shipping client: {0}")]
    Shipping(#[from] ShippingError),
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: ServerConfig,
    pool: PgPool,
    api_limiter: Arc<SlidingWindowLimiter>,
    webhook_limiter: Arc<SlidingWindowLimiter>,
    idempotency: IdempotencyStore,
    payments: PaymentClient,
    shipping: Option<ShippingClient>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be built.
    pub fn new(config: ServerConfig, pool: PgPool) -> Result<Self, StateError> {
        let limits = &config.rate_limit;
        let api_limiter = Arc::new(SlidingWindowLimiter::new("api", limits.api, limits.block));
        let webhook_limiter = Arc::new(SlidingWindowLimiter::new(
            "webhook",
            limits.webhook,
            limits.block,
        ));
        let idempotency = IdempotencyStore::from_config(&config.idempotency, &pool);
        let payments = PaymentClient::new(&config.payment)?;
        let shipping = config
            .shipping
            .as_ref()
            .map(ShippingClient::new)
            .transpose()?;

        Ok(Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                api_limiter,
                webhook_limiter,
                idempotency,
                payments,
                shipping,
            }),
        })
    }

    /// Get a reference to the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Limiter guarding `/store` routes.
    #[must_use]
    pub fn api_limiter(&self) -> &SlidingWindowLimiter {
        &self.inner.api_limiter
    }

    /// Limiter guarding the payment webhook.
    #[must_use]
    pub fn webhook_limiter(&self) -> &SlidingWindowLimiter {
        &self.inner.webhook_limiter
    }

    /// Both limiters, for the background sweeper.
    #[must_use]
    pub fn limiters(&self) -> Vec<Arc<SlidingWindowLimiter>> {
        vec![
            Arc::clone(&self.inner.api_limiter),
            Arc::clone(&self.inner.webhook_limiter),
        ]
    }

    /// Webhook event claim store.
    #[must_use]
    pub fn idempotency(&self) -> &IdempotencyStore {
        &self.inner.idempotency
    }

    /// Payment provider client.
    #[must_use]
    pub fn payments(&self) -> &PaymentClient {
        &self.inner.payments
    }

    /// Live shipping-rate client, when configured.
    #[must_use]
    pub fn shipping(&self) -> Option<&ShippingClient> {
        self.inner.shipping.as_ref()
    }
}
