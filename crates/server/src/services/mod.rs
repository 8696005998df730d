//! Business operations that span several repositories or external APIs.
//!
//! Route handlers stay thin: they validate input, call into a service and
//! serialize the result. The CLI reuses the same services for batch jobs.

pub mod idempotency;
pub mod loyalty;
pub mod low_stock;
pub mod payments;
pub mod returns;
pub mod shipping;
pub mod webhooks;

use thiserror::Error;

use sagebrush_core::TransitionError;
use sagebrush_core::loyalty::LoyaltyError;

use crate::db::RepositoryError;
use crate::error::AppError;
use crate::models::ValidationError;
use payments::PaymentError;

pub use idempotency::{IdempotencyStore, Outcome, run_once};
pub use loyalty::LoyaltyService;
pub use low_stock::LowStockMonitor;
pub use payments::PaymentClient;
pub use returns::ReturnService;
pub use shipping::ShippingClient;

/// Errors raised by service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Points(#[from] LoyaltyError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// A referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The request is valid but the current state does not allow it.
    #[error("{0}")]
    Conflict(String),
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Repository(e) => Self::Database(e),
            ServiceError::Points(e) => e.into(),
            ServiceError::Transition(e) => e.into(),
            ServiceError::Validation(e) => e.into(),
            ServiceError::Payment(e) => Self::Payment(e),
            ServiceError::NotFound(what) => Self::not_found(what),
            ServiceError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}
