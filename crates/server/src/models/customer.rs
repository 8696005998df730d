//! Customer records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sagebrush_core::{CustomerId, Email};

use super::{ValidationError, optional_text};

/// A registered customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomerInput {
    pub email: Email,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl CreateCustomerInput {
    /// Trim the optional name fields.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` when a name is longer than 100 characters.
    pub fn normalized(self) -> Result<Self, ValidationError> {
        Ok(Self {
            first_name: optional_text("first_name", self.first_name.as_deref(), 100)?,
            last_name: optional_text("last_name", self.last_name.as_deref(), 100)?,
            email: self.email,
        })
    }
}
