//! Payment provider API client.
//!
//! Only refunds are initiated from here. Captures happen in the hosted
//! checkout and reach us through the payment webhook.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use sagebrush_core::Cents;

use crate::config::PaymentConfig;

/// Errors from the payment provider.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider rejected the request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// No API key is configured.
    #[error("payment API key not configured")]
    NotConfigured,
}

/// A refund created at the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRefund {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Payment provider API client.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct PaymentClient {
    client: reqwest::Client,
    api_key: Option<SecretString>,
    api_base: Url,
}

impl std::fmt::Debug for PaymentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentClient")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl PaymentClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::Http` if the HTTP client cannot be built.
    pub fn new(config: &PaymentConfig) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_base: config.api_base.clone(),
        })
    }

    /// Whether refunds can be sent to the provider.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Refund `amount` of a captured payment.
    ///
    /// `idempotency_key` lets the provider drop a retried request.
    ///
    /// # Errors
    ///
    /// Returns `PaymentError::NotConfigured` without an API key, and
    /// `PaymentError::Api` when the provider refuses the refund.
    #[instrument(skip(self), fields(amount = amount.get()))]
    pub async fn refund(
        &self,
        payment_reference: &str,
        amount: Cents,
        idempotency_key: &str,
    ) -> Result<ProviderRefund, PaymentError> {
        let api_key = self.api_key.as_ref().ok_or(PaymentError::NotConfigured)?;

        let amount = amount.get().to_string();
        let response = self
            .client
            .post(endpoint(&self.api_base, "refunds"))
            .bearer_auth(api_key.expose_secret())
            .header("Idempotency-Key", idempotency_key)
            .form(&[("payment_intent", payment_reference), ("amount", amount.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = api_error_message(&body);
            tracing::warn!(status = status.as_u16(), %message, "Refund rejected by provider");
            return Err(PaymentError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let refund: ProviderRefund = response.json().await?;
        tracing::info!(refund_id = %refund.id, "Refund created");
        Ok(refund)
    }
}

/// `{base}/{path}` without doubling or dropping slashes.
pub(crate) fn endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body).map_or_else(
        |_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                "empty response".to_string()
            } else {
                trimmed.chars().take(200).collect()
            }
        },
        |parsed| parsed.error.message,
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let base = Url::parse("https://api.stripe.com/v1").unwrap();
        assert_eq!(endpoint(&base, "refunds"), "https://api.stripe.com/v1/refunds");

        let base = Url::parse("https://payments.test/api/").unwrap();
        assert_eq!(endpoint(&base, "/refunds"), "https://payments.test/api/refunds");
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error": {"message": "Charge already refunded", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Charge already refunded");
        assert_eq!(api_error_message("  "), "empty response");
        assert_eq!(api_error_message("bad gateway"), "bad gateway");
    }

    #[test]
    fn test_unconfigured_client() {
        let config = PaymentConfig {
            api_key: None,
            api_base: Url::parse("https://api.stripe.com/v1").unwrap(),
            webhook_secret: SecretString::from("whsec_test"),
        };
        let client = PaymentClient::new(&config).unwrap();
        assert!(!client.is_configured());
        assert!(!format!("{client:?}").contains("whsec"));
    }

    #[tokio::test]
    async fn test_refund_without_key_is_not_configured() {
        let config = PaymentConfig {
            api_key: None,
            api_base: Url::parse("https://api.stripe.com/v1").unwrap(),
            webhook_secret: SecretString::from("whsec_test"),
        };
        let client = PaymentClient::new(&config).unwrap();
        let result = client.refund("pi_123", Cents::new(500), "refund-1").await;
        assert!(matches!(result, Err(PaymentError::NotConfigured)));
    }
}
