//! Shipping quotes.
//!
//! Free shipping wins when the subtotal reaches the threshold. Otherwise
//! live carrier rates are used when enabled in the settings and a rate API is
//! configured, falling back to the flat rate if the API fails. Live rates are
//! cached for 10 minutes per origin/destination/weight.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::instrument;

use sagebrush_core::{Cents, CurrencyCode};

use crate::config::ShippingApiConfig;
use crate::models::{Destination, QuoteSource, RateRequest, ShippingQuote, ShippingSettings};
use crate::services::payments::endpoint;

/// Errors from the shipping-rate API.
#[derive(Debug, Error)]
pub enum ShippingError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited by the API.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

#[derive(Debug, Serialize)]
struct RateQuery<'a> {
    origin: Origin<'a>,
    destination: &'a Destination,
    weight_grams: i32,
    currency: &'static str,
}

#[derive(Debug, Serialize)]
struct Origin<'a> {
    postal_code: Option<&'a str>,
    country_code: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct RateResponse {
    #[serde(default)]
    rates: Vec<CarrierRate>,
}

#[derive(Debug, Deserialize)]
struct CarrierRate {
    service: String,
    amount_cents: i64,
    currency: String,
    #[serde(default)]
    estimated_days: Option<u32>,
}

/// Client for the live shipping-rate API.
#[derive(Clone)]
pub struct ShippingClient {
    inner: Arc<ShippingClientInner>,
}

struct ShippingClientInner {
    client: reqwest::Client,
    config: ShippingApiConfig,
    cache: Cache<String, Vec<ShippingQuote>>,
}

impl std::fmt::Debug for ShippingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ShippingClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError::Http` if the HTTP client cannot be built.
    pub fn new(config: &ShippingApiConfig) -> Result<Self, ShippingError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let cache = Cache::builder()
            .max_capacity(5_000)
            .time_to_live(Duration::from_secs(600)) // 10 minutes
            .build();

        Ok(Self {
            inner: Arc::new(ShippingClientInner {
                client,
                config: config.clone(),
                cache,
            }),
        })
    }

    /// Carrier rates for a parcel, in the store currency.
    ///
    /// Rates quoted in another currency are dropped.
    ///
    /// # Errors
    ///
    /// Returns `ShippingError` if the request fails or the API refuses it.
    #[instrument(skip(self, settings), fields(country = %request.destination.country_code))]
    pub async fn rates(
        &self,
        settings: &ShippingSettings,
        request: &RateRequest,
    ) -> Result<Vec<ShippingQuote>, ShippingError> {
        let query = RateQuery {
            origin: Origin {
                postal_code: settings.origin_postal_code.as_deref(),
                country_code: settings.origin_country_code.as_deref(),
            },
            destination: &request.destination,
            weight_grams: request.weight_grams,
            currency: settings.currency_code.as_str(),
        };

        let cache_key = serde_json::to_string(&query).unwrap_or_default();
        if let Some(quotes) = self.inner.cache.get(&cache_key).await {
            tracing::debug!("Shipping rate cache hit");
            return Ok(quotes);
        }

        let response = self
            .inner
            .client
            .post(endpoint(&self.inner.config.api_base, "rates"))
            .bearer_auth(self.inner.config.api_key.expose_secret())
            .json(&query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);
            return Err(ShippingError::RateLimited(retry_after));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ShippingError::Api {
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let body: RateResponse = response.json().await?;
        let quotes = live_quotes(body.rates, settings.currency_code);

        if !quotes.is_empty() {
            self.inner.cache.insert(cache_key, quotes.clone()).await;
        }
        Ok(quotes)
    }
}

fn live_quotes(rates: Vec<CarrierRate>, currency: CurrencyCode) -> Vec<ShippingQuote> {
    let mut quotes: Vec<ShippingQuote> = rates
        .into_iter()
        .filter_map(|rate| {
            let rate_currency = rate.currency.parse::<CurrencyCode>().ok();
            if rate_currency != Some(currency) || rate.amount_cents < 0 {
                tracing::debug!(service = %rate.service, currency = %rate.currency, "Skipping carrier rate");
                return None;
            }
            Some(ShippingQuote {
                service: rate.service,
                amount_cents: Cents::new(rate.amount_cents),
                currency_code: currency,
                estimated_days: rate.estimated_days,
                source: QuoteSource::Live,
            })
        })
        .collect();
    quotes.sort_by_key(|q| q.amount_cents);
    quotes
}

/// Quote that does not need the rate API, or `None` when live rates apply.
#[must_use]
pub fn static_quote(
    settings: &ShippingSettings,
    subtotal: Cents,
    live_available: bool,
) -> Option<ShippingQuote> {
    if settings.ships_free(subtotal) {
        return Some(free_quote(settings));
    }
    if settings.use_live_rates && live_available {
        return None;
    }
    Some(flat_quote(settings))
}

fn free_quote(settings: &ShippingSettings) -> ShippingQuote {
    ShippingQuote {
        service: "Free shipping".to_string(),
        amount_cents: Cents::ZERO,
        currency_code: settings.currency_code,
        estimated_days: None,
        source: QuoteSource::FreeThreshold,
    }
}

fn flat_quote(settings: &ShippingSettings) -> ShippingQuote {
    ShippingQuote {
        service: "Standard shipping".to_string(),
        amount_cents: settings.flat_rate_cents,
        currency_code: settings.currency_code,
        estimated_days: None,
        source: QuoteSource::FlatRate,
    }
}

/// Shipping options for a cart.
#[instrument(skip_all, fields(subtotal = request.subtotal_cents.get()))]
pub async fn quote(
    settings: &ShippingSettings,
    request: &RateRequest,
    live: Option<&ShippingClient>,
) -> Vec<ShippingQuote> {
    if let Some(fixed) = static_quote(settings, request.subtotal_cents, live.is_some()) {
        return vec![fixed];
    }

    let Some(client) = live else {
        return vec![flat_quote(settings)];
    };

    match client.rates(settings, request).await {
        Ok(quotes) if !quotes.is_empty() => quotes,
        Ok(_) => {
            tracing::warn!("Shipping API returned no usable rates, using flat rate");
            vec![flat_quote(settings)]
        }
        Err(e) => {
            tracing::warn!(error = %e, "Shipping API failed, using flat rate");
            vec![flat_quote(settings)]
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn settings(threshold: Option<i64>, flat: i64, live: bool) -> ShippingSettings {
        ShippingSettings {
            free_shipping_threshold_cents: threshold.map(Cents::new),
            flat_rate_cents: Cents::new(flat),
            use_live_rates: live,
            ..ShippingSettings::unset()
        }
    }

    fn request(subtotal: i64) -> RateRequest {
        RateRequest {
            subtotal_cents: Cents::new(subtotal),
            destination: Destination {
                country_code: "US".to_string(),
                postal_code: Some("97201".to_string()),
                region: None,
                city: None,
            },
            weight_grams: 800,
        }
    }

    #[test]
    fn test_free_at_threshold() {
        let s = settings(Some(5_000), 695, false);
        let quote = static_quote(&s, Cents::new(5_000), false).unwrap();
        assert_eq!(quote.source, QuoteSource::FreeThreshold);
        assert_eq!(quote.amount_cents, Cents::ZERO);

        let quote = static_quote(&s, Cents::new(4_999), false).unwrap();
        assert_eq!(quote.source, QuoteSource::FlatRate);
        assert_eq!(quote.amount_cents, Cents::new(695));
    }

    #[test]
    fn test_no_threshold_never_free() {
        let s = settings(None, 695, false);
        let quote = static_quote(&s, Cents::new(1_000_000), false).unwrap();
        assert_eq!(quote.source, QuoteSource::FlatRate);
    }

    #[test]
    fn test_live_rates_only_when_enabled_and_configured() {
        let s = settings(Some(5_000), 695, true);
        assert!(static_quote(&s, Cents::new(100), true).is_none());
        assert_eq!(
            static_quote(&s, Cents::new(100), false).unwrap().source,
            QuoteSource::FlatRate
        );
        // free shipping still wins over live rates
        assert_eq!(
            static_quote(&s, Cents::new(9_000), true).unwrap().source,
            QuoteSource::FreeThreshold
        );
    }

    #[tokio::test]
    async fn test_quote_without_client_uses_flat_rate() {
        let s = settings(Some(5_000), 695, true);
        let quotes = quote(&s, &request(1_000), None).await;
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes.first().unwrap().source, QuoteSource::FlatRate);
    }

    #[test]
    fn test_live_quotes_filter_and_sort() {
        let rates = vec![
            CarrierRate {
                service: "Express".to_string(),
                amount_cents: 2_400,
                currency: "USD".to_string(),
                estimated_days: Some(1),
            },
            CarrierRate {
                service: "Ground".to_string(),
                amount_cents: 900,
                currency: "usd".to_string(),
                estimated_days: Some(5),
            },
            CarrierRate {
                service: "Overseas".to_string(),
                amount_cents: 1_500,
                currency: "EUR".to_string(),
                estimated_days: None,
            },
        ];
        let quotes = live_quotes(rates, CurrencyCode::Usd);
        let services: Vec<&str> = quotes.iter().map(|q| q.service.as_str()).collect();
        assert_eq!(services, ["Ground", "Express"]);
        assert!(quotes.iter().all(|q| q.source == QuoteSource::Live));
    }
}
