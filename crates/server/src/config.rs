//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATABASE_URL` - `PostgreSQL` connection string
//! - `ADMIN_API_TOKEN` - Bearer token for `/admin` routes (high entropy)
//! - `PAYMENT_WEBHOOK_SECRET` - Signing secret for payment webhooks
//!
//! ## Optional
//! - `HOST` - Bind address (default: 127.0.0.1)
//! - `PORT` - Listen port (default: 3000)
//! - `PAYMENT_API_KEY` - Payment provider secret key (enables refunds)
//! - `PAYMENT_API_BASE` - Payment API base URL (default: <https://api.stripe.com/v1>)
//! - `SHIPPING_API_KEY` / `SHIPPING_API_BASE` - Live shipping rates (set together)
//! - `LOYALTY_WINDOW_MONTHS` - Tier evaluation window (default: 12)
//! - `POINTS_REDEMPTION_CENTS_PER_POINT` - Redemption rate (default: 0.01)
//! - `RATE_LIMIT_API_MAX` / `RATE_LIMIT_API_WINDOW_SECS` - Store limiter (default: 120 per 60s)
//! - `RATE_LIMIT_WEBHOOK_MAX` / `RATE_LIMIT_WEBHOOK_WINDOW_SECS` - Webhook limiter (default: 30 per 60s)
//! - `RATE_LIMIT_BLOCK_SECS` - Block duration once a limit trips (default: 300, at most 7 days)
//! - `RATE_LIMIT_SWEEP_SECS` - Limiter cleanup interval (default: 60)
//! - `IDEMPOTENCY_BACKEND` - `postgres` or `memory` (default: postgres)
//! - `IDEMPOTENCY_TTL_SECS` - How long a processed event id is remembered (default: 86400)
//! - `LOW_STOCK_INTERVAL_SECS` - Low-stock scan interval (default: 3600)
//! - `LOW_STOCK_DEFAULT_THRESHOLD` - Threshold for variants without one (default: 5)
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//! - `LOG_FORMAT` - `json` for structured logs, anything else for text

use std::collections::HashMap;
use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

const MIN_TOKEN_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;
const DEFAULT_PAYMENT_API_BASE: &str = "https://api.stripe.com/v1";

/// Longest accepted `RATE_LIMIT_BLOCK_SECS`.
pub const MAX_BLOCK: Duration = Duration::from_secs(7 * 86_400);

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Bearer token accepted on `/admin` routes
    pub admin_token: SecretString,
    /// Payment provider settings
    pub payment: PaymentConfig,
    /// Live shipping-rate provider (optional)
    pub shipping: Option<ShippingApiConfig>,
    /// Tier evaluation and redemption settings
    pub loyalty: LoyaltyConfig,
    /// Sliding-window limiter settings
    pub rate_limit: RateLimitConfig,
    /// Webhook de-duplication settings
    pub idempotency: IdempotencyConfig,
    /// Low-stock job settings
    pub low_stock: LowStockConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
    /// Emit JSON logs instead of text
    pub log_json: bool,
}

/// Payment provider configuration.
///
/// Implements `Debug` manually to redact the secrets.
#[derive(Clone)]
pub struct PaymentConfig {
    /// Secret API key; refunds are recorded locally only when absent
    pub api_key: Option<SecretString>,
    /// API base URL
    pub api_base: Url,
    /// Webhook signing secret
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base.as_str())
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

/// Live shipping-rate API configuration.
#[derive(Clone)]
pub struct ShippingApiConfig {
    /// API key
    pub api_key: SecretString,
    /// API base URL
    pub api_base: Url,
}

impl std::fmt::Debug for ShippingApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShippingApiConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base.as_str())
            .finish()
    }
}

/// Membership tier and points settings.
#[derive(Debug, Clone)]
pub struct LoyaltyConfig {
    /// Length of the rolling evaluation window in calendar months
    pub window_months: u32,
    /// Discount cents granted per redeemed point
    pub cents_per_point: Decimal,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            window_months: 12,
            cents_per_point: Decimal::new(1, 2),
        }
    }
}

/// One limiter's budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    /// Requests allowed per window
    pub max_requests: usize,
    /// Window length
    pub window: Duration,
}

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Budget for `/store` routes
    pub api: WindowLimit,
    /// Budget for the payment webhook
    pub webhook: WindowLimit,
    /// How long a key stays blocked once it exceeds its budget
    pub block: Duration,
    /// Interval between sweeps of idle keys
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            api: WindowLimit {
                max_requests: 120,
                window: Duration::from_secs(60),
            },
            webhook: WindowLimit {
                max_requests: 30,
                window: Duration::from_secs(60),
            },
            block: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Where processed webhook event ids are remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdempotencyBackend {
    /// `commerce.processed_webhook_event`, shared by all instances
    #[default]
    Postgres,
    /// In-process cache, lost on restart
    Memory,
}

impl FromStr for IdempotencyBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("expected 'postgres' or 'memory', got '{other}'")),
        }
    }
}

/// Webhook idempotency configuration.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Storage backend
    pub backend: IdempotencyBackend,
    /// Retention of processed event ids
    pub ttl: Duration,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            backend: IdempotencyBackend::Postgres,
            ttl: Duration::from_secs(86_400),
        }
    }
}

/// Low-stock job configuration.
#[derive(Debug, Clone)]
pub struct LowStockConfig {
    /// Interval between scans
    pub interval: Duration,
    /// Threshold for variants that do not set their own
    pub default_threshold: i32,
}

impl Default for LowStockConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            default_threshold: 5,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_required_secret("DATABASE_URL")?;
        let host = get_parsed_or_default("HOST", IpAddr::from([127, 0, 0, 1]))?;
        let port = get_parsed_or_default("PORT", 3000_u16)?;

        let admin_token = get_validated_secret("ADMIN_API_TOKEN")?;
        validate_token_length(&admin_token, "ADMIN_API_TOKEN")?;

        let payment = PaymentConfig::from_env()?;
        let shipping = ShippingApiConfig::from_env()?;
        let loyalty = LoyaltyConfig::from_env()?;
        let rate_limit = RateLimitConfig::from_env()?;
        let idempotency = IdempotencyConfig::from_env()?;
        let low_stock = LowStockConfig::from_env()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);
        let log_json = get_optional_env("LOG_FORMAT").is_some_and(|f| f.eq_ignore_ascii_case("json"));

        Ok(Self {
            database_url,
            host,
            port,
            admin_token,
            payment,
            shipping,
            loyalty,
            rate_limit,
            idempotency,
            low_stock,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
            log_json,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl PaymentConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let api_key = get_optional_env("PAYMENT_API_KEY")
            .map(|key| {
                validate_secret_strength(&key, "PAYMENT_API_KEY")?;
                Ok::<_, ConfigError>(SecretString::from(key))
            })
            .transpose()?;

        Ok(Self {
            api_key,
            api_base: get_url_or_default("PAYMENT_API_BASE", DEFAULT_PAYMENT_API_BASE)?,
            webhook_secret: get_validated_secret("PAYMENT_WEBHOOK_SECRET")?,
        })
    }
}

impl ShippingApiConfig {
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let api_key = get_optional_env("SHIPPING_API_KEY");
        let api_base = get_optional_env("SHIPPING_API_BASE");

        match (api_key, api_base) {
            (Some(key), Some(base)) => {
                validate_secret_strength(&key, "SHIPPING_API_KEY")?;
                let api_base = Url::parse(&base).map_err(|e| {
                    ConfigError::InvalidEnvVar("SHIPPING_API_BASE".to_string(), e.to_string())
                })?;
                Ok(Some(Self {
                    api_key: SecretString::from(key),
                    api_base,
                }))
            }
            (None, None) => Ok(None),
            _ => Err(ConfigError::InvalidEnvVar(
                "SHIPPING_API_*".to_string(),
                "Both SHIPPING_API_KEY and SHIPPING_API_BASE must be set together".to_string(),
            )),
        }
    }
}

impl LoyaltyConfig {
    /// Load from the environment, using defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let window_months = get_parsed_or_default("LOYALTY_WINDOW_MONTHS", defaults.window_months)?;
        if window_months == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "LOYALTY_WINDOW_MONTHS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let cents_per_point = get_parsed_or_default(
            "POINTS_REDEMPTION_CENTS_PER_POINT",
            defaults.cents_per_point,
        )?;
        if cents_per_point.is_sign_negative() {
            return Err(ConfigError::InvalidEnvVar(
                "POINTS_REDEMPTION_CENTS_PER_POINT".to_string(),
                "must not be negative".to_string(),
            ));
        }

        Ok(Self {
            window_months,
            cents_per_point,
        })
    }
}

impl RateLimitConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let block = get_secs_or_default("RATE_LIMIT_BLOCK_SECS", defaults.block)?;
        check_block(block)?;
        Ok(Self {
            api: WindowLimit {
                max_requests: get_max_requests("RATE_LIMIT_API_MAX", defaults.api.max_requests)?,
                window: get_secs_or_default("RATE_LIMIT_API_WINDOW_SECS", defaults.api.window)?,
            },
            webhook: WindowLimit {
                max_requests: get_max_requests(
                    "RATE_LIMIT_WEBHOOK_MAX",
                    defaults.webhook.max_requests,
                )?,
                window: get_secs_or_default(
                    "RATE_LIMIT_WEBHOOK_WINDOW_SECS",
                    defaults.webhook.window,
                )?,
            },
            block,
            sweep_interval: get_secs_or_default("RATE_LIMIT_SWEEP_SECS", defaults.sweep_interval)?,
        })
    }
}

fn get_max_requests(key: &str, default: usize) -> Result<usize, ConfigError> {
    let max = get_parsed_or_default(key, default)?;
    check_max_requests(key, max)?;
    Ok(max)
}

fn check_max_requests(key: &str, max: usize) -> Result<(), ConfigError> {
    if max == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn check_block(block: Duration) -> Result<(), ConfigError> {
    if block > MAX_BLOCK {
        return Err(ConfigError::InvalidEnvVar(
            "RATE_LIMIT_BLOCK_SECS".to_string(),
            format!("must be at most {} seconds", MAX_BLOCK.as_secs()),
        ));
    }
    Ok(())
}

impl IdempotencyConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            backend: get_parsed_or_default("IDEMPOTENCY_BACKEND", defaults.backend)?,
            ttl: get_secs_or_default("IDEMPOTENCY_TTL_SECS", defaults.ttl)?,
        })
    }
}

impl LowStockConfig {
    /// Load from the environment, using defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` for unparseable or out-of-range values.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let default_threshold =
            get_parsed_or_default("LOW_STOCK_DEFAULT_THRESHOLD", defaults.default_threshold)?;
        if default_threshold < 0 {
            return Err(ConfigError::InvalidEnvVar(
                "LOW_STOCK_DEFAULT_THRESHOLD".to_string(),
                "must not be negative".to_string(),
            ));
        }
        Ok(Self {
            interval: get_secs_or_default("LOW_STOCK_INTERVAL_SECS", defaults.interval)?,
            default_threshold,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get a required environment variable as a secret.
fn get_required_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    Ok(SecretString::from(value))
}

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse an optional environment variable, falling back to `default`.
fn get_parsed_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    get_optional_env(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    })
}

/// Parse a whole number of seconds, falling back to `default`.
fn get_secs_or_default(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    let secs = get_parsed_or_default(key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be at least 1 second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

/// Parse a URL, falling back to `default`.
fn get_url_or_default(key: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = get_optional_env(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a bearer token meets minimum length requirements.
fn validate_token_length(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_TOKEN_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_TOKEN_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_empty() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_single_char() {
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_shannon_entropy_two_chars() {
        let entropy = shannon_entropy("ab");
        assert!((entropy - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let result = validate_secret_strength("your-webhook-secret", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("whsec_aB3xY9mK2nL5pQ7rT0uW4zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_token_length() {
        assert!(validate_token_length(&SecretString::from("short"), "T").is_err());
        assert!(validate_token_length(&SecretString::from("k".repeat(32)), "T").is_ok());
    }

    #[test]
    fn test_idempotency_backend_parse() {
        assert_eq!(
            "Memory".parse::<IdempotencyBackend>().unwrap(),
            IdempotencyBackend::Memory
        );
        assert_eq!(
            " postgres ".parse::<IdempotencyBackend>().unwrap(),
            IdempotencyBackend::Postgres
        );
        assert!("redis".parse::<IdempotencyBackend>().is_err());
    }

    #[test]
    fn test_defaults() {
        let limits = RateLimitConfig::default();
        assert_eq!(limits.api.max_requests, 120);
        assert_eq!(limits.block, Duration::from_secs(300));

        let loyalty = LoyaltyConfig::default();
        assert_eq!(loyalty.window_months, 12);
        assert_eq!(loyalty.cents_per_point.to_string(), "0.01");

        assert_eq!(LowStockConfig::default().default_threshold, 5);
    }

    #[test]
    fn test_rate_limit_bounds() {
        assert!(matches!(
            check_max_requests("RATE_LIMIT_API_MAX", 0),
            Err(ConfigError::InvalidEnvVar(..))
        ));
        assert!(check_max_requests("RATE_LIMIT_API_MAX", 1).is_ok());

        assert!(check_block(MAX_BLOCK).is_ok());
        assert!(check_block(MAX_BLOCK + Duration::from_secs(1)).is_err());
        assert!(check_block(Duration::from_secs(u64::MAX)).is_err());
    }

    #[test]
    fn test_payment_config_debug_redacts_secrets() {
        let config = PaymentConfig {
            api_key: Some(SecretString::from("sk_live_super_secret_key")),
            api_base: Url::parse(DEFAULT_PAYMENT_API_BASE).unwrap(),
            webhook_secret: SecretString::from("whsec_super_secret_signing"),
        };

        let debug_output = format!("{config:?}");
        assert!(debug_output.contains("api.stripe.com"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("sk_live_super_secret_key"));
        assert!(!debug_output.contains("whsec_super_secret_signing"));
    }
}
