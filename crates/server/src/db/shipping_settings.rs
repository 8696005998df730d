//! The single-row shipping settings table.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use sagebrush_core::Cents;

use super::RepositoryError;
use crate::models::{ShippingSettings, ShippingSettingsInput};

#[derive(Debug, sqlx::FromRow)]
struct ShippingSettingsRow {
    free_shipping_threshold_cents: Option<i64>,
    flat_rate_cents: i64,
    currency_code: String,
    origin_postal_code: Option<String>,
    origin_country_code: Option<String>,
    use_live_rates: bool,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ShippingSettingsRow> for ShippingSettings {
    type Error = RepositoryError;

    fn try_from(row: ShippingSettingsRow) -> Result<Self, Self::Error> {
        Ok(Self {
            free_shipping_threshold_cents: row.free_shipping_threshold_cents.map(Cents::new),
            flat_rate_cents: Cents::new(row.flat_rate_cents),
            currency_code: row
                .currency_code
                .parse()
                .map_err(RepositoryError::DataCorruption)?,
            origin_postal_code: row.origin_postal_code,
            origin_country_code: row.origin_country_code,
            use_live_rates: row.use_live_rates,
            updated_at: row.updated_at,
        })
    }
}

const SETTINGS_COLUMNS: &str = "free_shipping_threshold_cents, flat_rate_cents, currency_code, \
    origin_postal_code, origin_country_code, use_live_rates, updated_at";

/// Repository for shipping settings.
pub struct ShippingSettingsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ShippingSettingsRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Current settings, or `ShippingSettings::unset()` before the first save.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self) -> Result<ShippingSettings, RepositoryError> {
        let sql = format!("SELECT {SETTINGS_COLUMNS} FROM commerce.shipping_settings WHERE id = 1");
        let row = sqlx::query_as::<_, ShippingSettingsRow>(&sql)
            .fetch_optional(self.pool)
            .await?;
        row.map_or_else(|| Ok(ShippingSettings::unset()), TryInto::try_into)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn save(&self, input: &ShippingSettingsInput) -> Result<ShippingSettings, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO commerce.shipping_settings
                (id, free_shipping_threshold_cents, flat_rate_cents, currency_code,
                 origin_postal_code, origin_country_code, use_live_rates)
            VALUES (1, $1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET free_shipping_threshold_cents = EXCLUDED.free_shipping_threshold_cents,
                flat_rate_cents = EXCLUDED.flat_rate_cents,
                currency_code = EXCLUDED.currency_code,
                origin_postal_code = EXCLUDED.origin_postal_code,
                origin_country_code = EXCLUDED.origin_country_code,
                use_live_rates = EXCLUDED.use_live_rates,
                updated_at = NOW()
            RETURNING {SETTINGS_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ShippingSettingsRow>(&sql)
            .bind(input.free_shipping_threshold_cents)
            .bind(input.flat_rate_cents)
            .bind(input.currency_code.as_str())
            .bind(input.origin_postal_code.as_deref())
            .bind(input.origin_country_code.as_deref())
            .bind(input.use_live_rates)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "shipping settings"))?;
        row.try_into()
    }
}
