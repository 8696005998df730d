//! Processed webhook event markers.

use std::time::Duration;

use sqlx::PgPool;

use super::RepositoryError;

/// Repository for `commerce.processed_webhook_event`.
pub struct WebhookEventRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WebhookEventRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Atomically claim `event_id` for `ttl`.
    ///
    /// Returns `true` when this caller now owns the event: either no marker
    /// existed or the previous one had expired.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn claim(
        &self,
        event_id: &str,
        event_type: &str,
        ttl: Duration,
    ) -> Result<bool, RepositoryError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let claimed: Option<String> = sqlx::query_scalar(
            r"
            INSERT INTO commerce.processed_webhook_event (event_id, event_type, expires_at)
            VALUES ($1, $2, NOW() + $3::FLOAT8 * INTERVAL '1 second')
            ON CONFLICT (event_id) DO UPDATE
            SET event_type = EXCLUDED.event_type,
                claimed_at = NOW(),
                expires_at = EXCLUDED.expires_at
            WHERE commerce.processed_webhook_event.expires_at < NOW()
            RETURNING event_id
            ",
        )
        .bind(event_id)
        .bind(event_type)
        .bind(ttl_secs)
        .fetch_optional(self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    /// Drop a claim so a retried delivery can run again.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn release(&self, event_id: &str) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM commerce.processed_webhook_event WHERE event_id = $1")
            .bind(event_id)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Remove expired markers. Returns how many were deleted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn purge_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM commerce.processed_webhook_event WHERE expires_at < NOW()")
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
