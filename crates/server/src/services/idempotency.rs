//! Exactly-once processing of webhook events.
//!
//! Before an event is handled its id is claimed in a store. A second
//! delivery of the same id finds the claim and is acknowledged as a
//! duplicate without running the handler. If the handler fails the claim is
//! released so the provider's retry can process the event again.
//!
//! Claims expire after the configured TTL. The Postgres store is shared by
//! every instance; the memory store is per-process and meant for tests and
//! single-node deployments.

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use sqlx::PgPool;
use tokio::task::JoinHandle;

use crate::config::{IdempotencyBackend, IdempotencyConfig};
use crate::db::{RepositoryError, WebhookEventRepository};

/// Result of [`run_once`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The handler ran and succeeded.
    Processed(T),
    /// The event had already been claimed; the handler did not run.
    Duplicate,
}

impl<T> Outcome<T> {
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Duplicate)
    }
}

/// In-process claim store backed by a TTL cache.
#[derive(Clone)]
pub struct MemoryStore {
    claims: Cache<String, String>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            claims: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }

    async fn try_claim(&self, event_id: &str, event_type: &str) -> bool {
        let event_type = event_type.to_owned();
        self.claims
            .entry(event_id.to_owned())
            .or_insert_with(async move { event_type })
            .await
            .is_fresh()
    }

    async fn release(&self, event_id: &str) {
        self.claims.invalidate(event_id).await;
    }
}

/// Claim store backed by `commerce.processed_webhook_event`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    ttl: Duration,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }
}

/// Where claims are kept.
#[derive(Clone)]
pub enum IdempotencyStore {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl std::fmt::Debug for IdempotencyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory(_) => f.write_str("IdempotencyStore::Memory"),
            Self::Postgres(_) => f.write_str("IdempotencyStore::Postgres"),
        }
    }
}

impl IdempotencyStore {
    /// Build the store selected in configuration.
    #[must_use]
    pub fn from_config(config: &IdempotencyConfig, pool: &PgPool) -> Self {
        match config.backend {
            IdempotencyBackend::Memory => Self::Memory(MemoryStore::new(config.ttl)),
            IdempotencyBackend::Postgres => Self::Postgres(PgStore::new(pool.clone(), config.ttl)),
        }
    }

    /// Claim `event_id`. Returns `false` if it is already claimed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the Postgres store cannot be reached.
    pub async fn try_claim(&self, event_id: &str, event_type: &str) -> Result<bool, RepositoryError> {
        match self {
            Self::Memory(store) => Ok(store.try_claim(event_id, event_type).await),
            Self::Postgres(store) => {
                WebhookEventRepository::new(&store.pool)
                    .claim(event_id, event_type, store.ttl)
                    .await
            }
        }
    }

    /// Forget a claim.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the Postgres store cannot be reached.
    pub async fn release(&self, event_id: &str) -> Result<(), RepositoryError> {
        match self {
            Self::Memory(store) => {
                store.release(event_id).await;
                Ok(())
            }
            Self::Postgres(store) => WebhookEventRepository::new(&store.pool).release(event_id).await,
        }
    }
}

/// Run `handler` at most once per `event_id`.
///
/// # Errors
///
/// Returns the handler's error after releasing the claim, or a store error
/// converted into `E`.
pub async fn run_once<T, E, F, Fut>(
    store: &IdempotencyStore,
    event_id: &str,
    event_type: &str,
    handler: F,
) -> Result<Outcome<T>, E>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: From<RepositoryError>,
{
    if !store.try_claim(event_id, event_type).await? {
        tracing::info!(event_id, event_type, "Duplicate webhook event, skipping");
        return Ok(Outcome::Duplicate);
    }

    match handler().await {
        Ok(value) => Ok(Outcome::Processed(value)),
        Err(err) => {
            if let Err(release_err) = store.release(event_id).await {
                tracing::error!(
                    event_id,
                    error = %release_err,
                    "Failed to release webhook claim; retries will be treated as duplicates"
                );
            }
            Err(err)
        }
    }
}

/// Periodically delete expired claims from the Postgres store.
pub fn spawn_purger(pool: PgPool, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match WebhookEventRepository::new(&pool).purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired webhook claims"),
                Err(e) => tracing::warn!(error = %e, "Failed to purge webhook claims"),
            }
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn memory_store() -> IdempotencyStore {
        IdempotencyStore::Memory(MemoryStore::new(Duration::from_secs(60)))
    }

    #[tokio::test]
    async fn test_second_claim_fails() {
        let store = memory_store();
        assert!(store.try_claim("evt_1", "charge.refunded").await.unwrap());
        assert!(!store.try_claim("evt_1", "charge.refunded").await.unwrap());
        assert!(store.try_claim("evt_2", "charge.refunded").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_does_not_run_handler() {
        let store = memory_store();
        let runs = AtomicUsize::new(0);

        for _ in 0..3 {
            let _ = run_once(&store, "evt_1", "payment_intent.succeeded", || async {
                runs.fetch_add(1, Ordering::SeqCst);
                Ok::<_, RepositoryError>(())
            })
            .await
            .unwrap();
        }

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_outcomes() {
        let store = memory_store();
        let first = run_once(&store, "evt_1", "t", || async { Ok::<_, RepositoryError>(7) })
            .await
            .unwrap();
        assert_eq!(first, Outcome::Processed(7));

        let second = run_once(&store, "evt_1", "t", || async { Ok::<_, RepositoryError>(8) })
            .await
            .unwrap();
        assert!(second.is_duplicate());
    }

    #[tokio::test]
    async fn test_failed_handler_releases_claim() {
        let store = memory_store();

        let failed = run_once(&store, "evt_1", "t", || async {
            Err::<(), _>(RepositoryError::NotFound)
        })
        .await;
        assert!(failed.is_err());

        let retried = run_once(&store, "evt_1", "t", || async { Ok::<_, RepositoryError>(()) })
            .await
            .unwrap();
        assert_eq!(retried, Outcome::Processed(()));
    }

    #[tokio::test]
    async fn test_concurrent_claims_have_one_winner() {
        let store = Arc::new(memory_store());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.try_claim("evt_race", "t").await.unwrap()
            }));
        }

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
