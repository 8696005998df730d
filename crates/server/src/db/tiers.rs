//! Membership tiers.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use sagebrush_core::{Cents, TierId};

use super::RepositoryError;
use crate::models::{Tier, TierInput};

#[derive(Debug, sqlx::FromRow)]
struct TierRow {
    id: i32,
    name: String,
    rank: i32,
    order_threshold: i64,
    spend_threshold_cents: i64,
    points_multiplier: Decimal,
    discount_percent: Decimal,
    is_default: bool,
    is_active: bool,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TierRow> for Tier {
    fn from(row: TierRow) -> Self {
        Self {
            id: TierId::new(row.id),
            name: row.name,
            rank: row.rank,
            order_threshold: row.order_threshold,
            spend_threshold_cents: Cents::new(row.spend_threshold_cents),
            points_multiplier: row.points_multiplier,
            discount_percent: row.discount_percent,
            is_default: row.is_default,
            is_active: row.is_active,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const TIER_COLUMNS: &str = "id, name, rank, order_threshold, spend_threshold_cents, \
    points_multiplier, discount_percent, is_default, is_active, description, created_at, updated_at";

type TierQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, TierRow, sqlx::postgres::PgArguments>;

fn bind_input<'q>(query: TierQuery<'q>, input: &'q TierInput) -> TierQuery<'q> {
    query
        .bind(&input.name)
        .bind(input.rank)
        .bind(input.order_threshold)
        .bind(input.spend_threshold_cents)
        .bind(input.points_multiplier)
        .bind(input.discount_percent)
        .bind(input.is_default)
        .bind(input.is_active)
        .bind(input.description.as_deref())
}

/// Repository for tiers.
pub struct TierRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> TierRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All tiers, lowest rank first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Tier>, RepositoryError> {
        let sql = format!("SELECT {TIER_COLUMNS} FROM commerce.tier ORDER BY rank, id");
        let rows = sqlx::query_as::<_, TierRow>(&sql).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Active tiers, lowest rank first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_active(&self) -> Result<Vec<Tier>, RepositoryError> {
        let sql = format!("SELECT {TIER_COLUMNS} FROM commerce.tier WHERE is_active ORDER BY rank, id");
        let rows = sqlx::query_as::<_, TierRow>(&sql).fetch_all(self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: TierId) -> Result<Option<Tier>, RepositoryError> {
        let sql = format!("SELECT {TIER_COLUMNS} FROM commerce.tier WHERE id = $1");
        let row = sqlx::query_as::<_, TierRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` for a duplicate name or rank, or a
    /// second default tier.
    pub async fn create(&self, input: &TierInput) -> Result<Tier, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO commerce.tier
                (name, rank, order_threshold, spend_threshold_cents, points_multiplier,
                 discount_percent, is_default, is_active, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {TIER_COLUMNS}
            "
        );
        let row = bind_input(sqlx::query_as::<_, TierRow>(&sql), input)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "tier name, rank or default"))?;
        Ok(row.into())
    }

    /// Replace every editable field.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown tier and
    /// `RepositoryError::Conflict` on a uniqueness violation.
    pub async fn update(&self, id: TierId, input: &TierInput) -> Result<Tier, RepositoryError> {
        let sql = format!(
            r"
            UPDATE commerce.tier
            SET name = $1, rank = $2, order_threshold = $3, spend_threshold_cents = $4,
                points_multiplier = $5, discount_percent = $6, is_default = $7,
                is_active = $8, description = $9, updated_at = NOW()
            WHERE id = $10
            RETURNING {TIER_COLUMNS}
            "
        );
        let row = bind_input(sqlx::query_as::<_, TierRow>(&sql), input)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "tier name, rank or default"))?
            .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    /// Insert or update a tier keyed by name, for YAML seeding.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a uniqueness violation.
    pub async fn upsert_by_name(&self, input: &TierInput) -> Result<Tier, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO commerce.tier
                (name, rank, order_threshold, spend_threshold_cents, points_multiplier,
                 discount_percent, is_default, is_active, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (name) DO UPDATE
            SET rank = EXCLUDED.rank,
                order_threshold = EXCLUDED.order_threshold,
                spend_threshold_cents = EXCLUDED.spend_threshold_cents,
                points_multiplier = EXCLUDED.points_multiplier,
                discount_percent = EXCLUDED.discount_percent,
                is_default = EXCLUDED.is_default,
                is_active = EXCLUDED.is_active,
                description = EXCLUDED.description,
                updated_at = NOW()
            RETURNING {TIER_COLUMNS}
            "
        );
        let row = bind_input(sqlx::query_as::<_, TierRow>(&sql), input)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "tier rank or default"))?;
        Ok(row.into())
    }

    /// Delete a tier; members fall back to no tier until re-evaluated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown tier.
    pub async fn delete(&self, id: TierId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM commerce.tier WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
