//! Storefront banners.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use sagebrush_core::BannerId;

use super::RepositoryError;
use crate::models::{Banner, BannerInput};

#[derive(Debug, sqlx::FromRow)]
struct BannerRow {
    id: i32,
    title: String,
    subtitle: Option<String>,
    image_url: String,
    link_url: Option<String>,
    sort_order: i32,
    is_active: bool,
    starts_at: Option<DateTime<Utc>>,
    ends_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BannerRow> for Banner {
    fn from(row: BannerRow) -> Self {
        Self {
            id: BannerId::new(row.id),
            title: row.title,
            subtitle: row.subtitle,
            image_url: row.image_url,
            link_url: row.link_url,
            sort_order: row.sort_order,
            is_active: row.is_active,
            starts_at: row.starts_at,
            ends_at: row.ends_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const BANNER_COLUMNS: &str = "id, title, subtitle, image_url, link_url, sort_order, is_active, \
    starts_at, ends_at, created_at, updated_at";

/// Repository for banners.
pub struct BannerRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> BannerRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// All banners in display order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Banner>, RepositoryError> {
        let sql = format!("SELECT {BANNER_COLUMNS} FROM commerce.banner ORDER BY sort_order, id");
        let rows = sqlx::query_as::<_, BannerRow>(&sql)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Banners that are active and inside their schedule at `now`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_live(&self, now: DateTime<Utc>) -> Result<Vec<Banner>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {BANNER_COLUMNS}
            FROM commerce.banner
            WHERE is_active
              AND (starts_at IS NULL OR starts_at <= $1)
              AND (ends_at IS NULL OR $1 < ends_at)
            ORDER BY sort_order, id
            "
        );
        let rows = sqlx::query_as::<_, BannerRow>(&sql)
            .bind(now)
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: BannerId) -> Result<Option<Banner>, RepositoryError> {
        let sql = format!("SELECT {BANNER_COLUMNS} FROM commerce.banner WHERE id = $1");
        let row = sqlx::query_as::<_, BannerRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a constraint violation.
    pub async fn create(&self, input: &BannerInput) -> Result<Banner, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO commerce.banner
                (title, subtitle, image_url, link_url, sort_order, is_active, starts_at, ends_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {BANNER_COLUMNS}
            "
        );
        let row = bind_input(sqlx::query_as::<_, BannerRow>(&sql), input)
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "banner"))?;
        Ok(row.into())
    }

    /// Replace every editable field.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown banner.
    pub async fn update(&self, id: BannerId, input: &BannerInput) -> Result<Banner, RepositoryError> {
        let sql = format!(
            r"
            UPDATE commerce.banner
            SET title = $1, subtitle = $2, image_url = $3, link_url = $4, sort_order = $5,
                is_active = $6, starts_at = $7, ends_at = $8, updated_at = NOW()
            WHERE id = $9
            RETURNING {BANNER_COLUMNS}
            "
        );
        let row = bind_input(sqlx::query_as::<_, BannerRow>(&sql), input)
            .bind(id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "banner"))?
            .ok_or(RepositoryError::NotFound)?;
        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown banner.
    pub async fn delete(&self, id: BannerId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM commerce.banner WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

type BannerQuery<'q> =
    sqlx::query::QueryAs<'q, sqlx::Postgres, BannerRow, sqlx::postgres::PgArguments>;

fn bind_input<'q>(query: BannerQuery<'q>, input: &'q BannerInput) -> BannerQuery<'q> {
    query
        .bind(&input.title)
        .bind(input.subtitle.as_deref())
        .bind(&input.image_url)
        .bind(input.link_url.as_deref())
        .bind(input.sort_order)
        .bind(input.is_active)
        .bind(input.starts_at)
        .bind(input.ends_at)
}
