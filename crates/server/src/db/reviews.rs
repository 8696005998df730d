//! Product reviews.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;

use sagebrush_core::{CustomerId, Email, ProductId, ReviewId};

use super::{Page, RepositoryError};
use crate::models::{NewReview, Review, ReviewAuthor, ReviewFilter, ReviewSummary};

#[derive(Debug, sqlx::FromRow)]
struct ReviewRow {
    id: i32,
    product_id: i32,
    customer_id: Option<i32>,
    guest_email: Option<String>,
    is_guest_review: bool,
    author_name: String,
    rating: i16,
    title: Option<String>,
    body: String,
    images: Json<Vec<String>>,
    is_approved: bool,
    is_featured: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = RepositoryError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let guest_email = row
            .guest_email
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| RepositoryError::DataCorruption(format!("invalid guest email: {e}")))?;

        Ok(Self {
            id: ReviewId::new(row.id),
            product_id: ProductId::new(row.product_id),
            customer_id: row.customer_id.map(CustomerId::new),
            guest_email,
            is_guest_review: row.is_guest_review,
            author_name: row.author_name,
            rating: row.rating,
            title: row.title,
            body: row.body,
            images: row.images.0,
            is_approved: row.is_approved,
            is_featured: row.is_featured,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SummaryRow {
    review_count: i64,
    average_rating: Option<f64>,
}

const REVIEW_COLUMNS: &str = "id, product_id, customer_id, guest_email, is_guest_review, \
    author_name, rating, title, body, images, is_approved, is_featured, created_at";

/// Repository for product reviews.
pub struct ReviewRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReviewRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Store a submitted review; it starts unapproved.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the product or customer is unknown.
    pub async fn create(&self, review: &NewReview) -> Result<Review, RepositoryError> {
        let (customer_id, guest_email) = match &review.author {
            ReviewAuthor::Customer(id) => (Some(*id), None),
            ReviewAuthor::Guest(email) => (None, Some(email.as_str())),
        };
        let sql = format!(
            r"
            INSERT INTO commerce.review
                (product_id, customer_id, guest_email, is_guest_review,
                 author_name, rating, title, body, images)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {REVIEW_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(review.product_id)
            .bind(customer_id)
            .bind(guest_email)
            .bind(guest_email.is_some())
            .bind(&review.author_name)
            .bind(review.rating)
            .bind(review.title.as_deref())
            .bind(&review.body)
            .bind(Json(&review.images))
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "review"))?;

        row.try_into()
    }

    /// Approved reviews of a product, featured first then newest.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_visible(
        &self,
        product_id: ProductId,
        page: Page,
    ) -> Result<Vec<Review>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {REVIEW_COLUMNS}
            FROM commerce.review
            WHERE product_id = $1 AND is_approved
            ORDER BY is_featured DESC, created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(product_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Count and average rating of approved reviews.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn summary(&self, product_id: ProductId) -> Result<ReviewSummary, RepositoryError> {
        let row = sqlx::query_as::<_, SummaryRow>(
            r"
            SELECT COUNT(*) AS review_count,
                   ROUND(AVG(rating)::numeric, 2)::float8 AS average_rating
            FROM commerce.review
            WHERE product_id = $1 AND is_approved
            ",
        )
        .bind(product_id)
        .fetch_one(self.pool)
        .await?;

        Ok(ReviewSummary {
            review_count: row.review_count,
            average_rating: row.average_rating,
        })
    }

    /// Admin listing, optionally filtered by approval and product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &ReviewFilter) -> Result<Vec<Review>, RepositoryError> {
        let page = Page {
            limit: filter.limit,
            offset: filter.offset,
        };
        let sql = format!(
            r"
            SELECT {REVIEW_COLUMNS}
            FROM commerce.review
            WHERE ($1::BOOLEAN IS NULL OR is_approved = $1)
              AND ($2::INTEGER IS NULL OR product_id = $2)
            ORDER BY created_at DESC, id DESC
            LIMIT $3 OFFSET $4
            "
        );
        let rows = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(filter.approved)
            .bind(filter.product_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Set the approval flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown review.
    pub async fn set_approved(&self, id: ReviewId, approved: bool) -> Result<Review, RepositoryError> {
        self.update_flag("is_approved = $2", id, approved).await
    }

    /// Set the featured flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown review.
    pub async fn set_featured(&self, id: ReviewId, featured: bool) -> Result<Review, RepositoryError> {
        self.update_flag("is_featured = $2", id, featured).await
    }

    async fn update_flag(
        &self,
        assignment: &str,
        id: ReviewId,
        value: bool,
    ) -> Result<Review, RepositoryError> {
        let sql = format!(
            "UPDATE commerce.review SET {assignment} WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ReviewRow>(&sql)
            .bind(id)
            .bind(value)
            .fetch_optional(self.pool)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        row.try_into()
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown review.
    pub async fn delete(&self, id: ReviewId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM commerce.review WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}
