//! Return requests.

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use sagebrush_core::{Cents, CustomerId, OrderId, ReturnId, ReturnStatus};

use super::{Page, RepositoryError};
use crate::models::{ReturnFilter, ReturnItem, ReturnRequest};

#[derive(Debug, sqlx::FromRow)]
struct ReturnRow {
    id: i32,
    order_id: i32,
    customer_id: i32,
    status: ReturnStatus,
    reason: String,
    items: Json<Vec<ReturnItem>>,
    refund_cents: i64,
    admin_note: Option<String>,
    courier: Option<String>,
    tracking_number: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    resolved_at: Option<DateTime<Utc>>,
}

impl From<ReturnRow> for ReturnRequest {
    fn from(row: ReturnRow) -> Self {
        Self {
            id: ReturnId::new(row.id),
            order_id: OrderId::new(row.order_id),
            customer_id: CustomerId::new(row.customer_id),
            status: row.status,
            reason: row.reason,
            items: row.items.0,
            refund_cents: Cents::new(row.refund_cents),
            admin_note: row.admin_note,
            courier: row.courier,
            tracking_number: row.tracking_number,
            created_at: row.created_at,
            updated_at: row.updated_at,
            resolved_at: row.resolved_at,
        }
    }
}

const RETURN_COLUMNS: &str = "id, order_id, customer_id, status, reason, items, refund_cents, \
    admin_note, courier, tracking_number, created_at, updated_at, resolved_at";

/// Field changes that ride along with a status transition.
#[derive(Debug, Clone, Default)]
pub struct ReturnUpdate<'a> {
    pub admin_note: Option<&'a str>,
    pub courier: Option<&'a str>,
    pub tracking_number: Option<&'a str>,
    pub add_refund: Cents,
}

/// Move a return from `expected` to `next` on an existing connection.
///
/// Returns `None` when the row was not in `expected` any more.
pub(crate) async fn transition_tx(
    conn: &mut PgConnection,
    id: ReturnId,
    expected: ReturnStatus,
    next: ReturnStatus,
    update: &ReturnUpdate<'_>,
) -> Result<Option<ReturnRequest>, RepositoryError> {
    let sql = format!(
        r"
        UPDATE commerce.return_request
        SET status = $3,
            admin_note = COALESCE($4, admin_note),
            courier = COALESCE($5, courier),
            tracking_number = COALESCE($6, tracking_number),
            refund_cents = refund_cents + $7,
            resolved_at = CASE WHEN $8 THEN NOW() ELSE resolved_at END,
            updated_at = NOW()
        WHERE id = $1 AND status = $2
        RETURNING {RETURN_COLUMNS}
        "
    );
    let row = sqlx::query_as::<_, ReturnRow>(&sql)
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(update.admin_note)
        .bind(update.courier)
        .bind(update.tracking_number)
        .bind(update.add_refund)
        .bind(next.is_terminal())
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.map(Into::into))
}

/// Load a return and lock it for the rest of the transaction.
pub(crate) async fn lock_tx(
    conn: &mut PgConnection,
    id: ReturnId,
) -> Result<Option<ReturnRequest>, RepositoryError> {
    let sql = format!("SELECT {RETURN_COLUMNS} FROM commerce.return_request WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, ReturnRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Into::into))
}

/// Repository for return requests.
pub struct ReturnRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ReturnRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the order or customer is unknown.
    pub async fn create(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
        reason: &str,
        items: &[ReturnItem],
    ) -> Result<ReturnRequest, RepositoryError> {
        let sql = format!(
            r"
            INSERT INTO commerce.return_request (order_id, customer_id, reason, items)
            VALUES ($1, $2, $3, $4)
            RETURNING {RETURN_COLUMNS}
            "
        );
        let row = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(order_id)
            .bind(customer_id)
            .bind(reason)
            .bind(Json(items))
            .fetch_one(self.pool)
            .await
            .map_err(|e| RepositoryError::from_constraint(e, "return request"))?;
        Ok(row.into())
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ReturnId) -> Result<Option<ReturnRequest>, RepositoryError> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM commerce.return_request WHERE id = $1");
        let row = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    /// Whether the order already has a return that is still open.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn has_open_return(&self, order_id: OrderId) -> Result<bool, RepositoryError> {
        let open: bool = sqlx::query_scalar(
            r"
            SELECT EXISTS (
                SELECT 1 FROM commerce.return_request
                WHERE order_id = $1
                  AND status NOT IN ('rejected', 'completed', 'cancelled')
            )
            ",
        )
        .bind(order_id)
        .fetch_one(self.pool)
        .await?;
        Ok(open)
    }

    /// A customer's returns, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_customer(
        &self,
        customer_id: CustomerId,
        page: Page,
    ) -> Result<Vec<ReturnRequest>, RepositoryError> {
        let sql = format!(
            r"
            SELECT {RETURN_COLUMNS}
            FROM commerce.return_request
            WHERE customer_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            "
        );
        let rows = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(customer_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Admin queue, oldest first so requests are handled in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &ReturnFilter) -> Result<Vec<ReturnRequest>, RepositoryError> {
        let page = Page {
            limit: filter.limit,
            offset: filter.offset,
        };
        let sql = format!(
            r"
            SELECT {RETURN_COLUMNS}
            FROM commerce.return_request
            WHERE ($1::commerce.return_status IS NULL OR status = $1)
            ORDER BY created_at, id
            LIMIT $2 OFFSET $3
            "
        );
        let rows = sqlx::query_as::<_, ReturnRow>(&sql)
            .bind(filter.status)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Conditional status change outside an explicit transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition(
        &self,
        id: ReturnId,
        expected: ReturnStatus,
        next: ReturnStatus,
        update: &ReturnUpdate<'_>,
    ) -> Result<Option<ReturnRequest>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        transition_tx(&mut conn, id, expected, next, update).await
    }
}
