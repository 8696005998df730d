//! Orders and order extensions.
//!
//! An order and its extension are always written in the same transaction,
//! and every status change is a conditional `UPDATE` on the status the
//! caller observed, so concurrent writers cannot skip a transition.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use sagebrush_core::{
    Cents, CustomerId, Email, FulfillmentStatus, OrderExtensionId, OrderId, PaymentStatus,
};

use super::{Page, RepositoryError};
use crate::models::{
    CreateOrderInput, Order, OrderDetail, OrderExtension, OrderFilter, UpdateTrackingInput,
};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct OrderDetailRow {
    id: i32,
    customer_id: Option<i32>,
    email: String,
    total_cents: i64,
    currency_code: String,
    created_at: DateTime<Utc>,
    extension_id: i32,
    payment_status: PaymentStatus,
    fulfillment_status: FulfillmentStatus,
    payment_reference: Option<String>,
    refunded_cents: i64,
    courier: Option<String>,
    tracking_number: Option<String>,
    tracking_url: Option<String>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderDetailRow> for OrderDetail {
    type Error = RepositoryError;

    fn try_from(row: OrderDetailRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;
        let currency_code = row
            .currency_code
            .parse()
            .map_err(RepositoryError::DataCorruption)?;
        let order_id = OrderId::new(row.id);

        Ok(Self {
            order: Order {
                id: order_id,
                customer_id: row.customer_id.map(CustomerId::new),
                email,
                total_cents: Cents::new(row.total_cents),
                currency_code,
                created_at: row.created_at,
            },
            extension: OrderExtension {
                id: OrderExtensionId::new(row.extension_id),
                order_id,
                payment_status: row.payment_status,
                fulfillment_status: row.fulfillment_status,
                payment_reference: row.payment_reference,
                refunded_cents: Cents::new(row.refunded_cents),
                courier: row.courier,
                tracking_number: row.tracking_number,
                tracking_url: row.tracking_url,
                shipped_at: row.shipped_at,
                delivered_at: row.delivered_at,
                updated_at: row.updated_at,
            },
        })
    }
}

const DETAIL_SELECT: &str = r#"
    SELECT o.id, o.customer_id, o.email, o.total_cents, o.currency_code, o.created_at,
           e.id AS extension_id, e.payment_status, e.fulfillment_status,
           e.payment_reference, e.refunded_cents, e.courier, e.tracking_number,
           e.tracking_url, e.shipped_at, e.delivered_at, e.updated_at
    FROM commerce."order" o
    JOIN commerce.order_extension e ON e.order_id = o.id
"#;

/// Load one order with its extension on an existing connection.
///
/// Pass `for_update` inside a transaction to lock the extension row.
pub(crate) async fn fetch_detail(
    conn: &mut PgConnection,
    id: OrderId,
    for_update: bool,
) -> Result<Option<OrderDetail>, RepositoryError> {
    let lock = if for_update { "FOR UPDATE OF e" } else { "" };
    let sql = format!("{DETAIL_SELECT} WHERE o.id = $1 {lock}");
    let row = sqlx::query_as::<_, OrderDetailRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?;

    row.map(TryInto::try_into).transpose()
}

/// Record a refund total and the payment status it implies.
pub(crate) async fn set_refunded(
    conn: &mut PgConnection,
    id: OrderId,
    refunded: Cents,
    status: PaymentStatus,
) -> Result<(), RepositoryError> {
    let result = sqlx::query(
        r"
        UPDATE commerce.order_extension
        SET refunded_cents = $2, payment_status = $3, updated_at = NOW()
        WHERE order_id = $1
        ",
    )
    .bind(id)
    .bind(refunded)
    .bind(status)
    .execute(conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "refund"))?;

    if result.rows_affected() == 0 {
        return Err(RepositoryError::NotFound);
    }
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for orders and their extensions.
pub struct OrderRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OrderRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert an order and its extension atomically.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the customer does not exist.
    pub async fn create(&self, input: &CreateOrderInput) -> Result<OrderDetail, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let order_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO commerce."order" (customer_id, email, total_cents, currency_code)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(input.customer_id)
        .bind(input.email.as_str())
        .bind(input.total_cents)
        .bind(input.currency_code.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "order"))?;

        sqlx::query(
            r"
            INSERT INTO commerce.order_extension (order_id, payment_reference)
            VALUES ($1, $2)
            ",
        )
        .bind(order_id)
        .bind(input.payment_reference.as_deref())
        .execute(&mut *tx)
        .await?;

        let detail = fetch_detail(&mut *tx, OrderId::new(order_id), false)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;

        Ok(detail)
    }

    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: OrderId) -> Result<Option<OrderDetail>, RepositoryError> {
        let mut conn = self.pool.acquire().await?;
        fetch_detail(&mut conn, id, false).await
    }

    /// Newest first, filtered by status and customer.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, filter: &OrderFilter) -> Result<Vec<OrderDetail>, RepositoryError> {
        let page = Page {
            limit: filter.limit,
            offset: filter.offset,
        };
        let sql = format!(
            r"{DETAIL_SELECT}
            WHERE ($1::commerce.payment_status IS NULL OR e.payment_status = $1)
              AND ($2::commerce.fulfillment_status IS NULL OR e.fulfillment_status = $2)
              AND ($3::INTEGER IS NULL OR o.customer_id = $3)
            ORDER BY o.id DESC
            LIMIT $4 OFFSET $5
            "
        );
        let rows = sqlx::query_as::<_, OrderDetailRow>(&sql)
            .bind(filter.payment_status)
            .bind(filter.fulfillment_status)
            .bind(filter.customer_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Look an order up by the payment provider's reference.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<OrderDetail>, RepositoryError> {
        let sql = format!("{DETAIL_SELECT} WHERE e.payment_reference = $1 ORDER BY o.id DESC LIMIT 1");
        let row = sqlx::query_as::<_, OrderDetailRow>(&sql)
            .bind(reference)
            .fetch_optional(self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Move fulfillment from `expected` to `next`, stamping shipment dates.
    ///
    /// Returns `false` when the row was no longer in `expected`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transition_fulfillment(
        &self,
        id: OrderId,
        expected: FulfillmentStatus,
        next: FulfillmentStatus,
        tracking: &UpdateTrackingInput,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE commerce.order_extension
            SET fulfillment_status = $3,
                courier = COALESCE($4, courier),
                tracking_number = COALESCE($5, tracking_number),
                tracking_url = COALESCE($6, tracking_url),
                shipped_at = CASE WHEN $3 = 'shipped' THEN NOW() ELSE shipped_at END,
                delivered_at = CASE WHEN $3 = 'delivered' THEN NOW() ELSE delivered_at END,
                updated_at = NOW()
            WHERE order_id = $1 AND fulfillment_status = $2
            ",
        )
        .bind(id)
        .bind(expected)
        .bind(next)
        .bind(tracking.courier.as_deref())
        .bind(tracking.tracking_number.as_deref())
        .bind(tracking.tracking_url.as_deref())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Overwrite courier details without touching the status.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` for an unknown order.
    pub async fn update_tracking(
        &self,
        id: OrderId,
        tracking: &UpdateTrackingInput,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE commerce.order_extension
            SET courier = $2, tracking_number = $3, tracking_url = $4, updated_at = NOW()
            WHERE order_id = $1
            ",
        )
        .bind(id)
        .bind(tracking.courier.as_deref())
        .bind(tracking.tracking_number.as_deref())
        .bind(tracking.tracking_url.as_deref())
        .execute(self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    /// Mark an order paid, keeping any refund state already recorded.
    ///
    /// Returns `true` when the status changed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_paid(
        &self,
        id: OrderId,
        payment_reference: &str,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE commerce.order_extension
            SET payment_status = 'paid',
                payment_reference = COALESCE(payment_reference, $2),
                updated_at = NOW()
            WHERE order_id = $1 AND payment_status = 'awaiting'
            ",
        )
        .bind(id)
        .bind(payment_reference)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
