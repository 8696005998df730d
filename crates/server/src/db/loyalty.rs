//! Membership rows and the points ledger.
//!
//! Balance changes go through the `*_tx` functions so the caller can hold the
//! membership row lock (`SELECT ... FOR UPDATE`) while it computes the new
//! balance and appends the ledger row.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use sagebrush_core::loyalty::{CustomerActivity, PointsBalance};
use sagebrush_core::{
    Cents, CustomerId, OrderId, PointsKind, PointsTransactionId, TierId,
};

use super::{Page, RepositoryError};
use crate::models::{Membership, PointsTransaction, TierSummary};

// =============================================================================
// Internal Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MembershipRow {
    customer_id: i32,
    points_balance: i64,
    evaluated_at: Option<DateTime<Utc>>,
    tier_id: Option<i32>,
    tier_name: Option<String>,
    tier_rank: Option<i32>,
    tier_points_multiplier: Option<Decimal>,
    tier_discount_percent: Option<Decimal>,
}

impl From<MembershipRow> for Membership {
    fn from(row: MembershipRow) -> Self {
        let tier = match (
            row.tier_id,
            row.tier_name,
            row.tier_rank,
            row.tier_points_multiplier,
            row.tier_discount_percent,
        ) {
            (Some(id), Some(name), Some(rank), Some(points_multiplier), Some(discount_percent)) => {
                Some(TierSummary {
                    id: TierId::new(id),
                    name,
                    rank,
                    points_multiplier,
                    discount_percent,
                })
            }
            _ => None,
        };

        Self {
            customer_id: CustomerId::new(row.customer_id),
            tier,
            points_balance: row.points_balance,
            evaluated_at: row.evaluated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PointsTransactionRow {
    id: i32,
    customer_id: i32,
    kind: PointsKind,
    amount: i64,
    balance_after: i64,
    order_id: Option<i32>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<PointsTransactionRow> for PointsTransaction {
    fn from(row: PointsTransactionRow) -> Self {
        Self {
            id: PointsTransactionId::new(row.id),
            customer_id: CustomerId::new(row.customer_id),
            kind: row.kind,
            amount: row.amount,
            balance_after: row.balance_after,
            order_id: row.order_id.map(OrderId::new),
            note: row.note,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ActivityRow {
    order_count: i64,
    spend_cents: i64,
}

/// A ledger row about to be written.
#[derive(Debug, Clone)]
pub struct LedgerEntry<'a> {
    pub customer_id: CustomerId,
    pub kind: PointsKind,
    pub amount: i64,
    pub balance_after: PointsBalance,
    pub order_id: Option<OrderId>,
    pub note: Option<&'a str>,
}

// =============================================================================
// Transaction-scoped operations
// =============================================================================

/// Ensure the membership row exists, lock it and return the balance.
pub(crate) async fn lock_balance_tx(
    conn: &mut PgConnection,
    customer_id: CustomerId,
) -> Result<PointsBalance, RepositoryError> {
    sqlx::query(
        r"
        INSERT INTO commerce.customer_membership (customer_id)
        VALUES ($1)
        ON CONFLICT (customer_id) DO NOTHING
        ",
    )
    .bind(customer_id)
    .execute(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "membership"))?;

    let balance: i64 = sqlx::query_scalar(
        r"
        SELECT points_balance
        FROM commerce.customer_membership
        WHERE customer_id = $1
        FOR UPDATE
        ",
    )
    .bind(customer_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(PointsBalance::new(balance))
}

/// Append a ledger row and store its resulting balance.
pub(crate) async fn append_entry_tx(
    conn: &mut PgConnection,
    entry: &LedgerEntry<'_>,
) -> Result<PointsTransaction, RepositoryError> {
    let row = sqlx::query_as::<_, PointsTransactionRow>(
        r"
        INSERT INTO commerce.points_transaction
            (customer_id, kind, amount, balance_after, order_id, note)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, customer_id, kind, amount, balance_after, order_id, note, created_at
        ",
    )
    .bind(entry.customer_id)
    .bind(entry.kind)
    .bind(entry.amount)
    .bind(entry.balance_after.get())
    .bind(entry.order_id)
    .bind(entry.note)
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| RepositoryError::from_constraint(e, "points transaction"))?;

    sqlx::query(
        r"
        UPDATE commerce.customer_membership
        SET points_balance = $2, updated_at = NOW()
        WHERE customer_id = $1
        ",
    )
    .bind(entry.customer_id)
    .bind(entry.balance_after.get())
    .execute(&mut *conn)
    .await?;

    Ok(row.into())
}

/// Points credited for an order, if any.
pub(crate) async fn earned_for_order_tx(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<Option<i64>, RepositoryError> {
    let earned: Option<i64> = sqlx::query_scalar(
        r"
        SELECT amount FROM commerce.points_transaction
        WHERE order_id = $1 AND kind = 'earn'
        ",
    )
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(earned)
}

/// Points already taken back for an order, as a positive number.
pub(crate) async fn revoked_for_order_tx(
    conn: &mut PgConnection,
    order_id: OrderId,
) -> Result<i64, RepositoryError> {
    let revoked: i64 = sqlx::query_scalar(
        r"
        SELECT COALESCE(-SUM(amount), 0)::BIGINT FROM commerce.points_transaction
        WHERE order_id = $1 AND kind = 'revoke'
        ",
    )
    .bind(order_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(revoked)
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for memberships and the points ledger.
pub struct LoyaltyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LoyaltyRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Paid orders and net spend of a customer since `since`.
    ///
    /// Orders count while paid or partially refunded; spend is net of refunds.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn activity_since(
        &self,
        customer_id: CustomerId,
        since: DateTime<Utc>,
    ) -> Result<CustomerActivity, RepositoryError> {
        let row = sqlx::query_as::<_, ActivityRow>(
            r#"
            SELECT COUNT(*) AS order_count,
                   COALESCE(SUM(o.total_cents - e.refunded_cents), 0)::BIGINT AS spend_cents
            FROM commerce."order" o
            JOIN commerce.order_extension e ON e.order_id = o.id
            WHERE o.customer_id = $1
              AND o.created_at >= $2
              AND e.payment_status IN ('paid', 'partially_refunded')
            "#,
        )
        .bind(customer_id)
        .bind(since)
        .fetch_one(self.pool)
        .await?;

        Ok(CustomerActivity {
            order_count: row.order_count,
            spend: Cents::new(row.spend_cents.max(0)),
        })
    }

    /// Membership with its tier; a zero balance with no tier when the
    /// customer has never been evaluated.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn membership(&self, customer_id: CustomerId) -> Result<Membership, RepositoryError> {
        let row = sqlx::query_as::<_, MembershipRow>(
            r"
            SELECT m.customer_id, m.points_balance, m.evaluated_at,
                   t.id AS tier_id, t.name AS tier_name, t.rank AS tier_rank,
                   t.points_multiplier AS tier_points_multiplier,
                   t.discount_percent AS tier_discount_percent
            FROM commerce.customer_membership m
            LEFT JOIN commerce.tier t ON t.id = m.tier_id
            WHERE m.customer_id = $1
            ",
        )
        .bind(customer_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map_or(
            Membership {
                customer_id,
                tier: None,
                points_balance: 0,
                evaluated_at: None,
            },
            Into::into,
        ))
    }

    /// Record the evaluated tier and return the one it replaced.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the customer does not exist.
    pub async fn assign_tier(
        &self,
        customer_id: CustomerId,
        tier_id: Option<TierId>,
        evaluated_at: DateTime<Utc>,
    ) -> Result<Option<TierId>, RepositoryError> {
        let previous: Option<i32> = sqlx::query_scalar(
            r"
            WITH previous AS (
                SELECT tier_id FROM commerce.customer_membership WHERE customer_id = $1
            )
            INSERT INTO commerce.customer_membership (customer_id, tier_id, evaluated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (customer_id) DO UPDATE
            SET tier_id = EXCLUDED.tier_id,
                evaluated_at = EXCLUDED.evaluated_at,
                updated_at = NOW()
            RETURNING (SELECT tier_id FROM previous)
            ",
        )
        .bind(customer_id)
        .bind(tier_id)
        .bind(evaluated_at)
        .fetch_one(self.pool)
        .await
        .map_err(|e| RepositoryError::from_constraint(e, "membership"))?;

        Ok(previous.map(TierId::new))
    }

    /// Newest ledger rows first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn transactions(
        &self,
        customer_id: CustomerId,
        page: Page,
    ) -> Result<Vec<PointsTransaction>, RepositoryError> {
        let rows = sqlx::query_as::<_, PointsTransactionRow>(
            r"
            SELECT id, customer_id, kind, amount, balance_after, order_id, note, created_at
            FROM commerce.points_transaction
            WHERE customer_id = $1
            ORDER BY id DESC
            LIMIT $2 OFFSET $3
            ",
        )
        .bind(customer_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}
