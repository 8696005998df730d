//! Tier evaluation and the points ledger.
//!
//! Every balance change goes through one transaction that locks the
//! membership row, computes the new balance with [`PointsBalance::apply`],
//! appends the ledger row and stores the balance. Concurrent redemptions
//! therefore serialize on the row lock and can never overdraw.

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use tracing::instrument;

use sagebrush_core::loyalty::{
    LoyaltyError, PointsBalance, TierRule, evaluate_tier, points_for_order, redemption_discount,
    revocation_for_refund, window_start,
};
use sagebrush_core::{Cents, CustomerId, OrderId, PointsKind};

use super::ServiceError;
use crate::config::LoyaltyConfig;
use crate::db::loyalty::{LedgerEntry, append_entry_tx, earned_for_order_tx, lock_balance_tx, revoked_for_order_tx};
use crate::db::{CustomerRepository, LoyaltyRepository, RepositoryError, TierRepository, orders};
use crate::models::{
    AdjustPointsInput, MembershipEvaluation, OrderDetail, PointsTransaction, RedeemResult, Tier,
};

/// Totals from a bulk re-evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct EvaluationSummary {
    pub evaluated: usize,
    pub changed: usize,
    pub failed: usize,
}

/// Membership and points operations.
pub struct LoyaltyService<'a> {
    pool: &'a PgPool,
    config: &'a LoyaltyConfig,
}

impl<'a> LoyaltyService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, config: &'a LoyaltyConfig) -> Self {
        Self { pool, config }
    }

    async fn ensure_customer(&self, customer_id: CustomerId) -> Result<(), ServiceError> {
        CustomerRepository::new(self.pool)
            .get(customer_id)
            .await?
            .map(|_| ())
            .ok_or(ServiceError::NotFound("customer"))
    }

    /// Recompute a customer's tier from their paid orders in the window.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown customer.
    #[instrument(skip(self))]
    pub async fn evaluate_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<MembershipEvaluation, ServiceError> {
        self.ensure_customer(customer_id).await?;

        let now = Utc::now();
        let since = window_start(now, self.config.window_months);
        let repo = LoyaltyRepository::new(self.pool);
        let activity = repo.activity_since(customer_id, since).await?;

        let tiers = TierRepository::new(self.pool).list_active().await?;
        let rules: Vec<TierRule> = tiers.iter().map(Tier::rule).collect();
        let tier_id = evaluate_tier(&rules, activity).map(|rule| rule.id);

        let previous_tier_id = repo.assign_tier(customer_id, tier_id, now).await?;

        let evaluation = MembershipEvaluation {
            customer_id,
            activity,
            previous_tier_id,
            tier_id,
        };
        if evaluation.changed() {
            tracing::info!(
                %customer_id,
                previous = ?previous_tier_id,
                tier = ?tier_id,
                orders = activity.order_count,
                spend = activity.spend.get(),
                "Membership tier changed"
            );
        }
        Ok(evaluation)
    }

    /// Re-evaluate every customer, continuing past individual failures.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError` only if the customer list cannot be loaded.
    #[instrument(skip(self))]
    pub async fn evaluate_all(&self) -> Result<EvaluationSummary, ServiceError> {
        let ids = CustomerRepository::new(self.pool).all_ids().await?;
        let mut summary = EvaluationSummary::default();

        for customer_id in ids {
            match self.evaluate_customer(customer_id).await {
                Ok(evaluation) => {
                    summary.evaluated += 1;
                    if evaluation.changed() {
                        summary.changed += 1;
                    }
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(%customer_id, error = %e, "Tier evaluation failed");
                }
            }
        }

        tracing::info!(
            evaluated = summary.evaluated,
            changed = summary.changed,
            failed = summary.failed,
            "Tier evaluation finished"
        );
        Ok(summary)
    }

    /// Credit points for a paid order at the customer's tier multiplier.
    ///
    /// Guest orders, unpaid orders and orders that already earned points
    /// are skipped and return `None`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for an unknown order.
    #[instrument(skip(self))]
    pub async fn award_order_points(
        &self,
        order_id: OrderId,
    ) -> Result<Option<PointsTransaction>, ServiceError> {
        let mut tx = self.pool.begin().await?;

        let order = orders::fetch_detail(&mut *tx, order_id, true)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;
        let Some(customer_id) = order.order.customer_id else {
            return Ok(None);
        };
        if !order.extension.payment_status.is_captured() {
            return Ok(None);
        }
        if earned_for_order_tx(&mut *tx, order_id).await?.is_some() {
            tracing::debug!(%order_id, "Order already earned points");
            return Ok(None);
        }

        let multiplier = LoyaltyRepository::new(self.pool)
            .membership(customer_id)
            .await?
            .tier
            .map_or(Decimal::ONE, |tier| tier.points_multiplier);
        let points = points_for_order(order.order.total_cents, multiplier);
        if points == 0 {
            return Ok(None);
        }

        let balance = lock_balance_tx(&mut *tx, customer_id).await?;
        let entry = LedgerEntry {
            customer_id,
            kind: PointsKind::Earn,
            amount: points,
            balance_after: balance.apply(points)?,
            order_id: Some(order_id),
            note: None,
        };
        let row = match append_entry_tx(&mut *tx, &entry).await {
            Ok(row) => row,
            // another delivery credited this order first
            Err(RepositoryError::Conflict(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        tracing::info!(%customer_id, %order_id, points, "Points earned");
        Ok(Some(row))
    }

    /// Spend points for a discount.
    ///
    /// # Errors
    ///
    /// Returns `LoyaltyError::NonPositiveAmount` for `points <= 0` and
    /// `LoyaltyError::InsufficientBalance` when the balance is too low.
    #[instrument(skip(self))]
    pub async fn redeem(
        &self,
        customer_id: CustomerId,
        points: i64,
    ) -> Result<RedeemResult, ServiceError> {
        let discount = redemption_discount(points, self.config.cents_per_point)?;
        self.ensure_customer(customer_id).await?;

        let mut tx = self.pool.begin().await?;
        let balance = lock_balance_tx(&mut *tx, customer_id).await?;
        let balance_after = balance.apply(-points)?;
        let note = format!("Redeemed for {discount} discount");
        append_entry_tx(
            &mut *tx,
            &LedgerEntry {
                customer_id,
                kind: PointsKind::Redeem,
                amount: -points,
                balance_after,
                order_id: None,
                note: Some(&note),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(%customer_id, points, discount = discount.get(), "Points redeemed");
        Ok(RedeemResult {
            points_redeemed: points,
            discount_cents: discount,
            points_balance: balance_after.get(),
        })
    }

    /// Manual correction by an admin.
    ///
    /// # Errors
    ///
    /// Returns `LoyaltyError::InsufficientBalance` if a debit would leave the
    /// balance negative.
    #[instrument(skip(self, input), fields(amount = input.amount))]
    pub async fn adjust(
        &self,
        customer_id: CustomerId,
        input: AdjustPointsInput,
    ) -> Result<PointsTransaction, ServiceError> {
        let input = input.validate()?;
        self.ensure_customer(customer_id).await?;

        let mut tx = self.pool.begin().await?;
        let balance = lock_balance_tx(&mut *tx, customer_id).await?;
        let row = append_entry_tx(
            &mut *tx,
            &LedgerEntry {
                customer_id,
                kind: PointsKind::Adjust,
                amount: input.amount,
                balance_after: balance.apply(input.amount)?,
                order_id: None,
                note: Some(&input.note),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(%customer_id, amount = input.amount, "Points adjusted");
        Ok(row)
    }
}

/// Take back points earned by `order` once `refunded_total` of it has been
/// refunded, inside the caller's transaction.
///
/// Revocations are cumulative per order: the order's revoked total tracks
/// the refunded share of what it earned. Each debit is clamped to the
/// balance so the ledger never goes negative.
pub(crate) async fn revoke_for_refund_tx(
    conn: &mut PgConnection,
    order: &OrderDetail,
    refunded_total: Cents,
) -> Result<Option<PointsTransaction>, ServiceError> {
    let Some(customer_id) = order.order.customer_id else {
        return Ok(None);
    };
    let order_id = order.order.id;
    let Some(earned) = earned_for_order_tx(&mut *conn, order_id).await? else {
        return Ok(None);
    };

    let already = revoked_for_order_tx(&mut *conn, order_id).await?;
    let wanted = pending_revocation(earned, already, order.order.total_cents, refunded_total);
    if wanted == 0 {
        return Ok(None);
    }

    let balance = lock_balance_tx(&mut *conn, customer_id).await?;
    let (amount, balance_after) = clamped_debit(balance, wanted)?;
    if amount == 0 {
        tracing::warn!(%customer_id, %order_id, wanted, "No points left to revoke");
        return Ok(None);
    }
    if amount < wanted {
        tracing::warn!(%customer_id, %order_id, wanted, amount, "Revocation clamped to balance");
    }

    let note = format!("Refund of {refunded_total} on order {order_id}");
    let row = append_entry_tx(
        &mut *conn,
        &LedgerEntry {
            customer_id,
            kind: PointsKind::Revoke,
            amount: -amount,
            balance_after,
            order_id: Some(order_id),
            note: Some(&note),
        },
    )
    .await?;

    tracing::info!(%customer_id, %order_id, points = amount, "Points revoked");
    Ok(Some(row))
}

/// Points still to revoke for an order, before clamping to the balance.
#[must_use]
pub fn pending_revocation(earned: i64, already_revoked: i64, order_total: Cents, refunded_total: Cents) -> i64 {
    revocation_for_refund(earned, order_total, refunded_total)
        .saturating_sub(already_revoked)
        .max(0)
}

/// Balance after debiting as much of `wanted` as it can cover.
///
/// # Errors
///
/// Returns `LoyaltyError::Overflow` only on arithmetic overflow.
pub fn clamped_debit(balance: PointsBalance, wanted: i64) -> Result<(i64, PointsBalance), LoyaltyError> {
    let amount = balance.clamp_debit(wanted);
    Ok((amount, balance.apply(-amount)?))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_refunds_revoke_cumulatively() {
        let total = Cents::new(10_000);
        let earned = 20_000;

        // first refund of a quarter
        let first = pending_revocation(earned, 0, total, Cents::new(2_500));
        assert_eq!(first, 5_000);

        // second refund brings the total to half
        let second = pending_revocation(earned, first, total, Cents::new(5_000));
        assert_eq!(second, 5_000);

        // a replayed refund notification changes nothing
        assert_eq!(pending_revocation(earned, first + second, total, Cents::new(5_000)), 0);

        // full refund takes back exactly what was earned
        let rest = pending_revocation(earned, first + second, total, Cents::new(10_000));
        assert_eq!(first + second + rest, earned);
    }

    #[test]
    fn test_clamped_debit_never_goes_negative() {
        let (amount, after) = clamped_debit(PointsBalance::new(300), 5_000).unwrap();
        assert_eq!(amount, 300);
        assert_eq!(after, PointsBalance::new(0));

        let (amount, after) = clamped_debit(PointsBalance::new(300), 100).unwrap();
        assert_eq!(amount, 100);
        assert_eq!(after, PointsBalance::new(200));
    }
}
