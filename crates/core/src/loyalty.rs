//! Membership tiers and loyalty points.
//!
//! A customer's tier is decided by two numbers gathered over a rolling
//! window: how many paid orders they placed and how much they spent. A tier
//! is earned only when *both* thresholds are met. Among qualifying tiers the
//! highest rank wins; when nothing qualifies the default tier is the floor.
//!
//! Points are earned as `order_total * multiplier` of the customer's tier and
//! redeemed at a fixed cents-per-point rate. The balance never goes negative:
//! every ledger row is produced through [`PointsBalance::apply`].

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Cents, TierId};

/// Errors raised by points arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoyaltyError {
    /// The balance cannot cover the debit.
    #[error("insufficient points: {available} available, {requested} requested")]
    InsufficientBalance {
        /// Points currently held.
        available: i64,
        /// Points the operation needs.
        requested: i64,
    },

    /// Amount must be strictly positive.
    #[error("points amount must be positive")]
    NonPositiveAmount,

    /// Arithmetic left the `i64` range.
    #[error("points amount out of range")]
    Overflow,
}

/// The parts of a tier that take part in qualification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    /// Tier primary key.
    pub id: TierId,
    /// Higher rank beats lower rank.
    pub rank: i32,
    /// Minimum number of paid orders in the window.
    pub order_threshold: i64,
    /// Minimum spend in the window.
    pub spend_threshold: Cents,
    /// Points earned per cent spent.
    pub points_multiplier: Decimal,
    /// Floor tier for customers who qualify for nothing else.
    pub is_default: bool,
    /// Inactive tiers are never assigned.
    pub is_active: bool,
}

/// A customer's activity inside the evaluation window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerActivity {
    /// Paid orders placed.
    pub order_count: i64,
    /// Net amount spent.
    pub spend: Cents,
}

/// Whether `activity` meets both thresholds of `tier`.
#[must_use]
pub fn qualifies(tier: &TierRule, activity: CustomerActivity) -> bool {
    activity.order_count >= tier.order_threshold && activity.spend >= tier.spend_threshold
}

/// Pick the tier a customer belongs to.
///
/// Only active tiers are considered. The highest-ranked qualifying tier is
/// returned; equal ranks fall back to the larger id so the answer is stable.
/// If nothing qualifies the active default tier is returned, and `None` when
/// there is no default either.
#[must_use]
pub fn evaluate_tier(tiers: &[TierRule], activity: CustomerActivity) -> Option<&TierRule> {
    tiers
        .iter()
        .filter(|t| t.is_active && qualifies(t, activity))
        .max_by_key(|t| (t.rank, t.id))
        .or_else(|| {
            tiers
                .iter()
                .filter(|t| t.is_active && t.is_default)
                .max_by_key(|t| (t.rank, t.id))
        })
}

/// Start of a rolling window of `months` calendar months ending at `now`.
///
/// Day-of-month is clamped, so 31 March minus one month is 28/29 February.
#[must_use]
pub fn window_start(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Points earned for an order total at a tier multiplier, floored.
///
/// Negative totals or multipliers earn nothing.
#[must_use]
pub fn points_for_order(total: Cents, multiplier: Decimal) -> i64 {
    if total.is_negative() || multiplier.is_sign_negative() {
        return 0;
    }
    total.apply_rate(multiplier).unwrap_or(i64::MAX).max(0)
}

/// Discount granted for redeeming `points` at `cents_per_point`, floored.
///
/// # Errors
///
/// Returns `NonPositiveAmount` for zero or negative points and `Overflow`
/// when the discount does not fit in cents.
pub fn redemption_discount(points: i64, cents_per_point: Decimal) -> Result<Cents, LoyaltyError> {
    if points <= 0 {
        return Err(LoyaltyError::NonPositiveAmount);
    }
    Cents::new(points)
        .apply_rate(cents_per_point)
        .map(|c| Cents::new(c.max(0)))
        .ok_or(LoyaltyError::Overflow)
}

/// Points to take back when `refund` of an order worth `order_total` is
/// returned, given the order originally earned `earned` points.
///
/// Proportional and floored; never more than `earned`.
#[must_use]
pub fn revocation_for_refund(earned: i64, order_total: Cents, refund: Cents) -> i64 {
    if earned <= 0 || order_total <= Cents::ZERO || refund <= Cents::ZERO {
        return 0;
    }
    if refund >= order_total {
        return earned;
    }
    let share = Decimal::from(refund.get()) / Decimal::from(order_total.get());
    Cents::new(earned)
        .apply_rate(share)
        .unwrap_or(earned)
        .clamp(0, earned)
}

/// A customer's points balance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointsBalance(i64);

impl PointsBalance {
    /// Wrap a stored balance.
    #[must_use]
    pub const fn new(points: i64) -> Self {
        Self(points)
    }

    /// Points held.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Balance after a signed ledger `amount`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientBalance` if the result would be negative and
    /// `Overflow` if it leaves the `i64` range.
    pub fn apply(self, amount: i64) -> Result<Self, LoyaltyError> {
        let next = self.0.checked_add(amount).ok_or(LoyaltyError::Overflow)?;
        if next < 0 {
            return Err(LoyaltyError::InsufficientBalance {
                available: self.0,
                requested: amount.saturating_neg(),
            });
        }
        Ok(Self(next))
    }

    /// The largest debit up to `wanted` that keeps the balance non-negative.
    #[must_use]
    pub fn clamp_debit(self, wanted: i64) -> i64 {
        wanted.clamp(0, self.0.max(0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn tier(id: i32, rank: i32, orders: i64, spend: i64, multiplier: &str) -> TierRule {
        TierRule {
            id: TierId::new(id),
            rank,
            order_threshold: orders,
            spend_threshold: Cents::new(spend),
            points_multiplier: multiplier.parse().unwrap(),
            is_default: false,
            is_active: true,
        }
    }

    fn ladder() -> Vec<TierRule> {
        let mut bronze = tier(1, 0, 0, 0, "1");
        bronze.is_default = true;
        vec![
            bronze,
            tier(2, 10, 5, 50_000, "2"),
            tier(3, 20, 10, 150_000, "3"),
        ]
    }

    fn activity(order_count: i64, spend: i64) -> CustomerActivity {
        CustomerActivity {
            order_count,
            spend: Cents::new(spend),
        }
    }

    #[test]
    fn test_both_thresholds_required() {
        let silver = tier(2, 10, 5, 50_000, "2");
        assert!(qualifies(&silver, activity(5, 50_000)));
        assert!(!qualifies(&silver, activity(4, 90_000)));
        assert!(!qualifies(&silver, activity(9, 49_999)));
    }

    #[test]
    fn test_highest_rank_wins() {
        let tiers = ladder();
        let picked = evaluate_tier(&tiers, activity(12, 200_000)).unwrap();
        assert_eq!(picked.id, TierId::new(3));
    }

    #[test]
    fn test_worked_example() {
        // 6 orders and 60000 cents over the window qualifies for silver
        let tiers = ladder();
        let picked = evaluate_tier(&tiers, activity(6, 60_000)).unwrap();
        assert_eq!(picked.id, TierId::new(2));

        // an order of 10000 cents then earns 20000 points
        assert_eq!(
            points_for_order(Cents::new(10_000), picked.points_multiplier),
            20_000
        );
    }

    #[test]
    fn test_default_tier_is_floor() {
        let mut tiers = ladder();
        // make the default tier demanding so it does not qualify on its own
        if let Some(bronze) = tiers.first_mut() {
            bronze.order_threshold = 1;
        }
        let picked = evaluate_tier(&tiers, activity(0, 0)).unwrap();
        assert_eq!(picked.id, TierId::new(1));
    }

    #[test]
    fn test_no_default_no_tier() {
        let tiers = vec![tier(2, 10, 5, 50_000, "2")];
        assert!(evaluate_tier(&tiers, activity(1, 100)).is_none());
    }

    #[test]
    fn test_inactive_tiers_are_skipped() {
        let mut tiers = ladder();
        if let Some(gold) = tiers.last_mut() {
            gold.is_active = false;
        }
        let picked = evaluate_tier(&tiers, activity(12, 200_000)).unwrap();
        assert_eq!(picked.id, TierId::new(2));
    }

    #[test]
    fn test_equal_rank_breaks_on_id() {
        let tiers = vec![tier(7, 5, 0, 0, "1"), tier(4, 5, 0, 0, "1")];
        assert_eq!(
            evaluate_tier(&tiers, activity(0, 0)).unwrap().id,
            TierId::new(7)
        );
    }

    #[test]
    fn test_window_start_clamps_month_end() {
        let now = Utc.with_ymd_and_hms(2025, 3, 31, 12, 0, 0).unwrap();
        let start = window_start(now, 1);
        assert_eq!(start, Utc.with_ymd_and_hms(2025, 2, 28, 12, 0, 0).unwrap());

        let start = window_start(now, 12);
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_points_for_order_floors_and_guards() {
        assert_eq!(points_for_order(Cents::new(999), "1.5".parse().unwrap()), 1498);
        assert_eq!(points_for_order(Cents::new(-10), Decimal::ONE), 0);
        assert_eq!(points_for_order(Cents::new(10), "-1".parse().unwrap()), 0);
    }

    #[test]
    fn test_redemption_discount() {
        let rate: Decimal = "0.01".parse().unwrap();
        assert_eq!(redemption_discount(20_000, rate).unwrap(), Cents::new(200));
        assert_eq!(redemption_discount(150, rate).unwrap(), Cents::new(1));
        assert_eq!(
            redemption_discount(0, rate),
            Err(LoyaltyError::NonPositiveAmount)
        );
    }

    #[test]
    fn test_balance_never_negative() {
        let balance = PointsBalance::new(100);
        assert_eq!(balance.apply(-40).unwrap(), PointsBalance::new(60));
        assert_eq!(balance.apply(-100).unwrap(), PointsBalance::new(0));
        assert_eq!(
            balance.apply(-101),
            Err(LoyaltyError::InsufficientBalance {
                available: 100,
                requested: 101
            })
        );
        assert_eq!(balance.apply(i64::MAX), Err(LoyaltyError::Overflow));
    }

    #[test]
    fn test_ledger_sequence_keeps_running_balance() {
        let amounts = [500, -200, 50, -350, 10];
        let mut balance = PointsBalance::default();
        let mut expected = 0;
        for amount in amounts {
            let before = balance;
            balance = balance.apply(amount).unwrap();
            expected += amount;
            assert_eq!(balance.get(), before.get() + amount);
            assert!(balance.get() >= 0);
        }
        assert_eq!(balance.get(), expected);
    }

    #[test]
    fn test_clamp_debit() {
        let balance = PointsBalance::new(30);
        assert_eq!(balance.clamp_debit(50), 30);
        assert_eq!(balance.clamp_debit(10), 10);
        assert_eq!(balance.clamp_debit(-5), 0);
    }

    #[test]
    fn test_revocation_is_proportional() {
        let total = Cents::new(10_000);
        assert_eq!(revocation_for_refund(20_000, total, Cents::new(2_500)), 5_000);
        assert_eq!(revocation_for_refund(20_000, total, Cents::new(10_000)), 20_000);
        assert_eq!(revocation_for_refund(20_000, total, Cents::new(50_000)), 20_000);
        assert_eq!(revocation_for_refund(3, total, Cents::new(1)), 0);
        assert_eq!(revocation_for_refund(0, total, Cents::new(1_000)), 0);
    }
}
