//! Return request workflow.
//!
//! ```text
//! requested ─┬─> approved ─┬─> in_transit ──> received ─┬─> refunded ──> completed
//!            │             └──────────────────> received └─────────────> completed
//!            ├─> rejected
//!            └─> cancelled (also from approved)
//! ```
//!
//! Each step is a conditional update on the status the caller saw, so two
//! admins acting at once cannot both win.

use sqlx::PgPool;
use tracing::instrument;

use sagebrush_core::{Cents, CustomerId, PaymentStatus, ReturnId, ReturnStatus};

use super::loyalty::revoke_for_refund_tx;
use super::{LoyaltyService, PaymentClient, ServiceError};
use crate::config::LoyaltyConfig;
use crate::db::returns::{ReturnUpdate, lock_tx, transition_tx};
use crate::db::{OrderRepository, ReturnRepository, orders};
use crate::models::{
    CreateReturnInput, RefundInput, ReturnDecisionInput, ReturnRequest, ReturnShipmentInput,
    ValidationError,
};

/// Return workflow operations.
pub struct ReturnService<'a> {
    pool: &'a PgPool,
    payments: &'a PaymentClient,
    loyalty: &'a LoyaltyConfig,
}

impl<'a> ReturnService<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool, payments: &'a PaymentClient, loyalty: &'a LoyaltyConfig) -> Self {
        Self {
            pool,
            payments,
            loyalty,
        }
    }

    /// Open a return for one of the customer's paid orders.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if the order does not belong to the
    /// customer, and `ServiceError::Conflict` if it is unpaid or already has
    /// an open return.
    #[instrument(skip(self, input), fields(order_id = %input.order_id))]
    pub async fn request(
        &self,
        customer_id: CustomerId,
        input: CreateReturnInput,
    ) -> Result<ReturnRequest, ServiceError> {
        let input = input.validate()?;

        let order = OrderRepository::new(self.pool)
            .get(input.order_id)
            .await?
            .filter(|o| o.order.customer_id == Some(customer_id))
            .ok_or(ServiceError::NotFound("order"))?;

        if !order.extension.payment_status.is_captured() {
            return Err(ServiceError::Conflict(
                "only paid orders can be returned".to_string(),
            ));
        }

        let repo = ReturnRepository::new(self.pool);
        if repo.has_open_return(input.order_id).await? {
            return Err(ServiceError::Conflict(
                "this order already has an open return".to_string(),
            ));
        }

        let created = repo
            .create(input.order_id, customer_id, &input.reason, &input.items)
            .await?;
        tracing::info!(return_id = %created.id, %customer_id, "Return requested");
        Ok(created)
    }

    /// Withdraw a return the customer opened.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` for someone else's return and a
    /// transition error once the return is past approval.
    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        customer_id: CustomerId,
        id: ReturnId,
    ) -> Result<ReturnRequest, ServiceError> {
        let current = self.load(id).await?;
        if current.customer_id != customer_id {
            return Err(ServiceError::NotFound("return"));
        }
        self.advance(current, ReturnStatus::Cancelled, &ReturnUpdate::default())
            .await
    }

    /// # Errors
    ///
    /// Returns a transition error unless the return is `requested`.
    #[instrument(skip(self, input))]
    pub async fn approve(
        &self,
        id: ReturnId,
        input: &ReturnDecisionInput,
    ) -> Result<ReturnRequest, ServiceError> {
        self.decide(id, ReturnStatus::Approved, input).await
    }

    /// # Errors
    ///
    /// Returns a transition error unless the return is `requested`.
    #[instrument(skip(self, input))]
    pub async fn reject(
        &self,
        id: ReturnId,
        input: &ReturnDecisionInput,
    ) -> Result<ReturnRequest, ServiceError> {
        self.decide(id, ReturnStatus::Rejected, input).await
    }

    /// Record that the customer has shipped the items back.
    ///
    /// # Errors
    ///
    /// Returns a transition error unless the return is `approved`.
    #[instrument(skip(self, input))]
    pub async fn mark_in_transit(
        &self,
        id: ReturnId,
        input: ReturnShipmentInput,
    ) -> Result<ReturnRequest, ServiceError> {
        let input = input.validate()?;
        let current = self.load(id).await?;
        let update = ReturnUpdate {
            courier: input.courier.as_deref(),
            tracking_number: input.tracking_number.as_deref(),
            ..ReturnUpdate::default()
        };
        self.advance(current, ReturnStatus::InTransit, &update).await
    }

    /// # Errors
    ///
    /// Returns a transition error unless the return is approved or in transit.
    #[instrument(skip(self, input))]
    pub async fn mark_received(
        &self,
        id: ReturnId,
        input: &ReturnDecisionInput,
    ) -> Result<ReturnRequest, ServiceError> {
        self.decide(id, ReturnStatus::Received, input).await
    }

    /// Close a received or refunded return.
    ///
    /// # Errors
    ///
    /// Returns a transition error unless the return is received or refunded.
    #[instrument(skip(self, input))]
    pub async fn complete(
        &self,
        id: ReturnId,
        input: &ReturnDecisionInput,
    ) -> Result<ReturnRequest, ServiceError> {
        self.decide(id, ReturnStatus::Completed, input).await
    }

    /// Refund part or all of the order behind a received return.
    ///
    /// The provider refund is issued when the order has a payment reference
    /// and an API key is configured; otherwise the refund is recorded
    /// locally. Loyalty points earned by the order are revoked in
    /// proportion and the customer's tier is re-evaluated afterwards.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for an amount outside
    /// `1..=refundable`, a transition error unless the return is `received`,
    /// and `ServiceError::Payment` if the provider refuses the refund.
    #[instrument(skip(self, input), fields(amount = input.amount_cents.get()))]
    pub async fn refund(
        &self,
        id: ReturnId,
        input: RefundInput,
    ) -> Result<ReturnRequest, ServiceError> {
        let note = ReturnDecisionInput { note: input.note }.note()?;
        let amount = input.amount_cents;

        let mut tx = self.pool.begin().await?;

        let current = lock_tx(&mut *tx, id)
            .await?
            .ok_or(ServiceError::NotFound("return"))?;
        current.status.transition(ReturnStatus::Refunded)?;

        let order = orders::fetch_detail(&mut *tx, current.order_id, true)
            .await?
            .ok_or(ServiceError::NotFound("order"))?;
        let total = order.order.total_cents;
        check_refund_amount(amount, order.extension.refundable(total))?;
        let refunded_total = order
            .extension
            .refunded_cents
            .checked_add(amount)
            .ok_or_else(|| ValidationError::new("refund amount out of range"))?;

        match order.extension.payment_reference.as_deref() {
            Some(reference) if self.payments.is_configured() => {
                let key = format!("return-{id}-refund-{}", refunded_total.get());
                self.payments.refund(reference, amount, &key).await?;
            }
            _ => {
                tracing::info!(return_id = %id, "Recording refund without contacting the provider");
            }
        }

        orders::set_refunded(
            &mut *tx,
            order.order.id,
            refunded_total,
            PaymentStatus::after_refund(total, refunded_total),
        )
        .await?;
        revoke_for_refund_tx(&mut *tx, &order, refunded_total).await?;

        let update = ReturnUpdate {
            admin_note: note.as_deref(),
            add_refund: amount,
            ..ReturnUpdate::default()
        };
        let updated = transition_tx(&mut *tx, id, current.status, ReturnStatus::Refunded, &update)
            .await?
            .ok_or_else(concurrent_change)?;
        tx.commit().await?;

        tracing::info!(return_id = %id, order_id = %order.order.id, amount = amount.get(), "Return refunded");

        if let Some(customer_id) = order.order.customer_id
            && let Err(e) = LoyaltyService::new(self.pool, self.loyalty)
                .evaluate_customer(customer_id)
                .await
        {
            tracing::warn!(%customer_id, error = %e, "Tier re-evaluation after refund failed");
        }

        Ok(updated)
    }

    async fn load(&self, id: ReturnId) -> Result<ReturnRequest, ServiceError> {
        ReturnRepository::new(self.pool)
            .get(id)
            .await?
            .ok_or(ServiceError::NotFound("return"))
    }

    async fn decide(
        &self,
        id: ReturnId,
        next: ReturnStatus,
        input: &ReturnDecisionInput,
    ) -> Result<ReturnRequest, ServiceError> {
        let note = input.note()?;
        let current = self.load(id).await?;
        let update = ReturnUpdate {
            admin_note: note.as_deref(),
            ..ReturnUpdate::default()
        };
        self.advance(current, next, &update).await
    }

    async fn advance(
        &self,
        current: ReturnRequest,
        next: ReturnStatus,
        update: &ReturnUpdate<'_>,
    ) -> Result<ReturnRequest, ServiceError> {
        current.status.transition(next)?;
        let updated = ReturnRepository::new(self.pool)
            .transition(current.id, current.status, next, update)
            .await?
            .ok_or_else(concurrent_change)?;

        tracing::info!(
            return_id = %current.id,
            from = %current.status,
            to = %next,
            "Return status changed"
        );
        Ok(updated)
    }
}

fn concurrent_change() -> ServiceError {
    ServiceError::Conflict("return was changed by another request, reload and retry".to_string())
}

/// A refund must be positive and no larger than what is left to refund.
fn check_refund_amount(amount: Cents, refundable: Cents) -> Result<(), ValidationError> {
    if amount <= Cents::ZERO {
        return Err(ValidationError::new("amount_cents must be positive"));
    }
    if amount > refundable {
        return Err(ValidationError(format!(
            "amount_cents exceeds the refundable amount of {refundable}"
        )));
    }
    Ok(())
}
