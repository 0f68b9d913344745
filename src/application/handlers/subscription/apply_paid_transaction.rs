//! ApplyPaidTransactionHandler - Converts a paid purchase into an entitlement.
//!
//! Every successful payment against a subscription product funnels through
//! this handler: receipt submissions after the ledger commit, and vendor
//! notifications that report a sale we have no local row for. It decides
//! between opening a fresh entitlement window, extending the one the same
//! purchase already holds, and doing nothing at all.

use std::sync::Arc;

use crate::domain::catalog::{Buyable, BuyableType, SubscriptionPeriod};
use crate::domain::foundation::{EventId, SerializableDomainEvent, SubscriptionId, Timestamp};
use crate::domain::ledger::Purchase;
use crate::domain::subscription::{SubscriptionError, SubscriptionEvent, UserSubscription};
use crate::ports::{BuyableRepository, EventPublisher, SubscriptionRepository};

/// Command to apply a paid purchase to the user's subscription state.
#[derive(Debug, Clone)]
pub struct ApplyPaidTransactionCommand {
    /// The purchase the payment landed on.
    pub purchase: Purchase,
    /// Product to subscribe to, when the caller already resolved one.
    /// Left empty for receipt submissions, where the purchase rows decide.
    pub product: Option<Buyable>,
}

/// What applying the payment did to the subscription state.
#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// A new entitlement window was opened.
    Created(UserSubscription),
    /// The purchase's existing entitlement was extended by one period.
    Renewed(UserSubscription),
    /// Nothing to do: no subscription product, or another purchase
    /// already holds the user's live entitlement.
    Skipped,
}

impl ApplyOutcome {
    /// The subscription row the outcome produced, if any.
    pub fn subscription(&self) -> Option<&UserSubscription> {
        match self {
            ApplyOutcome::Created(sub) | ApplyOutcome::Renewed(sub) => Some(sub),
            ApplyOutcome::Skipped => None,
        }
    }
}

/// Handler applying paid transactions to subscription state.
pub struct ApplyPaidTransactionHandler {
    buyable_repository: Arc<dyn BuyableRepository>,
    subscription_repository: Arc<dyn SubscriptionRepository>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl ApplyPaidTransactionHandler {
    pub fn new(
        buyable_repository: Arc<dyn BuyableRepository>,
        subscription_repository: Arc<dyn SubscriptionRepository>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            buyable_repository,
            subscription_repository,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: ApplyPaidTransactionCommand,
    ) -> Result<ApplyOutcome, SubscriptionError> {
        let now = Timestamp::now();

        // 1. Resolve the subscription product this payment concerns
        let product = match self.resolve_product(&cmd).await? {
            Some(product) => product,
            None => return Ok(ApplyOutcome::Skipped),
        };

        // 2. A live entitlement on the same purchase renews; one held by a
        //    different purchase wins and this payment changes nothing
        if let Some(mut current) = self
            .subscription_repository
            .find_active_for_user(&cmd.purchase.user_id, now)
            .await?
        {
            if current.purchase_id != cmd.purchase.id {
                return Ok(ApplyOutcome::Skipped);
            }

            let period = self.period_of(&current).await?;
            current.renew(period, now);
            self.subscription_repository.update(&current).await?;

            let event = SubscriptionEvent::Renewed {
                event_id: EventId::new(),
                subscription_id: current.id,
                user_id: current.user_id.clone(),
                new_expiration: current.expiration_date,
                occurred_at: now,
            };
            self.event_publisher.publish(event.to_envelope()).await?;

            return Ok(ApplyOutcome::Renewed(current));
        }

        // 3. Open a fresh entitlement window: trial if the product grants
        //    one, a paid period otherwise
        let subscription = UserSubscription::create(
            SubscriptionId::new(),
            cmd.purchase.user_id.clone(),
            &product,
            cmd.purchase.id,
            now,
        )?;
        self.subscription_repository.insert(&subscription).await?;

        // 4. Create and publish event
        let event = SubscriptionEvent::Created {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            buyable_id: subscription.buyable_id,
            purchase_id: subscription.purchase_id,
            status: subscription.status,
            expiration_date: subscription.expiration_date,
            occurred_at: now,
        };
        self.event_publisher.publish(event.to_envelope()).await?;

        Ok(ApplyOutcome::Created(subscription))
    }

    /// The product to subscribe to: the caller's explicit choice, or the
    /// first personal-subscription item among the purchase's rows.
    async fn resolve_product(
        &self,
        cmd: &ApplyPaidTransactionCommand,
    ) -> Result<Option<Buyable>, SubscriptionError> {
        if let Some(product) = &cmd.product {
            return Ok(Some(product.clone()));
        }

        let ids: Vec<_> = cmd.purchase.buyable_ids().collect();
        let buyables = self.buyable_repository.find_by_ids(&ids).await?;
        Ok(buyables
            .into_iter()
            .find(|b| b.buyable_type == BuyableType::PersonalSubscription))
    }

    /// Billing period of the subscription's own product.
    async fn period_of(
        &self,
        subscription: &UserSubscription,
    ) -> Result<SubscriptionPeriod, SubscriptionError> {
        let buyable = self
            .buyable_repository
            .find_by_id(&subscription.buyable_id)
            .await?
            .ok_or_else(|| {
                SubscriptionError::internal(format!(
                    "Buyable {} behind subscription {} is gone",
                    subscription.buyable_id, subscription.id
                ))
            })?;
        buyable
            .period
            .ok_or_else(|| SubscriptionError::not_a_subscription(buyable.name))
    }
}
