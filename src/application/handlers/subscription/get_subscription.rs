//! GetSubscriptionHandler - Query handler for the user's entitlement.
//!
//! Reads the user's most relevant subscription row and reconciles it
//! against the clock before answering. A status that flipped during
//! reconciliation is persisted on the way out, so the row a lapsed user
//! sees is the row everyone else will read too.

use std::sync::Arc;

use crate::domain::catalog::{BuyableType, SubscriptionPeriod};
use crate::domain::foundation::{Timestamp, UserId};
use crate::domain::subscription::{SubscriptionError, UserSubscription};
use crate::ports::{BuyableRepository, SubscriptionRepository};

/// Query for a user's subscription state.
#[derive(Debug, Clone)]
pub struct GetSubscriptionQuery {
    /// The user whose entitlement to read.
    pub user_id: UserId,
}

/// Reconciled subscription state with its catalog context.
#[derive(Debug, Clone)]
pub struct SubscriptionView {
    /// The subscription row, status already reconciled.
    pub subscription: UserSubscription,
    /// Billing period of the subscribed product.
    pub period: SubscriptionPeriod,
    /// Kind of the subscribed product.
    pub buyable_type: BuyableType,
}

/// Handler answering entitlement reads.
pub struct GetSubscriptionHandler {
    subscription_repository: Arc<dyn SubscriptionRepository>,
    buyable_repository: Arc<dyn BuyableRepository>,
}

impl GetSubscriptionHandler {
    pub fn new(
        subscription_repository: Arc<dyn SubscriptionRepository>,
        buyable_repository: Arc<dyn BuyableRepository>,
    ) -> Self {
        Self {
            subscription_repository,
            buyable_repository,
        }
    }

    pub async fn handle(
        &self,
        query: GetSubscriptionQuery,
    ) -> Result<SubscriptionView, SubscriptionError> {
        let now = Timestamp::now();

        // 1. Active row if one exists, otherwise the newest of any status
        let mut subscription = self
            .subscription_repository
            .find_latest_for_user(&query.user_id)
            .await?
            .ok_or_else(|| SubscriptionError::no_subscription(query.user_id.clone()))?;

        // 2. Reconcile against the clock, persisting a flip exactly once
        if subscription.reconcile(now) {
            self.subscription_repository.update(&subscription).await?;
        }

        // 3. Attach the catalog context clients render from
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
        let period = buyable
            .period
            .ok_or_else(|| SubscriptionError::not_a_subscription(buyable.name.clone()))?;

        Ok(SubscriptionView {
            subscription,
            period,
            buyable_type: buyable.buyable_type,
        })
    }
}
