//! AppStoreWebhookHandler - Applies App Store server notifications (V2).
//!
//! Apple anchors a subscription family with the original transaction id
//! stamped on the purchase at first sale, and each notification signs a
//! fresh transaction id plus the family's expiry. Plan changes arrive as
//! DID_CHANGE_RENEWAL_PREF: an upgrade takes effect immediately and
//! transplants the entitlement to the new product's line; a downgrade is
//! scheduled as an initial-status row that begins when the current plan
//! runs out.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::catalog::Buyable;
use crate::domain::foundation::{
    DomainError, ErrorCode, EventId, SerializableDomainEvent, SubscriptionId, Timestamp,
    TransactionId,
};
use crate::domain::ledger::{PaymentTransaction, PaymentVendor, Purchase};
use crate::domain::notifications::{
    AppStoreNotification, AppStoreNotificationSubtype, AppStoreNotificationType,
};
use crate::domain::subscription::{SubscriptionEvent, SubscriptionStatus, UserSubscription};
use crate::ports::{BuyableRepository, EventPublisher, PurchaseLedger, SubscriptionRepository};

use super::WebhookOutcome;

/// Command to apply one verified App Store notification.
#[derive(Debug, Clone)]
pub struct HandleAppStoreNotificationCommand {
    /// The verified notification, signed parts already decoded.
    pub event: AppStoreNotification,
    /// The envelope as delivered, attached to transactions the
    /// notification creates.
    pub raw_body: JsonValue,
}

/// Handler applying App Store server notifications.
pub struct AppStoreWebhookHandler {
    ledger: Arc<dyn PurchaseLedger>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    buyables: Arc<dyn BuyableRepository>,
    event_publisher: Arc<dyn EventPublisher>,
}

/// Ledger and catalog rows a notification concerns, resolved through
/// the signed original transaction id.
struct NotificationContext {
    transaction_id: String,
    purchase: Purchase,
    original_transaction: PaymentTransaction,
    product: Buyable,
    subscription: Option<UserSubscription>,
    expires_at: Option<Timestamp>,
}

impl NotificationContext {
    fn subscription(self) -> Result<UserSubscription, DomainError> {
        self.subscription.ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "No subscription row for notified purchase",
            )
            .with_detail("vendor_transaction_id", self.transaction_id)
        })
    }

    fn expiry(&self) -> Result<Timestamp, DomainError> {
        self.expires_at.ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "Notification carries no expiresDate",
            )
        })
    }
}

impl AppStoreWebhookHandler {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        buyables: Arc<dyn BuyableRepository>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            ledger,
            subscriptions,
            buyables,
            event_publisher,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(notification_id = %cmd.event.notification_id))]
    pub async fn handle(
        &self,
        cmd: HandleAppStoreNotificationCommand,
    ) -> Result<WebhookOutcome, DomainError> {
        let event = &cmd.event;
        let now = Timestamp::now();

        use AppStoreNotificationSubtype as Subtype;
        use AppStoreNotificationType as Kind;

        let outcome = match (event.notification_type, event.subtype) {
            (Kind::DidChangeRenewalPref, Subtype::None) => self.cancel_downgrade(event).await?,
            (Kind::DidChangeRenewalPref, Subtype::Upgrade) => self.upgrade(event, now).await?,
            (Kind::DidChangeRenewalPref, Subtype::Downgrade) => self.downgrade(event, now).await?,
            (Kind::DidFailToRenew, _) | (Kind::Expired, _) | (Kind::GracePeriodExpired, _) => {
                self.expire(event, now).await?
            }
            (Kind::DidRenew, _) => self.did_renew(event, &cmd.raw_body, now).await?,
            (Kind::PriceIncrease, Subtype::Accepted) => self.log_price_increase(event).await?,
            (Kind::PriceIncrease, _) => WebhookOutcome::NoOp,
            (Kind::Refund, _) => self.refund(event, now).await?,
            (Kind::RefundDeclined, _) | (Kind::RefundReversed, _) => {
                self.reinstate(event, now).await?
            }
            (Kind::RenewalExtended, _) => self.renewal_extended(event, now).await?,
            (Kind::Subscribed, Subtype::InitialBuy) | (Kind::Subscribed, Subtype::Resubscribe) => {
                self.ensure_subscription(event).await?
            }
            (Kind::Revoke, _) => self.log_revoke(event).await?,
            (Kind::RenewalExtension, _)
            | (Kind::ConsumptionRequest, _)
            | (Kind::DidChangeRenewalStatus, _)
            | (Kind::OfferRedeemed, _)
            | (Kind::Test, _)
            | (Kind::None, _) => WebhookOutcome::NoOp,
            _ => {
                tracing::info!(
                    vendor = PaymentVendor::AppleAppStore.as_str(),
                    notification_type = %event.notification_type,
                    notification_subtype = %event.subtype,
                    "Unhandled notification"
                );
                WebhookOutcome::Ignored
            }
        };

        tracing::info!(
            vendor = PaymentVendor::AppleAppStore.as_str(),
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            action = outcome.action(),
            "Webhook is handled"
        );
        Ok(outcome)
    }

    /// Resolves the rows behind a notification: the purchase carrying
    /// the signed original transaction id, its latest transaction, the
    /// notified product and the product's subscription row (if any).
    async fn resolve(&self, event: &AppStoreNotification) -> Result<NotificationContext, DomainError> {
        let transaction_id = event
            .transaction_id()
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InternalError,
                    "Notification carries no transaction id",
                )
            })?
            .to_string();
        let original_transaction_id = event.original_transaction_id().ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "Notification carries no original transaction id",
            )
        })?;

        let purchase = self
            .ledger
            .find_purchase_by_original_transaction(
                PaymentVendor::AppleAppStore,
                original_transaction_id,
            )
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InternalError,
                    "Payment transaction not created yet",
                )
                .with_detail(
                    "vendor_original_transaction_id",
                    original_transaction_id.to_string(),
                )
            })?;
        let original_transaction = self
            .ledger
            .latest_transaction_for_purchase(&purchase.id)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InternalError,
                    "Purchase has no payment transactions",
                )
            })?;

        let product_key = event.product_id().ok_or_else(|| {
            DomainError::new(ErrorCode::InternalError, "Notification carries no product id")
        })?;
        let product = self
            .buyables
            .find_by_name(product_key)
            .await?
            .ok_or_else(|| {
                DomainError::new(ErrorCode::BuyableNotFound, "Notified product is not in the catalog")
                    .with_detail("product", product_key.to_string())
            })?;

        let subscription = self
            .subscriptions
            .find_latest_for_purchase_and_buyable(&purchase.id, &product.id)
            .await?;

        Ok(NotificationContext {
            transaction_id,
            purchase,
            original_transaction,
            product,
            subscription,
            expires_at: event.expires_at(),
        })
    }

    /// UPGRADE: the store already charged for the new plan; move the
    /// entitlement to the new product's line.
    ///
    /// Staged first, written once: stretch the target line to the
    /// signed expiry when a non-expired row exists for it, retire the
    /// user's current entitlement, open the new line on the ledgered
    /// transaction's purchase when this transaction is known, or
    /// directly from the signed data when it is not. All rows land in
    /// one atomic batch; events go out after the write.
    async fn upgrade(
        &self,
        event: &AppStoreNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let expiry = ctx.expiry()?;

        let mut updates: Vec<UserSubscription> = Vec::new();
        let mut events: Vec<SubscriptionEvent> = Vec::new();

        if let Some(target) = ctx.subscription.clone() {
            if target.status != SubscriptionStatus::Expired {
                let mut target = target;
                target.expiration_date = expiry;
                updates.push(target);
            }
        }

        if let Some(active) = self
            .subscriptions
            .find_active_for_user(&ctx.purchase.user_id, now)
            .await?
        {
            // The active row may already be staged as the stretch target
            // on a redelivery; retire the staged copy instead of racing
            // two writes to the same row.
            let expired = match updates.iter_mut().find(|row| row.id == active.id) {
                Some(staged) => staged.mark_expired(now),
                None => {
                    let mut active = active.clone();
                    let expired = active.mark_expired(now);
                    if expired {
                        updates.push(active);
                    }
                    expired
                }
            };
            if expired {
                events.push(SubscriptionEvent::Expired {
                    event_id: EventId::new(),
                    subscription_id: active.id,
                    user_id: active.user_id.clone(),
                    occurred_at: now,
                });
            }
        }

        let row = match self
            .ledger
            .find_transaction(PaymentVendor::AppleAppStore, &ctx.transaction_id)
            .await?
        {
            Some(transaction) => {
                let purchase = self
                    .ledger
                    .find_purchase_by_id(&transaction.purchase_id)
                    .await?
                    .ok_or_else(|| {
                        DomainError::new(
                            ErrorCode::InternalError,
                            "Transaction references a missing purchase",
                        )
                    })?;
                UserSubscription::create(
                    SubscriptionId::new(),
                    purchase.user_id.clone(),
                    &ctx.product,
                    purchase.id,
                    now,
                )?
            }
            None => UserSubscription::from_store_report(
                SubscriptionId::new(),
                ctx.purchase.user_id.clone(),
                ctx.product.id,
                ctx.purchase.id,
                expiry,
                now,
            ),
        };
        events.push(SubscriptionEvent::Created {
            event_id: EventId::new(),
            subscription_id: row.id,
            user_id: row.user_id.clone(),
            buyable_id: row.buyable_id,
            purchase_id: row.purchase_id,
            status: row.status,
            expiration_date: row.expiration_date,
            occurred_at: now,
        });

        self.subscriptions.save_all(&updates, &[row]).await?;
        for event in events {
            self.publish(event).await?;
        }

        Ok(WebhookOutcome::Applied { action: "upgrade" })
    }

    /// DOWNGRADE: schedule the cheaper plan to start when the current
    /// one runs out. A redelivery updates the already-scheduled row.
    async fn downgrade(
        &self,
        event: &AppStoreNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let expiry = ctx.expiry()?;

        if let Some(mut scheduled) = ctx.subscription {
            scheduled.expiration_date = expiry;
            scheduled.reconcile(now);
            self.subscriptions.update(&scheduled).await?;
            return Ok(WebhookOutcome::Applied { action: "downgrade" });
        }

        let active = self
            .subscriptions
            .find_active_for_user(&ctx.purchase.user_id, now)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InternalError,
                    "No active subscription to schedule a downgrade from",
                )
            })?;
        let row = UserSubscription::scheduled(
            SubscriptionId::new(),
            ctx.purchase.user_id.clone(),
            ctx.product.id,
            ctx.purchase.id,
            active.expiration_date,
            expiry,
            now,
        );
        self.subscriptions.insert(&row).await?;
        self.publish(SubscriptionEvent::Created {
            event_id: EventId::new(),
            subscription_id: row.id,
            user_id: row.user_id.clone(),
            buyable_id: row.buyable_id,
            purchase_id: row.purchase_id,
            status: row.status,
            expiration_date: row.expiration_date,
            occurred_at: now,
        })
        .await?;
        Ok(WebhookOutcome::Applied { action: "downgrade" })
    }

    /// DID_CHANGE_RENEWAL_PREF without a subtype: the user reverted a
    /// pending downgrade; remove the scheduled row.
    async fn cancel_downgrade(
        &self,
        event: &AppStoreNotification,
    ) -> Result<WebhookOutcome, DomainError> {
        let scheduled = self.resolve(event).await?.subscription()?;
        self.subscriptions.delete(&scheduled.id).await?;
        Ok(WebhookOutcome::Applied {
            action: "cancel_downgrade",
        })
    }

    /// DID_RENEW: record the renewal transaction and adopt the signed
    /// expiry in one atomic write.
    async fn did_renew(
        &self,
        event: &AppStoreNotification,
        raw_body: &JsonValue,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let expiry = ctx.expiry()?;

        // Renewals are charged at the plan price; promotional credit
        // from the first sale does not carry over. A redelivered
        // notification re-signs the same transaction id and is absorbed
        // as a duplicate while the expiry still converges.
        let renewal = ctx.original_transaction.renewal_without_credit(
            TransactionId::new(),
            ctx.transaction_id.clone(),
            Some(raw_body.clone()),
        );

        let mut subscription = ctx.subscription()?;
        subscription.update_expiration(expiry, now);
        self.ledger
            .record_transaction_with_subscription(&renewal, &subscription)
            .await?;

        self.publish(SubscriptionEvent::Renewed {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            new_expiration: subscription.expiration_date,
            occurred_at: now,
        })
        .await?;
        Ok(WebhookOutcome::Applied { action: "did_renew" })
    }

    /// DID_FAIL_TO_RENEW / EXPIRED / GRACE_PERIOD_EXPIRED.
    async fn expire(
        &self,
        event: &AppStoreNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let mut subscription = self.resolve(event).await?.subscription()?;
        if subscription.force_expire(now) {
            self.subscriptions.update(&subscription).await?;
            self.publish(SubscriptionEvent::Expired {
                event_id: EventId::new(),
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                occurred_at: now,
            })
            .await?;
        }
        Ok(WebhookOutcome::Applied { action: "expire" })
    }

    /// REFUND: Apple already clawed the money back; end the entitlement.
    async fn refund(
        &self,
        event: &AppStoreNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        tracing::info!(
            vendor = PaymentVendor::AppleAppStore.as_str(),
            payment_transaction_id = %ctx.original_transaction.id,
            vendor_original_transaction_id = ctx.purchase.original_transaction_id.as_deref().unwrap_or(""),
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            "User refunded purchase"
        );
        let mut subscription = ctx.subscription()?;
        if subscription.force_expire(now) {
            self.subscriptions.update(&subscription).await?;
            self.publish(SubscriptionEvent::Expired {
                event_id: EventId::new(),
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                occurred_at: now,
            })
            .await?;
        }
        Ok(WebhookOutcome::Applied { action: "refund" })
    }

    /// REFUND_DECLINED / REFUND_REVERSED: the entitlement stands after
    /// all; reinstate it to the signed expiry when that is still ahead.
    async fn reinstate(
        &self,
        event: &AppStoreNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let expiry = ctx.expiry()?;
        tracing::info!(
            vendor = PaymentVendor::AppleAppStore.as_str(),
            payment_transaction_id = %ctx.original_transaction.id,
            vendor_original_transaction_id = ctx.purchase.original_transaction_id.as_deref().unwrap_or(""),
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            "Refund did not go through, entitlement stands"
        );
        let mut subscription = ctx.subscription()?;
        if subscription.reactivate_until(expiry, now) {
            self.subscriptions.update(&subscription).await?;
        }
        Ok(WebhookOutcome::Applied { action: "reinstate" })
    }

    /// RENEWAL_EXTENDED: Apple granted extra days (e.g. service outage
    /// compensation); adopt the signed expiry.
    async fn renewal_extended(
        &self,
        event: &AppStoreNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let expiry = ctx.expiry()?;
        let mut subscription = ctx.subscription()?;
        subscription.update_expiration(expiry, now);
        self.subscriptions.update(&subscription).await?;
        Ok(WebhookOutcome::Applied {
            action: "renewal_extended",
        })
    }

    /// SUBSCRIBED: the receipt path should already have created the row.
    async fn ensure_subscription(
        &self,
        event: &AppStoreNotification,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        if ctx.subscription.is_none() {
            tracing::error!(
                vendor = PaymentVendor::AppleAppStore.as_str(),
                payment_transaction_id = %ctx.original_transaction.id,
                vendor_transaction_id = %ctx.transaction_id,
                vendor_original_transaction_id = ctx.purchase.original_transaction_id.as_deref().unwrap_or(""),
                notification_type = %event.notification_type,
                notification_subtype = %event.subtype,
                notification_id = %event.notification_id,
                "Notified subscription purchase doesn't exist"
            );
        }
        Ok(WebhookOutcome::Applied {
            action: "ensure_subscription",
        })
    }

    async fn log_price_increase(
        &self,
        event: &AppStoreNotification,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        tracing::info!(
            vendor = PaymentVendor::AppleAppStore.as_str(),
            payment_transaction_id = %ctx.original_transaction.id,
            vendor_transaction_id = %ctx.transaction_id,
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            "User accepted price increase"
        );
        Ok(WebhookOutcome::Applied {
            action: "price_increase_logged",
        })
    }

    /// REVOKE arrives when family sharing access is withdrawn, which
    /// this catalog does not offer. Logged for visibility only.
    async fn log_revoke(&self, event: &AppStoreNotification) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        tracing::info!(
            vendor = PaymentVendor::AppleAppStore.as_str(),
            payment_transaction_id = %ctx.original_transaction.id,
            vendor_transaction_id = %ctx.transaction_id,
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            "Subscription revoked. This may indicate that the user closed the family share"
        );
        Ok(WebhookOutcome::Applied {
            action: "revoke_logged",
        })
    }

    async fn publish(&self, event: SubscriptionEvent) -> Result<(), DomainError> {
        self.event_publisher.publish(event.to_envelope()).await
    }
}
