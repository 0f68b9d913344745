//! GooglePlayWebhookHandler - Applies Google Play developer notifications.
//!
//! Google identifies a subscription by the purchase token from the first
//! sale; renewals re-send that token rather than a fresh transaction id,
//! so renewal transactions get a synthesized `{unix_secs}-{token}` id.
//! Price-change and deferral notifications carry no payload details and
//! require a live `purchases.subscriptions.get` call.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::catalog::{Buyable, SubscriptionPeriod};
use crate::domain::foundation::{
    Currency, DomainError, ErrorCode, EventId, Money, SerializableDomainEvent, Timestamp,
    TransactionId,
};
use crate::domain::ledger::{PaymentTransaction, PaymentVendor};
use crate::domain::notifications::{
    GooglePlayNotification, GooglePlayNotificationSubtype, GooglePlayNotificationType,
};
use crate::domain::subscription::{SubscriptionEvent, UserSubscription};
use crate::ports::{
    BuyableRepository, EventPublisher, GooglePlayClient, PurchaseLedger, SubscriptionRepository,
};

use super::WebhookOutcome;

/// Command to apply one verified Google Play notification.
#[derive(Debug, Clone)]
pub struct HandleGooglePlayNotificationCommand {
    /// The verified notification.
    pub event: GooglePlayNotification,
    /// The Pub/Sub envelope as delivered, attached to transactions the
    /// notification creates.
    pub raw_body: JsonValue,
}

/// Handler applying Google Play developer notifications.
pub struct GooglePlayWebhookHandler {
    ledger: Arc<dyn PurchaseLedger>,
    subscriptions: Arc<dyn SubscriptionRepository>,
    buyables: Arc<dyn BuyableRepository>,
    google_play: Arc<dyn GooglePlayClient>,
    event_publisher: Arc<dyn EventPublisher>,
}

/// Ledger and catalog rows a subscription notification concerns.
struct NotificationContext {
    purchase_token: String,
    original_transaction: PaymentTransaction,
    product: Buyable,
    subscription: Option<UserSubscription>,
}

impl NotificationContext {
    fn subscription(self) -> Result<UserSubscription, DomainError> {
        self.subscription.ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "No subscription row for notified purchase",
            )
            .with_detail("vendor_transaction_id", self.purchase_token)
        })
    }

    fn period(&self) -> Result<SubscriptionPeriod, DomainError> {
        self.product.period.ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "Notified product carries no billing period",
            )
            .with_detail("product", self.product.name.clone())
        })
    }
}

impl GooglePlayWebhookHandler {
    pub fn new(
        ledger: Arc<dyn PurchaseLedger>,
        subscriptions: Arc<dyn SubscriptionRepository>,
        buyables: Arc<dyn BuyableRepository>,
        google_play: Arc<dyn GooglePlayClient>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            ledger,
            subscriptions,
            buyables,
            google_play,
            event_publisher,
        }
    }

    #[tracing::instrument(skip(self, cmd), fields(notification_id = %cmd.event.notification_id))]
    pub async fn handle(
        &self,
        cmd: HandleGooglePlayNotificationCommand,
    ) -> Result<WebhookOutcome, DomainError> {
        let event = &cmd.event;
        let now = Timestamp::now();

        use GooglePlayNotificationSubtype as Subtype;
        use GooglePlayNotificationType as Kind;

        let outcome = match (event.notification_type, event.subtype) {
            (Kind::Subscription, Subtype::Recovered) => {
                self.record_renewal(event, &cmd.raw_body, true, now).await?
            }
            (Kind::Subscription, Subtype::Renewed) => {
                self.record_renewal(event, &cmd.raw_body, false, now).await?
            }
            (Kind::Subscription, Subtype::Canceled) => self.cancel(event, now).await?,
            (Kind::Subscription, Subtype::Purchased) => self.ensure_subscription(event).await?,
            (Kind::Subscription, Subtype::OnHold)
            | (Kind::Subscription, Subtype::Paused) => self.suspend(event, now).await?,
            (Kind::Subscription, Subtype::InGracePeriod) => self.ensure_active(event, now).await?,
            (Kind::Subscription, Subtype::Restarted)
            | (Kind::Subscription, Subtype::PauseScheduleChanged) => {
                self.renew(event, now).await?
            }
            (Kind::Subscription, Subtype::PriceChangeConfirmed) => {
                self.log_price_change(event).await?
            }
            (Kind::Subscription, Subtype::Deferred) => self.extend_expiration(event, now).await?,
            (Kind::Subscription, Subtype::Revoked)
            | (Kind::Subscription, Subtype::Expired) => self.expire(event, now).await?,
            (Kind::Subscription, Subtype::None) | (Kind::Test, _) => WebhookOutcome::NoOp,
            _ => {
                tracing::info!(
                    vendor = PaymentVendor::GooglePlay.as_str(),
                    notification_type = %event.notification_type,
                    notification_subtype = %event.subtype,
                    "Unhandled notification"
                );
                WebhookOutcome::Ignored
            }
        };

        tracing::info!(
            vendor = PaymentVendor::GooglePlay.as_str(),
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            action = outcome.action(),
            "Webhook is handled"
        );
        Ok(outcome)
    }

    /// Resolves the ledger and catalog rows behind a subscription
    /// notification. The purchase token doubles as the lineage key.
    async fn resolve(
        &self,
        event: &GooglePlayNotification,
    ) -> Result<NotificationContext, DomainError> {
        let purchase_token = event
            .purchase_token()
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InternalError,
                    "Subscription notification carries no purchase token",
                )
            })?
            .to_string();
        let original_transaction = self
            .ledger
            .find_transaction(PaymentVendor::GooglePlay, &purchase_token)
            .await?
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::InternalError,
                    "Payment transaction not created yet",
                )
                .with_detail("vendor_transaction_id", purchase_token.clone())
            })?;

        let product_key = event.subscription_product().ok_or_else(|| {
            DomainError::new(
                ErrorCode::InternalError,
                "Subscription notification carries no product key",
            )
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
            .find_latest_for_purchase_and_buyable(&original_transaction.purchase_id, &product.id)
            .await?;

        Ok(NotificationContext {
            purchase_token,
            original_transaction,
            product,
            subscription,
        })
    }

    /// RECOVERED / RENEWED: record the renewal on the ledger and extend
    /// the entitlement. Recovery counts the new period from today, a
    /// routine renewal from the current expiration.
    async fn record_renewal(
        &self,
        event: &GooglePlayNotification,
        raw_body: &JsonValue,
        from_now: bool,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let period = ctx.period()?;
        let renewal_id = format!("{}-{}", now.as_unix_secs(), ctx.purchase_token);
        let renewal = ctx.original_transaction.renewal(
            TransactionId::new(),
            renewal_id,
            Some(raw_body.clone()),
        );

        let mut subscription = ctx.subscription()?;
        if from_now {
            subscription.renew_from_now(period, now);
        } else {
            subscription.renew(period, now);
        }
        // One atomic write: the ledger row and the extension land
        // together or not at all. A redelivered notification synthesizes
        // the same second-stamped id and is absorbed by the uniqueness
        // constraint while still converging the subscription.
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

        Ok(WebhookOutcome::Applied {
            action: if from_now { "renew_from_now" } else { "renew" },
        })
    }

    /// RESTARTED / PAUSE_SCHEDULE_CHANGED: extend without a new ledger row.
    async fn renew(
        &self,
        event: &GooglePlayNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let period = ctx.period()?;
        let mut subscription = ctx.subscription()?;
        subscription.renew(period, now);
        self.subscriptions.update(&subscription).await?;

        self.publish(SubscriptionEvent::Renewed {
            event_id: EventId::new(),
            subscription_id: subscription.id,
            user_id: subscription.user_id.clone(),
            new_expiration: subscription.expiration_date,
            occurred_at: now,
        })
        .await?;
        Ok(WebhookOutcome::Applied { action: "renew" })
    }

    /// CANCELED: auto-renew was turned off; entitlement runs out on its own.
    async fn cancel(
        &self,
        event: &GooglePlayNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let mut subscription = self.resolve(event).await?.subscription()?;
        if subscription.cancel(now) {
            self.subscriptions.update(&subscription).await?;
            self.publish(SubscriptionEvent::Canceled {
                event_id: EventId::new(),
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                occurred_at: now,
            })
            .await?;
        }
        Ok(WebhookOutcome::Applied { action: "cancel" })
    }

    /// ON_HOLD / PAUSED: billing stopped, access withheld until resolved.
    async fn suspend(
        &self,
        event: &GooglePlayNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let mut subscription = self.resolve(event).await?.subscription()?;
        if subscription.suspend(now) {
            self.subscriptions.update(&subscription).await?;
            self.publish(SubscriptionEvent::Suspended {
                event_id: EventId::new(),
                subscription_id: subscription.id,
                user_id: subscription.user_id.clone(),
                occurred_at: now,
            })
            .await?;
        }
        Ok(WebhookOutcome::Applied { action: "suspend" })
    }

    /// IN_GRACE_PERIOD: the user keeps access while Google retries payment.
    async fn ensure_active(
        &self,
        event: &GooglePlayNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let mut subscription = self.resolve(event).await?.subscription()?;
        if subscription.ensure_active(now) {
            self.subscriptions.update(&subscription).await?;
        }
        Ok(WebhookOutcome::Applied {
            action: "ensure_active",
        })
    }

    /// REVOKED / EXPIRED: the entitlement ends now.
    async fn expire(
        &self,
        event: &GooglePlayNotification,
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

    /// PURCHASED: the receipt path should already have created the row.
    /// A missing row is diagnosed loudly but mutates nothing; the store
    /// redelivers webhooks and an error here would make it retry forever.
    async fn ensure_subscription(
        &self,
        event: &GooglePlayNotification,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        if ctx.subscription.is_none() {
            tracing::error!(
                vendor = PaymentVendor::GooglePlay.as_str(),
                payment_transaction_id = %ctx.original_transaction.id,
                vendor_transaction_id = %ctx.purchase_token,
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

    /// PRICE_CHANGE_CONFIRMED: fetch the accepted price and log it. No
    /// local state changes; the catalog price is an admin concern.
    async fn log_price_change(
        &self,
        event: &GooglePlayNotification,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let info = self
            .google_play
            .get_subscription_info(&ctx.product.name, &ctx.purchase_token)
            .await?;

        let new_price = info
            .get("priceChange")
            .and_then(|c| c.get("newPrice"))
            .ok_or_else(|| {
                DomainError::new(
                    ErrorCode::StoreProviderError,
                    "Subscription info carries no new price",
                )
            })?;
        let micros = price_micros(new_price)?;
        let currency_code = new_price
            .get("currency")
            .and_then(JsonValue::as_str)
            .unwrap_or_default();
        let currency = Currency::new(currency_code).map_err(|e| {
            DomainError::new(ErrorCode::StoreProviderError, e.to_string())
        })?;
        let price = Money::from_micros(micros, currency);

        tracing::info!(
            price = %price.to_major_string(),
            currency = currency_code,
            vendor = PaymentVendor::GooglePlay.as_str(),
            payment_transaction_id = %ctx.original_transaction.id,
            vendor_transaction_id = %ctx.purchase_token,
            notification_type = %event.notification_type,
            notification_subtype = %event.subtype,
            notification_id = %event.notification_id,
            "User accepted price change"
        );
        Ok(WebhookOutcome::Applied {
            action: "price_change_logged",
        })
    }

    /// DEFERRED: the store moved the billing date; adopt its expiry.
    async fn extend_expiration(
        &self,
        event: &GooglePlayNotification,
        now: Timestamp,
    ) -> Result<WebhookOutcome, DomainError> {
        let ctx = self.resolve(event).await?;
        let info = self
            .google_play
            .get_subscription_info(&ctx.product.name, &ctx.purchase_token)
            .await?;
        let expiry = expiry_time(&info)?;

        let mut subscription = ctx.subscription()?;
        subscription.update_expiration(expiry, now);
        self.subscriptions.update(&subscription).await?;
        Ok(WebhookOutcome::Applied {
            action: "extend_expiration",
        })
    }

    async fn publish(&self, event: SubscriptionEvent) -> Result<(), DomainError> {
        self.event_publisher.publish(event.to_envelope()).await
    }
}

/// `priceMicros` arrives as a decimal string.
fn price_micros(new_price: &JsonValue) -> Result<i64, DomainError> {
    new_price
        .get("priceMicros")
        .and_then(|v| match v {
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Number(n) => n.as_i64(),
            _ => None,
        })
        .ok_or_else(|| {
            DomainError::new(
                ErrorCode::StoreProviderError,
                "Subscription info carries no priceMicros",
            )
        })
}

/// `expiryTimeMillis` arrives as a decimal string.
fn expiry_time(info: &JsonValue) -> Result<Timestamp, DomainError> {
    info.get("expiryTimeMillis")
        .and_then(|v| match v {
            JsonValue::String(s) => s.parse().ok(),
            JsonValue::Number(n) => n.as_i64(),
            _ => None,
        })
        .and_then(Timestamp::from_unix_millis)
        .ok_or_else(|| {
            DomainError::new(
                ErrorCode::StoreProviderError,
                "Subscription info carries no expiryTimeMillis",
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::BuyableType;
    use crate::domain::foundation::{BuyableId, PurchaseId, SubscriptionId, UserId};
    use crate::domain::ledger::{PaymentStatus, Purchase, TransactionPricing};
    use crate::domain::subscription::SubscriptionStatus;
    use crate::ports::CommitOutcome;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // ════════════════════════════════════════════════════════════════════════════
    // Mocks
    // ════════════════════════════════════════════════════════════════════════════

    #[derive(Default)]
    struct MockLedger {
        transactions: Mutex<HashMap<String, PaymentTransaction>>,
        recorded: Mutex<Vec<PaymentTransaction>>,
        subscriptions: Option<Arc<MockSubscriptions>>,
    }

    impl MockLedger {
        fn with_transaction(token: &str, transaction: PaymentTransaction) -> Self {
            let ledger = Self::default();
            ledger
                .transactions
                .lock()
                .unwrap()
                .insert(token.to_string(), transaction);
            ledger
        }

        fn recorded_rows(&self) -> Vec<PaymentTransaction> {
            self.recorded.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PurchaseLedger for MockLedger {
        async fn commit_purchase(
            &self,
            _purchase: &Purchase,
            _transaction: &PaymentTransaction,
        ) -> Result<CommitOutcome, DomainError> {
            Ok(CommitOutcome::Committed)
        }

        async fn record_transaction(
            &self,
            transaction: &PaymentTransaction,
        ) -> Result<CommitOutcome, DomainError> {
            self.recorded.lock().unwrap().push(transaction.clone());
            Ok(CommitOutcome::Committed)
        }

        async fn record_transaction_with_subscription(
            &self,
            transaction: &PaymentTransaction,
            subscription: &UserSubscription,
        ) -> Result<CommitOutcome, DomainError> {
            // All or nothing: a refused subscription write keeps the
            // transaction off the ledger too.
            if let Some(subscriptions) = &self.subscriptions {
                subscriptions.update(subscription).await?;
            }
            let duplicate = transaction
                .vendor_transaction_id
                .as_ref()
                .is_some_and(|id| self.transactions.lock().unwrap().contains_key(id));
            if duplicate {
                return Ok(CommitOutcome::DuplicateTransaction);
            }
            if let Some(id) = transaction.vendor_transaction_id.clone() {
                self.transactions
                    .lock()
                    .unwrap()
                    .insert(id, transaction.clone());
            }
            self.recorded.lock().unwrap().push(transaction.clone());
            Ok(CommitOutcome::Committed)
        }

        async fn find_purchase_by_id(
            &self,
            _id: &PurchaseId,
        ) -> Result<Option<Purchase>, DomainError> {
            Ok(None)
        }

        async fn find_reusable_purchase(
            &self,
            _user_id: &UserId,
            _buyable_id: &BuyableId,
            _vendor: PaymentVendor,
        ) -> Result<Option<Purchase>, DomainError> {
            Ok(None)
        }

        async fn find_purchase_by_original_transaction(
            &self,
            _vendor: PaymentVendor,
            _original_transaction_id: &str,
        ) -> Result<Option<Purchase>, DomainError> {
            Ok(None)
        }

        async fn find_transaction(
            &self,
            _vendor: PaymentVendor,
            vendor_transaction_id: &str,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .get(vendor_transaction_id)
                .cloned())
        }

        async fn latest_transaction_for_purchase(
            &self,
            _purchase_id: &PurchaseId,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct MockSubscriptions {
        for_purchase: Mutex<Option<UserSubscription>>,
        updated: Mutex<Vec<UserSubscription>>,
        fail_updates: bool,
    }

    impl MockSubscriptions {
        fn with_subscription(subscription: UserSubscription) -> Self {
            let repo = Self::default();
            *repo.for_purchase.lock().unwrap() = Some(subscription);
            repo
        }

        fn failing_updates(mut self) -> Self {
            self.fail_updates = true;
            self
        }

        fn updated_rows(&self) -> Vec<UserSubscription> {
            self.updated.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubscriptionRepository for MockSubscriptions {
        async fn insert(&self, _subscription: &UserSubscription) -> Result<(), DomainError> {
            Ok(())
        }

        async fn update(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
            if self.fail_updates {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    "Simulated update failure",
                ));
            }
            self.updated.lock().unwrap().push(subscription.clone());
            Ok(())
        }

        async fn save_all(
            &self,
            updates: &[UserSubscription],
            _inserts: &[UserSubscription],
        ) -> Result<(), DomainError> {
            if self.fail_updates {
                return Err(DomainError::new(
                    ErrorCode::DatabaseError,
                    "Simulated update failure",
                ));
            }
            self.updated.lock().unwrap().extend_from_slice(updates);
            Ok(())
        }

        async fn find_by_id(
            &self,
            _id: &SubscriptionId,
        ) -> Result<Option<UserSubscription>, DomainError> {
            Ok(None)
        }

        async fn find_active_for_user(
            &self,
            _user_id: &UserId,
            _now: Timestamp,
        ) -> Result<Option<UserSubscription>, DomainError> {
            Ok(None)
        }

        async fn find_latest_for_user(
            &self,
            _user_id: &UserId,
        ) -> Result<Option<UserSubscription>, DomainError> {
            Ok(None)
        }

        async fn find_latest_for_purchase_and_buyable(
            &self,
            _purchase_id: &PurchaseId,
            _buyable_id: &BuyableId,
        ) -> Result<Option<UserSubscription>, DomainError> {
            Ok(self.for_purchase.lock().unwrap().clone())
        }

        async fn delete(&self, _id: &SubscriptionId) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct MockCatalog {
        buyables: Vec<Buyable>,
    }

    #[async_trait]
    impl BuyableRepository for MockCatalog {
        async fn find_by_name(&self, name: &str) -> Result<Option<Buyable>, DomainError> {
            Ok(self.buyables.iter().find(|b| b.name == name).cloned())
        }

        async fn find_by_id(&self, id: &BuyableId) -> Result<Option<Buyable>, DomainError> {
            Ok(self.buyables.iter().find(|b| &b.id == id).cloned())
        }

        async fn find_by_ids(&self, ids: &[BuyableId]) -> Result<Vec<Buyable>, DomainError> {
            Ok(self
                .buyables
                .iter()
                .filter(|b| ids.contains(&b.id))
                .cloned()
                .collect())
        }
    }

    #[derive(Default)]
    struct MockGooglePlay {
        response: Option<JsonValue>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockGooglePlay {
        fn with_response(response: JsonValue) -> Self {
            Self {
                response: Some(response),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl GooglePlayClient for MockGooglePlay {
        async fn get_subscription_info(
            &self,
            product_name: &str,
            purchase_token: &str,
        ) -> Result<JsonValue, DomainError> {
            self.calls
                .lock()
                .unwrap()
                .push((product_name.to_string(), purchase_token.to_string()));
            self.response.clone().ok_or_else(|| {
                DomainError::new(ErrorCode::StoreProviderError, "No canned response")
            })
        }
    }

    #[derive(Default)]
    struct MockPublisher {
        published: Mutex<Vec<crate::domain::foundation::EventEnvelope>>,
    }

    impl MockPublisher {
        fn event_types(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|e| e.event_type.clone())
                .collect()
        }
    }

    #[async_trait]
    impl EventPublisher for MockPublisher {
        async fn publish(
            &self,
            event: crate::domain::foundation::EventEnvelope,
        ) -> Result<(), DomainError> {
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        async fn publish_all(
            &self,
            events: Vec<crate::domain::foundation::EventEnvelope>,
        ) -> Result<(), DomainError> {
            self.published.lock().unwrap().extend(events);
            Ok(())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    const TOKEN: &str = "gpa-token-001";

    fn user() -> UserId {
        UserId::new("user-gp-1").unwrap()
    }

    fn monthly() -> Buyable {
        Buyable::subscription(
            BuyableId::new(),
            "premium_monthly".to_string(),
            BuyableType::PersonalSubscription,
            Money::from_major_str("9.99", Currency::new("USD").unwrap()).unwrap(),
            SubscriptionPeriod::Monthly,
            0,
        )
        .unwrap()
    }

    fn original_transaction(purchase_id: PurchaseId) -> PaymentTransaction {
        let usd = Currency::new("USD").unwrap();
        PaymentTransaction::record(
            TransactionId::new(),
            purchase_id,
            TransactionPricing::new(
                Money::from_major_str("9.99", usd.clone()).unwrap(),
                Money::from_major_str("9.99", usd.clone()).unwrap(),
                Money::zero(usd),
                0,
            )
            .unwrap(),
            PaymentVendor::GooglePlay,
            PaymentStatus::Succeeded,
            Some(TOKEN.to_string()),
            None,
            None,
        )
    }

    fn subscription_row(product: &Buyable, purchase_id: PurchaseId) -> UserSubscription {
        UserSubscription::create(SubscriptionId::new(), user(), product, purchase_id, Timestamp::now())
            .unwrap()
    }

    fn event(subtype_code: i64) -> GooglePlayNotification {
        let data = json!({
            "version": "1.0",
            "packageName": "com.example.app",
            "subscriptionNotification": {
                "version": "1.0",
                "notificationType": subtype_code,
                "purchaseToken": TOKEN,
                "subscriptionId": "premium_monthly"
            }
        });
        let (notification_type, subtype) =
            GooglePlayNotificationType::classify(&data).unwrap();
        GooglePlayNotification {
            notification_type,
            subtype,
            notification_id: "msg-1".to_string(),
            data,
            published_at: Timestamp::now(),
        }
    }

    struct Fixture {
        handler: GooglePlayWebhookHandler,
        ledger: Arc<MockLedger>,
        subscriptions: Arc<MockSubscriptions>,
        publisher: Arc<MockPublisher>,
    }

    fn fixture(
        product: Buyable,
        mut ledger: MockLedger,
        subscriptions: MockSubscriptions,
        google_play: MockGooglePlay,
    ) -> Fixture {
        let subscriptions = Arc::new(subscriptions);
        ledger.subscriptions = Some(subscriptions.clone());
        let ledger = Arc::new(ledger);
        let publisher = Arc::new(MockPublisher::default());
        let handler = GooglePlayWebhookHandler::new(
            ledger.clone(),
            subscriptions.clone(),
            Arc::new(MockCatalog {
                buyables: vec![product],
            }),
            Arc::new(google_play),
            publisher.clone(),
        );
        Fixture {
            handler,
            ledger,
            subscriptions,
            publisher,
        }
    }

    fn command(subtype_code: i64) -> HandleGooglePlayNotificationCommand {
        HandleGooglePlayNotificationCommand {
            event: event(subtype_code),
            raw_body: json!({ "message": { "messageId": "msg-1" } }),
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Renewal Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn renewed_records_transaction_and_extends_by_one_period() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let original = original_transaction(purchase_id);
        let subscription = subscription_row(&product, purchase_id);
        let old_expiration = subscription.expiration_date;
        let f = fixture(
            product,
            MockLedger::with_transaction(TOKEN, original),
            MockSubscriptions::with_subscription(subscription),
            MockGooglePlay::default(),
        );

        let outcome = f.handler.handle(command(2)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::Applied { action: "renew" });
        let recorded = f.ledger.recorded_rows();
        assert_eq!(recorded.len(), 1);
        assert!(recorded[0]
            .vendor_transaction_id
            .as_deref()
            .unwrap()
            .ends_with(&format!("-{}", TOKEN)));
        assert_eq!(recorded[0].status, PaymentStatus::Succeeded);

        let updated = f.subscriptions.updated_rows();
        assert_eq!(updated.len(), 1);
        assert_eq!(
            updated[0].expiration_date,
            SubscriptionPeriod::Monthly.advance(old_expiration)
        );
        assert_eq!(updated[0].status, SubscriptionStatus::Active);
        assert_eq!(f.publisher.event_types(), vec!["subscription.renewed.v1"]);
    }

    #[tokio::test]
    async fn failed_renewal_extension_leaves_no_ledger_row() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let f = fixture(
            product.clone(),
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription_row(&product, purchase_id))
                .failing_updates(),
            MockGooglePlay::default(),
        );

        let result = f.handler.handle(command(2)).await;

        assert!(result.is_err());
        // The renewal and the extension land together or not at all
        assert!(f.ledger.recorded_rows().is_empty());
        assert!(f.subscriptions.updated_rows().is_empty());
        assert!(f.publisher.event_types().is_empty());
    }

    #[tokio::test]
    async fn recovered_extends_from_today() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let mut subscription = subscription_row(&product, purchase_id);
        subscription.expiration_date = Timestamp::now().minus_days(10);
        subscription.status = SubscriptionStatus::Suspended;
        let f = fixture(
            product,
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription),
            MockGooglePlay::default(),
        );

        let outcome = f.handler.handle(command(1)).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                action: "renew_from_now"
            }
        );
        let updated = f.subscriptions.updated_rows();
        assert_eq!(updated[0].status, SubscriptionStatus::Active);
        // One month out from today, not from the lapsed expiration
        assert!(updated[0].expiration_date.is_after(&Timestamp::now().add_days(27)));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Status Change Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn canceled_marks_subscription_canceled() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let f = fixture(
            product.clone(),
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription_row(&product, purchase_id)),
            MockGooglePlay::default(),
        );

        f.handler.handle(command(3)).await.unwrap();

        let updated = f.subscriptions.updated_rows();
        assert_eq!(updated[0].status, SubscriptionStatus::Canceled);
        assert_eq!(f.publisher.event_types(), vec!["subscription.canceled.v1"]);
    }

    #[tokio::test]
    async fn on_hold_and_paused_suspend() {
        for code in [5, 10] {
            let product = monthly();
            let purchase_id = PurchaseId::new();
            let f = fixture(
                product.clone(),
                MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
                MockSubscriptions::with_subscription(subscription_row(&product, purchase_id)),
                MockGooglePlay::default(),
            );

            f.handler.handle(command(code)).await.unwrap();

            let updated = f.subscriptions.updated_rows();
            assert_eq!(updated[0].status, SubscriptionStatus::Suspended, "code {}", code);
        }
    }

    #[tokio::test]
    async fn revoked_expires_immediately() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let f = fixture(
            product.clone(),
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription_row(&product, purchase_id)),
            MockGooglePlay::default(),
        );

        f.handler.handle(command(12)).await.unwrap();

        let updated = f.subscriptions.updated_rows();
        assert_eq!(updated[0].status, SubscriptionStatus::Expired);
        assert!(!updated[0].expiration_date.is_after(&Timestamp::now()));
        assert_eq!(f.publisher.event_types(), vec!["subscription.expired.v1"]);
    }

    #[tokio::test]
    async fn expired_on_already_expired_row_writes_nothing() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let mut subscription = subscription_row(&product, purchase_id);
        subscription.expiration_date = Timestamp::now().minus_days(5);
        subscription.status = SubscriptionStatus::Expired;
        let f = fixture(
            product,
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription),
            MockGooglePlay::default(),
        );

        f.handler.handle(command(13)).await.unwrap();

        assert!(f.subscriptions.updated_rows().is_empty());
        assert!(f.publisher.event_types().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Enrichment Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn deferred_adopts_store_expiry() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let new_expiry = Timestamp::now().add_days(45);
        let f = fixture(
            product.clone(),
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription_row(&product, purchase_id)),
            MockGooglePlay::with_response(json!({
                "expiryTimeMillis": new_expiry.as_unix_millis().to_string()
            })),
        );

        let outcome = f.handler.handle(command(9)).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                action: "extend_expiration"
            }
        );
        let updated = f.subscriptions.updated_rows();
        assert_eq!(
            updated[0].expiration_date.as_unix_millis(),
            new_expiry.as_unix_millis()
        );
    }

    #[tokio::test]
    async fn price_change_logs_without_mutation() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let f = fixture(
            product.clone(),
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription_row(&product, purchase_id)),
            MockGooglePlay::with_response(json!({
                "priceChange": {
                    "newPrice": { "priceMicros": "10990000", "currency": "USD" }
                }
            })),
        );

        let outcome = f.handler.handle(command(8)).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                action: "price_change_logged"
            }
        );
        assert!(f.subscriptions.updated_rows().is_empty());
        assert!(f.ledger.recorded_rows().is_empty());
    }

    #[tokio::test]
    async fn failed_enrichment_call_aborts_without_mutation() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let f = fixture(
            product.clone(),
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::with_subscription(subscription_row(&product, purchase_id)),
            MockGooglePlay::default(),
        );

        let result = f.handler.handle(command(9)).await;

        assert!(result.is_err());
        assert!(f.subscriptions.updated_rows().is_empty());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Safety Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn purchased_without_local_subscription_is_diagnosed_not_fatal() {
        let product = monthly();
        let purchase_id = PurchaseId::new();
        let f = fixture(
            product,
            MockLedger::with_transaction(TOKEN, original_transaction(purchase_id)),
            MockSubscriptions::default(),
            MockGooglePlay::default(),
        );

        let outcome = f.handler.handle(command(4)).await.unwrap();

        assert_eq!(
            outcome,
            WebhookOutcome::Applied {
                action: "ensure_subscription"
            }
        );
        assert!(f.subscriptions.updated_rows().is_empty());
    }

    #[tokio::test]
    async fn unknown_subtype_is_a_no_op() {
        let f = fixture(
            monthly(),
            MockLedger::default(),
            MockSubscriptions::default(),
            MockGooglePlay::default(),
        );

        let outcome = f.handler.handle(command(99)).await.unwrap();

        assert_eq!(outcome, WebhookOutcome::NoOp);
        assert!(f.subscriptions.updated_rows().is_empty());
        assert!(f.ledger.recorded_rows().is_empty());
    }

    #[tokio::test]
    async fn test_notification_is_a_no_op() {
        let data = json!({ "testNotification": { "version": "1.0" } });
        let (notification_type, subtype) =
            GooglePlayNotificationType::classify(&data).unwrap();
        let f = fixture(
            monthly(),
            MockLedger::default(),
            MockSubscriptions::default(),
            MockGooglePlay::default(),
        );

        let outcome = f
            .handler
            .handle(HandleGooglePlayNotificationCommand {
                event: GooglePlayNotification {
                    notification_type,
                    subtype,
                    notification_id: "msg-test".to_string(),
                    data,
                    published_at: Timestamp::now(),
                },
                raw_body: json!({}),
            })
            .await
            .unwrap();

        assert_eq!(outcome, WebhookOutcome::NoOp);
    }

    #[tokio::test]
    async fn renewal_without_ledger_row_is_an_internal_error() {
        let f = fixture(
            monthly(),
            MockLedger::default(),
            MockSubscriptions::default(),
            MockGooglePlay::default(),
        );

        let err = f.handler.handle(command(2)).await.unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
    }
}
