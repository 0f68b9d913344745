//! End-to-end reconciliation flow over in-memory fakes.
//!
//! Drives the full subscription lifecycle the way production traffic
//! does: a store client submits a receipt, Google Play pushes renewal
//! and cancellation notifications, and the entitlement read reconciles
//! what is left. The fakes enforce the same idempotency and one-live-row
//! rules the postgres schema does.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Value as JsonValue};

use subsync::adapters::google_play::GooglePlayNotificationVerifier;
use subsync::adapters::InMemoryEventBus;
use subsync::application::handlers::notifications::{
    GooglePlayWebhookHandler, HandleGooglePlayNotificationCommand, WebhookOutcome,
};
use subsync::application::handlers::purchase::{
    MakePurchaseCommand, MakePurchaseHandler, MakePurchaseResult, PurchaseStrategyFactory,
    StrategyServices,
};
use subsync::application::handlers::subscription::{
    ApplyPaidTransactionHandler, GetSubscriptionHandler, GetSubscriptionQuery,
};
use subsync::domain::catalog::{Buyable, BuyableType, SubscriptionPeriod};
use subsync::domain::foundation::{
    BuyableId, CommandMetadata, Currency, DomainError, ErrorCode, Money, PurchaseId,
    SubscriptionId, Timestamp, UserId,
};
use subsync::domain::ledger::{PaymentTransaction, PaymentVendor, Purchase};
use subsync::domain::subscription::{SubscriptionStatus, UserSubscription};
use subsync::ports::{
    AppStoreClient, BuyableRepository, CommitOutcome, GooglePlayClient, PurchaseLedger,
    SubscriptionRepository,
};

const TOKEN: &str = "gpa-token-1000";
const PRODUCT: &str = "premium_monthly";

// ════════════════════════════════════════════════════════════════════════════
// Stateful Fakes
// ════════════════════════════════════════════════════════════════════════════

struct FakeCatalog {
    buyables: Vec<Buyable>,
}

#[async_trait]
impl BuyableRepository for FakeCatalog {
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

/// Ledger fake honoring the `(vendor, vendor_transaction_id)` uniqueness.
///
/// Holds the subscription store so the combined renewal write can mirror
/// the single-transaction behavior of the postgres adapter: a refused
/// subscription write leaves the ledger untouched.
struct FakeLedger {
    purchases: Mutex<Vec<Purchase>>,
    transactions: Mutex<Vec<PaymentTransaction>>,
    subscriptions: Arc<FakeSubscriptions>,
}

impl FakeLedger {
    fn new(subscriptions: Arc<FakeSubscriptions>) -> Self {
        Self {
            purchases: Mutex::new(Vec::new()),
            transactions: Mutex::new(Vec::new()),
            subscriptions,
        }
    }

    fn transaction_count(&self) -> usize {
        self.transactions.lock().unwrap().len()
    }

    fn is_duplicate(&self, transaction: &PaymentTransaction) -> bool {
        let Some(vendor_id) = transaction.vendor_transaction_id.as_deref() else {
            return false;
        };
        self.transactions
            .lock()
            .unwrap()
            .iter()
            .any(|t| t.vendor == transaction.vendor
                && t.vendor_transaction_id.as_deref() == Some(vendor_id))
    }
}

#[async_trait]
impl PurchaseLedger for FakeLedger {
    async fn commit_purchase(
        &self,
        purchase: &Purchase,
        transaction: &PaymentTransaction,
    ) -> Result<CommitOutcome, DomainError> {
        if self.is_duplicate(transaction) {
            return Ok(CommitOutcome::DuplicateTransaction);
        }
        let mut purchases = self.purchases.lock().unwrap();
        if !purchases.iter().any(|p| p.id == purchase.id) {
            purchases.push(purchase.clone());
        }
        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn record_transaction(
        &self,
        transaction: &PaymentTransaction,
    ) -> Result<CommitOutcome, DomainError> {
        if self.is_duplicate(transaction) {
            return Ok(CommitOutcome::DuplicateTransaction);
        }
        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn record_transaction_with_subscription(
        &self,
        transaction: &PaymentTransaction,
        subscription: &UserSubscription,
    ) -> Result<CommitOutcome, DomainError> {
        // All or nothing: a refused subscription write keeps the
        // transaction off the ledger too.
        self.subscriptions.update(subscription).await?;
        if self.is_duplicate(transaction) {
            return Ok(CommitOutcome::DuplicateTransaction);
        }
        self.transactions.lock().unwrap().push(transaction.clone());
        Ok(CommitOutcome::Committed)
    }

    async fn find_purchase_by_id(&self, id: &PurchaseId) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .lock()
            .unwrap()
            .iter()
            .find(|p| &p.id == id)
            .cloned())
    }

    async fn find_reusable_purchase(
        &self,
        user_id: &UserId,
        buyable_id: &BuyableId,
        vendor: PaymentVendor,
    ) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                &p.user_id == user_id
                    && p.vendor == Some(vendor)
                    && p.items.iter().any(|i| &i.buyable_id == buyable_id)
            })
            .cloned())
    }

    async fn find_purchase_by_original_transaction(
        &self,
        vendor: PaymentVendor,
        original_transaction_id: &str,
    ) -> Result<Option<Purchase>, DomainError> {
        Ok(self
            .purchases
            .lock()
            .unwrap()
            .iter()
            .find(|p| {
                p.vendor == Some(vendor)
                    && p.original_transaction_id.as_deref() == Some(original_transaction_id)
            })
            .cloned())
    }

    async fn find_transaction(
        &self,
        vendor: PaymentVendor,
        vendor_transaction_id: &str,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .find(|t| {
                t.vendor == vendor
                    && t.vendor_transaction_id.as_deref() == Some(vendor_transaction_id)
            })
            .cloned())
    }

    async fn latest_transaction_for_purchase(
        &self,
        purchase_id: &PurchaseId,
    ) -> Result<Option<PaymentTransaction>, DomainError> {
        Ok(self
            .transactions
            .lock()
            .unwrap()
            .iter()
            .filter(|t| &t.purchase_id == purchase_id)
            .max_by_key(|t| t.created_at)
            .cloned())
    }
}

/// Subscription fake honoring the one-live-row-per-user rule.
#[derive(Default)]
struct FakeSubscriptions {
    rows: Mutex<Vec<UserSubscription>>,
    refuse_writes: Mutex<bool>,
}

impl FakeSubscriptions {
    fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    /// Simulates the database refusing subscription writes.
    fn refuse_writes(&self, refuse: bool) {
        *self.refuse_writes.lock().unwrap() = refuse;
    }

    fn check_writable(&self) -> Result<(), DomainError> {
        if *self.refuse_writes.lock().unwrap() {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "Simulated write failure",
            ));
        }
        Ok(())
    }
}

fn is_live(subscription: &UserSubscription) -> bool {
    matches!(
        subscription.status,
        SubscriptionStatus::Trial | SubscriptionStatus::Active
    )
}

#[async_trait]
impl SubscriptionRepository for FakeSubscriptions {
    async fn insert(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        if is_live(subscription)
            && rows
                .iter()
                .any(|r| r.user_id == subscription.user_id && is_live(r))
        {
            return Err(DomainError::new(
                ErrorCode::SubscriptionExists,
                "User already holds a live subscription",
            ));
        }
        rows.push(subscription.clone());
        Ok(())
    }

    async fn update(&self, subscription: &UserSubscription) -> Result<(), DomainError> {
        self.check_writable()?;
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|r| r.id == subscription.id)
            .ok_or_else(|| {
                DomainError::new(ErrorCode::SubscriptionNotFound, "No such subscription")
            })?;
        *row = subscription.clone();
        Ok(())
    }

    async fn save_all(
        &self,
        updates: &[UserSubscription],
        inserts: &[UserSubscription],
    ) -> Result<(), DomainError> {
        self.check_writable()?;
        for subscription in updates {
            self.update(subscription).await?;
        }
        for subscription in inserts {
            self.insert(subscription).await?;
        }
        Ok(())
    }

    async fn find_by_id(
        &self,
        id: &SubscriptionId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|r| &r.id == id)
            .cloned())
    }

    async fn find_active_for_user(
        &self,
        user_id: &UserId,
        now: Timestamp,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.user_id == user_id)
            .filter(|r| {
                is_live(r)
                    || (r.status == SubscriptionStatus::Canceled
                        && r.expiration_date.is_after(&now))
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn find_latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        let rows = self.rows.lock().unwrap();
        let live = rows
            .iter()
            .filter(|r| &r.user_id == user_id && is_live(r))
            .max_by_key(|r| r.created_at)
            .cloned();
        Ok(live.or_else(|| {
            rows.iter()
                .filter(|r| &r.user_id == user_id)
                .max_by_key(|r| r.created_at)
                .cloned()
        }))
    }

    async fn find_latest_for_purchase_and_buyable(
        &self,
        purchase_id: &PurchaseId,
        buyable_id: &BuyableId,
    ) -> Result<Option<UserSubscription>, DomainError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| &r.purchase_id == purchase_id && &r.buyable_id == buyable_id)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn delete(&self, id: &SubscriptionId) -> Result<(), DomainError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| &r.id != id);
        if rows.len() == before {
            return Err(DomainError::new(
                ErrorCode::SubscriptionNotFound,
                "No such subscription",
            ));
        }
        Ok(())
    }
}

struct StubGooglePlay;

#[async_trait]
impl GooglePlayClient for StubGooglePlay {
    async fn get_subscription_info(
        &self,
        _product_name: &str,
        _purchase_token: &str,
    ) -> Result<JsonValue, DomainError> {
        Ok(json!({}))
    }
}

struct StubAppStore;

#[async_trait]
impl AppStoreClient for StubAppStore {
    async fn get_transaction_info(&self, _transaction_id: &str) -> Result<JsonValue, DomainError> {
        Ok(json!({}))
    }

    async fn list_group_subscriptions(
        &self,
        _subscription_group_id: &str,
    ) -> Result<JsonValue, DomainError> {
        Ok(json!({}))
    }

    async fn list_subscription_prices(
        &self,
        _apple_product_id: &str,
        _country_code: &str,
    ) -> Result<JsonValue, DomainError> {
        Ok(json!({}))
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Harness
// ════════════════════════════════════════════════════════════════════════════

struct Harness {
    ledger: Arc<FakeLedger>,
    subscriptions: Arc<FakeSubscriptions>,
    events: Arc<InMemoryEventBus>,
    purchases: MakePurchaseHandler,
    webhooks: GooglePlayWebhookHandler,
    entitlements: GetSubscriptionHandler,
}

fn monthly_product() -> Buyable {
    Buyable::subscription(
        BuyableId::new(),
        PRODUCT.to_string(),
        BuyableType::PersonalSubscription,
        Money::from_major_str("9.99", Currency::new("USD").unwrap()).unwrap(),
        SubscriptionPeriod::Monthly,
        0,
    )
    .unwrap()
}

fn harness() -> Harness {
    let catalog = Arc::new(FakeCatalog {
        buyables: vec![monthly_product()],
    });
    let subscriptions = Arc::new(FakeSubscriptions::default());
    let ledger = Arc::new(FakeLedger::new(subscriptions.clone()));
    let events = Arc::new(InMemoryEventBus::new());
    let google_play = Arc::new(StubGooglePlay);

    let apply = Arc::new(ApplyPaidTransactionHandler::new(
        catalog.clone(),
        subscriptions.clone(),
        events.clone(),
    ));
    let strategies = PurchaseStrategyFactory::new(
        StrategyServices {
            buyables: catalog.clone(),
            subscriptions: subscriptions.clone(),
            ledger: ledger.clone(),
        },
        google_play.clone(),
        Arc::new(StubAppStore),
        false,
    );
    let purchases = MakePurchaseHandler::new(
        strategies,
        catalog.clone(),
        subscriptions.clone(),
        ledger.clone(),
        apply,
        events.clone(),
    );
    let webhooks = GooglePlayWebhookHandler::new(
        ledger.clone(),
        subscriptions.clone(),
        catalog.clone(),
        google_play,
        events.clone(),
    );
    let entitlements = GetSubscriptionHandler::new(subscriptions.clone(), catalog.clone());

    Harness {
        ledger,
        subscriptions,
        events,
        purchases,
        webhooks,
        entitlements,
    }
}

fn user() -> UserId {
    UserId::new("user-flow-1").unwrap()
}

fn purchase_command() -> MakePurchaseCommand {
    let receipt = json!({
        "Payload": {
            "json": { "purchaseToken": TOKEN, "productId": PRODUCT }
        }
    });
    MakePurchaseCommand {
        store: "GooglePlay".to_string(),
        transaction_id: TOKEN.to_string(),
        product_key: PRODUCT.to_string(),
        raw_product_data: json!({
            "purchasedProduct": {
                "receipt": receipt.to_string(),
                "metadata": { "localizedPrice": 9.99, "isoCurrencyCode": "USD" }
            }
        }),
        stored_payment_method_id: None,
    }
}

async fn submit_purchase(h: &Harness) -> MakePurchaseResult {
    h.purchases
        .handle(purchase_command(), CommandMetadata::new(user()))
        .await
        .unwrap()
}

/// Wraps a developer notification in the Pub/Sub push envelope and runs
/// it through the same verifier the webhook endpoint uses.
async fn try_deliver_notification(
    h: &Harness,
    subtype_code: i64,
    message_id: &str,
) -> Result<WebhookOutcome, DomainError> {
    let notification = json!({
        "version": "1.0",
        "packageName": "com.example.app",
        "subscriptionNotification": {
            "version": "1.0",
            "notificationType": subtype_code,
            "purchaseToken": TOKEN,
            "subscriptionId": PRODUCT
        }
    });
    let body = json!({
        "message": {
            "data": BASE64.encode(notification.to_string()),
            "messageId": message_id,
            "publishTime": "2026-08-24T10:15:30.301Z"
        },
        "subscription": "projects/example/subscriptions/play-billing"
    });

    let event = GooglePlayNotificationVerifier::parse(&body).unwrap();
    h.webhooks
        .handle(HandleGooglePlayNotificationCommand {
            event,
            raw_body: body,
        })
        .await
}

async fn deliver_notification(h: &Harness, subtype_code: i64, message_id: &str) -> WebhookOutcome {
    try_deliver_notification(h, subtype_code, message_id)
        .await
        .unwrap()
}

// ════════════════════════════════════════════════════════════════════════════
// Flow Tests
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn purchase_opens_subscription_and_entitlement_reads_back() {
    let h = harness();

    let result = submit_purchase(&h).await;

    let MakePurchaseResult::Recorded {
        transaction,
        subscription,
    } = result
    else {
        panic!("first submission must be recorded");
    };
    assert_eq!(transaction.vendor, PaymentVendor::GooglePlay);
    assert_eq!(transaction.vendor_transaction_id.as_deref(), Some(TOKEN));
    let subscription = subscription.expect("subscription product opens an entitlement");
    assert_eq!(subscription.status, SubscriptionStatus::Active);
    assert!(h.events.has_event("billing.purchase_recorded.v1"));

    let view = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(view.subscription.id, subscription.id);
    assert_eq!(view.period, SubscriptionPeriod::Monthly);
    assert!(view.subscription.expiration_date.is_after(&Timestamp::now()));
}

#[tokio::test]
async fn resubmitted_receipt_is_absorbed() {
    let h = harness();

    submit_purchase(&h).await;
    let second = submit_purchase(&h).await;

    assert!(matches!(second, MakePurchaseResult::AlreadyProcessed));
    assert_eq!(h.ledger.transaction_count(), 1);
    assert_eq!(h.subscriptions.row_count(), 1);
}

#[tokio::test]
async fn renewal_notification_extends_the_entitlement() {
    let h = harness();
    submit_purchase(&h).await;
    let opened = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    let first_expiration = opened.subscription.expiration_date;

    let outcome = deliver_notification(&h, 2, "msg-renewal-1").await;

    assert_eq!(outcome, WebhookOutcome::Applied { action: "renew" });
    // Renewal lands on the ledger next to the original transaction
    assert_eq!(h.ledger.transaction_count(), 2);

    let renewed = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(renewed.subscription.status, SubscriptionStatus::Active);
    assert_eq!(
        renewed.subscription.expiration_date,
        SubscriptionPeriod::Monthly.advance(first_expiration)
    );
    assert!(h.events.has_event("subscription.renewed.v1"));
}

#[tokio::test]
async fn failed_renewal_write_leaves_ledger_and_entitlement_in_step() {
    let h = harness();
    submit_purchase(&h).await;
    let opened = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    let first_expiration = opened.subscription.expiration_date;

    // The extension write is refused: the renewal must not reach the
    // ledger either
    h.subscriptions.refuse_writes(true);
    let result = try_deliver_notification(&h, 2, "msg-renewal-fail-1").await;
    assert!(result.is_err());
    assert_eq!(h.ledger.transaction_count(), 1);

    h.subscriptions.refuse_writes(false);
    let unchanged = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(unchanged.subscription.expiration_date, first_expiration);

    // The store redelivers and the renewal lands whole
    let outcome = deliver_notification(&h, 2, "msg-renewal-fail-2").await;
    assert_eq!(outcome, WebhookOutcome::Applied { action: "renew" });
    assert_eq!(h.ledger.transaction_count(), 2);
    let renewed = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(
        renewed.subscription.expiration_date,
        SubscriptionPeriod::Monthly.advance(first_expiration)
    );
}

#[tokio::test]
async fn cancellation_keeps_access_until_expiry_then_revocation_closes_it() {
    let h = harness();
    submit_purchase(&h).await;

    deliver_notification(&h, 3, "msg-cancel-1").await;

    // Auto-renew off: the paid window stays readable until it runs out
    let canceled = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(canceled.subscription.status, SubscriptionStatus::Canceled);
    assert!(canceled
        .subscription
        .expiration_date
        .is_after(&Timestamp::now()));
    assert!(h.events.has_event("subscription.canceled.v1"));

    deliver_notification(&h, 12, "msg-revoke-1").await;

    let revoked = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(revoked.subscription.status, SubscriptionStatus::Expired);
    assert!(!revoked
        .subscription
        .expiration_date
        .is_after(&Timestamp::now()));
    assert!(h.events.has_event("subscription.expired.v1"));
}

#[tokio::test]
async fn suspension_withholds_renewal_restores() {
    let h = harness();
    submit_purchase(&h).await;

    deliver_notification(&h, 5, "msg-hold-1").await;
    let held = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(held.subscription.status, SubscriptionStatus::Suspended);

    // RECOVERED restarts the paid window from today
    let outcome = deliver_notification(&h, 1, "msg-recover-1").await;
    assert_eq!(
        outcome,
        WebhookOutcome::Applied {
            action: "renew_from_now"
        }
    );
    let recovered = h
        .entitlements
        .handle(GetSubscriptionQuery { user_id: user() })
        .await
        .unwrap();
    assert_eq!(recovered.subscription.status, SubscriptionStatus::Active);
    assert!(recovered
        .subscription
        .expiration_date
        .is_after(&Timestamp::now().add_days(27)));
}
