//! Axum router configuration for billing endpoints.
//!
//! This module defines the route structure for billing-related API endpoints
//! and wires them to their corresponding handlers.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    get_subscription, handle_app_store_webhook, handle_google_play_webhook, submit_purchase,
    BillingAppState,
};

/// Create the billing API router.
///
/// # Routes
///
/// ## User Endpoints (require authentication)
/// - `POST /purchases` - Record a store purchase from a submitted receipt
/// - `GET /subscription` - Get current user's reconciled subscription
///
/// ## Webhook Endpoints (no auth; vendors are always acknowledged)
/// - `POST /webhooks/google-play` - Handle Google Play Pub/Sub pushes
/// - `POST /webhooks/app-store` - Handle App Store server notifications
pub fn billing_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/purchases", post(submit_purchase))
        .route("/subscription", get(get_subscription))
}

/// Create the store webhook router.
///
/// This is separate from the main billing routes because webhooks don't
/// carry user authentication; the vendors push directly.
///
/// # Routes
/// - `POST /google-play` - Handle Google Play Pub/Sub pushes
/// - `POST /app-store` - Handle App Store server notifications
pub fn webhook_routes() -> Router<BillingAppState> {
    Router::new()
        .route("/google-play", post(handle_google_play_webhook))
        .route("/app-store", post(handle_app_store_webhook))
}

/// Create the complete billing module router.
///
/// Combines user routes and webhook routes into a single router
/// suitable for mounting at `/api`.
///
/// # Example
///
/// ```ignore
/// use axum::Router;
/// use crate::adapters::http::billing::{billing_router, BillingAppState};
///
/// let app_state = BillingAppState { /* ... */ };
/// let app = Router::new()
///     .nest("/api", billing_router())
///     .with_state(app_state);
/// ```
pub fn billing_router() -> Router<BillingAppState> {
    Router::new()
        .merge(billing_routes())
        .nest("/webhooks", webhook_routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::domain::catalog::Buyable;
    use crate::domain::foundation::{
        BuyableId, DomainError, EventEnvelope, PurchaseId, SubscriptionId, Timestamp, UserId,
    };
    use crate::domain::ledger::{PaymentTransaction, PaymentVendor, Purchase};
    use crate::domain::subscription::UserSubscription;
    use crate::ports::{
        AppStoreClient, BuyableRepository, CommitOutcome, EventPublisher, GooglePlayClient,
        PurchaseLedger, SubscriptionRepository,
    };
    use async_trait::async_trait;
    use serde_json::{json, Value as JsonValue};

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations (shared shape with handlers tests)
    // ════════════════════════════════════════════════════════════════════════════

    struct EmptyCatalog;

    #[async_trait]
    impl BuyableRepository for EmptyCatalog {
        async fn find_by_name(&self, _name: &str) -> Result<Option<Buyable>, DomainError> {
            Ok(None)
        }

        async fn find_by_id(&self, _id: &BuyableId) -> Result<Option<Buyable>, DomainError> {
            Ok(None)
        }

        async fn find_by_ids(&self, _ids: &[BuyableId]) -> Result<Vec<Buyable>, DomainError> {
            Ok(Vec::new())
        }
    }

    struct EmptySubscriptions;

    #[async_trait]
    impl SubscriptionRepository for EmptySubscriptions {
        async fn insert(&self, _subscription: &UserSubscription) -> Result<(), DomainError> {
            Ok(())
        }

        async fn update(&self, _subscription: &UserSubscription) -> Result<(), DomainError> {
            Ok(())
        }

        async fn save_all(
            &self,
            _updates: &[UserSubscription],
            _inserts: &[UserSubscription],
        ) -> Result<(), DomainError> {
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
            Ok(None)
        }

        async fn delete(&self, _id: &SubscriptionId) -> Result<(), DomainError> {
            Ok(())
        }
    }

    struct EmptyLedger;

    #[async_trait]
    impl PurchaseLedger for EmptyLedger {
        async fn commit_purchase(
            &self,
            _purchase: &Purchase,
            _transaction: &PaymentTransaction,
        ) -> Result<CommitOutcome, DomainError> {
            Ok(CommitOutcome::Committed)
        }

        async fn record_transaction(
            &self,
            _transaction: &PaymentTransaction,
        ) -> Result<CommitOutcome, DomainError> {
            Ok(CommitOutcome::Committed)
        }

        async fn record_transaction_with_subscription(
            &self,
            _transaction: &PaymentTransaction,
            _subscription: &UserSubscription,
        ) -> Result<CommitOutcome, DomainError> {
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
            _vendor_transaction_id: &str,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(None)
        }

        async fn latest_transaction_for_purchase(
            &self,
            _purchase_id: &PurchaseId,
        ) -> Result<Option<PaymentTransaction>, DomainError> {
            Ok(None)
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
        async fn get_transaction_info(
            &self,
            _transaction_id: &str,
        ) -> Result<JsonValue, DomainError> {
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

    struct NullPublisher;

    #[async_trait]
    impl EventPublisher for NullPublisher {
        async fn publish(&self, _event: EventEnvelope) -> Result<(), DomainError> {
            Ok(())
        }

        async fn publish_all(&self, _events: Vec<EventEnvelope>) -> Result<(), DomainError> {
            Ok(())
        }
    }

    fn test_state() -> BillingAppState {
        BillingAppState {
            buyable_repository: Arc::new(EmptyCatalog),
            subscription_repository: Arc::new(EmptySubscriptions),
            purchase_ledger: Arc::new(EmptyLedger),
            google_play_client: Arc::new(StubGooglePlay),
            app_store_client: Arc::new(StubAppStore),
            event_publisher: Arc::new(NullPublisher),
            live_verification: false,
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Router Tests
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn billing_routes_creates_router() {
        let router = billing_routes();
        // Just verify it creates without panic
        let _: Router<()> = router.with_state(test_state());
    }

    #[test]
    fn webhook_routes_creates_router() {
        let router = webhook_routes();
        let _: Router<()> = router.with_state(test_state());
    }

    #[test]
    fn billing_router_creates_combined_router() {
        let router = billing_router();
        let _: Router<()> = router.with_state(test_state());
    }
}
