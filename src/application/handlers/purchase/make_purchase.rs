//! MakePurchaseHandler - Command handler for receipt submissions.
//!
//! Runs the full billing flow for one client-submitted receipt: guard
//! against a second subscription, verify with the vendor strategy,
//! stage the ledger rows, commit them, and feed subscription products
//! into the entitlement engine. A resubmitted receipt ends quietly as
//! `AlreadyProcessed` thanks to the ledger's idempotency key.

use std::sync::Arc;

use serde_json::Value as JsonValue;
use serde::Serialize;

use crate::domain::foundation::{
    domain_event, BuyableId, CommandMetadata, DomainError, EventId, PurchaseId,
    SerializableDomainEvent, Timestamp, TransactionId, UserId,
};
use crate::domain::ledger::{PaymentTransaction, PaymentVendor, PurchaseError};
use crate::domain::subscription::UserSubscription;
use crate::ports::{BuyableRepository, EventPublisher, PurchaseLedger, SubscriptionRepository};

use super::super::subscription::{ApplyPaidTransactionCommand, ApplyPaidTransactionHandler};
use super::strategy::{PurchaseStrategyFactory, ReceiptSubmission, StagedPurchase};

/// Command to record a store purchase from a submitted receipt.
#[derive(Debug, Clone)]
pub struct MakePurchaseCommand {
    /// Vendor tag as sent by the store client.
    pub store: String,
    /// Vendor-assigned transaction id.
    pub transaction_id: String,
    /// Catalog name of the purchased product.
    pub product_key: String,
    /// The store client's purchase payload.
    pub raw_product_data: JsonValue,
    /// Optional stored payment method reference.
    pub stored_payment_method_id: Option<String>,
}

/// Result of handling a receipt submission.
#[derive(Debug, Clone)]
pub enum MakePurchaseResult {
    /// First sighting of this vendor transaction.
    Recorded {
        transaction: PaymentTransaction,
        /// The subscription the purchase opened or renewed, when the
        /// product is a subscription.
        subscription: Option<UserSubscription>,
    },
    /// The vendor transaction was already on the ledger; nothing new
    /// was written.
    AlreadyProcessed,
}

/// Event published when a subscription purchase lands on the ledger.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseRecordedEvent {
    pub event_id: EventId,
    pub purchase_id: PurchaseId,
    pub user_id: UserId,
    pub buyable_id: BuyableId,
    pub transaction_id: TransactionId,
    pub vendor: PaymentVendor,
    pub vendor_transaction_id: Option<String>,
    pub occurred_at: Timestamp,
}

domain_event!(
    PurchaseRecordedEvent,
    event_type = "billing.purchase_recorded.v1",
    schema_version = 1,
    aggregate_id = purchase_id,
    aggregate_type = "Purchase",
    occurred_at = occurred_at,
    event_id = event_id
);

/// Handler for receipt submissions.
pub struct MakePurchaseHandler {
    strategies: PurchaseStrategyFactory,
    buyable_repository: Arc<dyn BuyableRepository>,
    subscription_repository: Arc<dyn SubscriptionRepository>,
    purchase_ledger: Arc<dyn PurchaseLedger>,
    apply_paid_transaction: Arc<ApplyPaidTransactionHandler>,
    event_publisher: Arc<dyn EventPublisher>,
}

impl MakePurchaseHandler {
    pub fn new(
        strategies: PurchaseStrategyFactory,
        buyable_repository: Arc<dyn BuyableRepository>,
        subscription_repository: Arc<dyn SubscriptionRepository>,
        purchase_ledger: Arc<dyn PurchaseLedger>,
        apply_paid_transaction: Arc<ApplyPaidTransactionHandler>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            strategies,
            buyable_repository,
            subscription_repository,
            purchase_ledger,
            apply_paid_transaction,
            event_publisher,
        }
    }

    pub async fn handle(
        &self,
        cmd: MakePurchaseCommand,
        metadata: CommandMetadata,
    ) -> Result<MakePurchaseResult, PurchaseError> {
        let user_id = metadata.user_id.clone();
        let now = Timestamp::now();

        // 1. Resolve the vendor tag
        let vendor: PaymentVendor = cmd
            .store
            .parse()
            .map_err(|_| PurchaseError::unsupported_vendor(cmd.store.clone()))?;

        // 2. A live subscription on another product blocks a new lineage
        if let Some(active) = self
            .subscription_repository
            .find_active_for_user(&user_id, now)
            .await?
        {
            let owned = self
                .buyable_repository
                .find_by_id(&active.buyable_id)
                .await?
                .ok_or_else(|| {
                    PurchaseError::internal(format!(
                        "Buyable {} behind subscription {} is gone",
                        active.buyable_id, active.id
                    ))
                })?;
            if owned.name != cmd.product_key {
                return Err(PurchaseError::active_subscription_exists(user_id));
            }
        }

        // 3. Verify the receipt and stage the ledger rows
        let submission = ReceiptSubmission {
            user_id: user_id.clone(),
            transaction_id: cmd.transaction_id.clone(),
            product_key: cmd.product_key.clone(),
            raw_product_data: cmd.raw_product_data.clone(),
            stored_payment_method_id: cmd.stored_payment_method_id.clone(),
        };
        let staged = match self.verify_and_stage(vendor, submission).await {
            Ok(staged) => staged,
            Err(e) => {
                tracing::error!(
                    exception = %e,
                    account_id = %user_id,
                    request_data = %cmd.raw_product_data,
                    "Purchase preparation failed"
                );
                return Err(e);
            }
        };

        // 4. Commit; a duplicate transaction ends the flow quietly
        let outcome = self
            .purchase_ledger
            .commit_purchase(&staged.purchase, &staged.transaction)
            .await?;
        if !outcome.is_committed() {
            return Ok(MakePurchaseResult::AlreadyProcessed);
        }

        let mut subscription = None;
        if staged.buyable.is_subscription() {
            // 5. Announce the recorded purchase
            let event = PurchaseRecordedEvent {
                event_id: EventId::new(),
                purchase_id: staged.purchase.id,
                user_id: user_id.clone(),
                buyable_id: staged.buyable.id,
                transaction_id: staged.transaction.id,
                vendor,
                vendor_transaction_id: staged.transaction.vendor_transaction_id.clone(),
                occurred_at: Timestamp::now(),
            };
            let envelope = event
                .to_envelope()
                .with_correlation_id(metadata.correlation_id())
                .with_user_id(metadata.user_id.to_string());
            self.event_publisher.publish(envelope).await?;

            // 6. Open or renew the entitlement
            let applied = self
                .apply_paid_transaction
                .handle(ApplyPaidTransactionCommand {
                    purchase: staged.purchase.clone(),
                    product: Some(staged.buyable.clone()),
                })
                .await
                .map_err(DomainError::from)?;
            subscription = applied.subscription().cloned();
        }

        Ok(MakePurchaseResult::Recorded {
            transaction: staged.transaction,
            subscription,
        })
    }

    async fn verify_and_stage(
        &self,
        vendor: PaymentVendor,
        submission: ReceiptSubmission,
    ) -> Result<StagedPurchase, PurchaseError> {
        let mut strategy = self.strategies.for_vendor(vendor, submission)?;
        if !strategy.verify().await? {
            return Err(PurchaseError::receipt_rejected(vendor));
        }
        strategy.prepare().await?;
        Ok(strategy.staged()?.clone())
    }
}
