//! Purchase verification strategies.
//!
//! A strategy takes one client-submitted receipt and walks it through
//! `verify` (is the receipt authentic and unexpired), `prepare` (stage
//! the Purchase and PaymentTransaction rows in memory) and `staged`
//! (hand the rows to the committing handler). The steps are ordered:
//! calling `prepare` before `verify`, or reading `staged` before
//! `prepare`, is an internal precondition violation and fails loudly.
//!
//! Verification runs in one of two modes. With live verification off
//! (the default) the vendor response is derived from the metadata the
//! store client attached to the submission. With it on, the strategy
//! calls the vendor API and checks the subscription is not expired.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::domain::catalog::Buyable;
use crate::domain::foundation::{Money, PurchaseId, Timestamp, TransactionId, UserId};
use crate::domain::ledger::{
    PaymentStatus, PaymentTransaction, PaymentVendor, Purchase, PurchaseError,
    TransactionPricing,
};
use crate::ports::{
    AppStoreClient, BuyableRepository, GooglePlayClient, PurchaseLedger, SubscriptionRepository,
};
use async_trait::async_trait;

use super::app_store::AppStoreStrategy;
use super::google_play::GooglePlayStrategy;

/// One receipt submission, as validated by the HTTP edge.
#[derive(Debug, Clone)]
pub struct ReceiptSubmission {
    /// Authenticated buyer.
    pub user_id: UserId,
    /// Vendor-assigned transaction id for this purchase.
    pub transaction_id: String,
    /// Catalog name of the product being bought.
    pub product_key: String,
    /// The store client's purchase payload, stored verbatim for audit.
    pub raw_product_data: JsonValue,
    /// Optional stored payment method reference.
    pub stored_payment_method_id: Option<String>,
}

impl ReceiptSubmission {
    /// The escaped receipt blob nested inside the purchase payload.
    pub fn receipt_blob(&self) -> Option<&str> {
        self.raw_product_data
            .get("purchasedProduct")
            .and_then(|p| p.get("receipt"))
            .and_then(JsonValue::as_str)
    }

    /// The store client's price metadata.
    pub fn metadata(&self) -> Option<&JsonValue> {
        self.raw_product_data
            .get("purchasedProduct")
            .and_then(|p| p.get("metadata"))
    }
}

/// Raw vendor response paired with the verification verdict.
#[derive(Debug, Clone)]
pub struct VerifiedReceipt {
    /// Vendor (or metadata-derived) response, kept for pricing.
    pub response: JsonValue,
    /// Whether the vendor vouched for the receipt.
    pub valid: bool,
}

/// In-memory Purchase and PaymentTransaction pair, ready to commit.
#[derive(Debug, Clone)]
pub struct StagedPurchase {
    pub purchase: Purchase,
    pub transaction: PaymentTransaction,
    pub buyable: Buyable,
}

/// Vendor-specific receipt verification pipeline.
#[async_trait]
pub trait PurchaseStrategy: Send {
    fn vendor(&self) -> PaymentVendor;

    /// Confirm the receipt with the vendor. Returns the verdict and
    /// retains the vendor response for `prepare`.
    async fn verify(&mut self) -> Result<bool, PurchaseError>;

    /// Stage the Purchase and PaymentTransaction. Idempotent; a second
    /// call rebuilds the same staged rows.
    async fn prepare(&mut self) -> Result<(), PurchaseError>;

    /// The staged rows. Errors when `prepare` has not run.
    fn staged(&self) -> Result<&StagedPurchase, PurchaseError>;
}

/// Builds the strategy matching a payment vendor.
pub struct PurchaseStrategyFactory {
    services: StrategyServices,
    google_play_client: Arc<dyn GooglePlayClient>,
    app_store_client: Arc<dyn AppStoreClient>,
    live_verification: bool,
}

impl PurchaseStrategyFactory {
    pub fn new(
        services: StrategyServices,
        google_play_client: Arc<dyn GooglePlayClient>,
        app_store_client: Arc<dyn AppStoreClient>,
        live_verification: bool,
    ) -> Self {
        Self {
            services,
            google_play_client,
            app_store_client,
            live_verification,
        }
    }

    /// Construct the strategy for `vendor`, validating the receipt's
    /// vendor-mandated fields up front.
    ///
    /// # Errors
    ///
    /// - `UnsupportedVendor` for vendors without a receipt flow
    /// - `InvalidReceipt` when mandated receipt fields are missing
    pub fn for_vendor(
        &self,
        vendor: PaymentVendor,
        submission: ReceiptSubmission,
    ) -> Result<Box<dyn PurchaseStrategy>, PurchaseError> {
        match vendor {
            PaymentVendor::GooglePlay => Ok(Box::new(GooglePlayStrategy::new(
                self.services.clone(),
                self.google_play_client.clone(),
                self.live_verification,
                submission,
            )?)),
            PaymentVendor::AppleAppStore => Ok(Box::new(AppStoreStrategy::new(
                self.services.clone(),
                self.app_store_client.clone(),
                self.live_verification,
                submission,
            )?)),
            PaymentVendor::Free => Err(PurchaseError::unsupported_vendor(vendor.as_str())),
        }
    }
}

/// Ports every strategy needs to stage a purchase.
#[derive(Clone)]
pub struct StrategyServices {
    pub buyables: Arc<dyn BuyableRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub ledger: Arc<dyn PurchaseLedger>,
}

/// Vendor-confirmed price for the staged transaction.
#[derive(Debug, Clone)]
pub(super) struct ConfirmedPricing {
    pub charge: Money,
}

/// Unwraps the store client's receipt blob into JSON.
///
/// Store clients double-escape the nested vendor payloads, so the blob
/// is unescaped (backslashes stripped, quoted braces and brackets
/// unquoted) before parsing.
pub(super) fn clean_receipt(raw: &str) -> Result<JsonValue, PurchaseError> {
    let cleaned = raw
        .replace('\\', "")
        .replace("\"{", "{")
        .replace("}\"", "}")
        .replace("\"[", "[")
        .replace("]\"", "]");
    serde_json::from_str(&cleaned)
        .map_err(|e| PurchaseError::invalid_receipt(format!("Receipt is not valid JSON: {}", e)))
}

/// Reads a vendor numeric field that may arrive as a string or number.
pub(super) fn json_i64(value: Option<&JsonValue>) -> Option<i64> {
    match value? {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Stages the Purchase and PaymentTransaction for a verified receipt.
///
/// A user renewing their active subscription keeps the purchase that
/// opened the lineage; everyone else gets a fresh one. The transaction
/// carries the catalog list price and the vendor-confirmed charge
/// under one currency, plus the receipt and payload verbatim.
pub(super) async fn stage_for_receipt(
    services: &StrategyServices,
    submission: &ReceiptSubmission,
    vendor: PaymentVendor,
    receipt: &JsonValue,
    pricing: ConfirmedPricing,
    original_transaction_id: Option<String>,
    valid: bool,
) -> Result<StagedPurchase, PurchaseError> {
    let now = Timestamp::now();
    let buyable = services
        .buyables
        .find_by_name(&submission.product_key)
        .await?
        .ok_or_else(|| PurchaseError::buyable_not_found(submission.product_key.clone()))?;

    let mut purchase = None;
    if let Some(active) = services
        .subscriptions
        .find_active_for_user(&submission.user_id, now)
        .await?
    {
        purchase = services
            .ledger
            .find_reusable_purchase(&submission.user_id, &active.buyable_id, vendor)
            .await?;
    }
    let purchase = match purchase {
        Some(existing) => existing,
        None => Purchase::create(
            PurchaseId::new(),
            submission.user_id.clone(),
            &[&buyable],
            Some(vendor),
            submission.stored_payment_method_id.clone(),
            original_transaction_id,
        )?,
    };

    // One currency per transaction row; the catalog amount rides under
    // the charge currency.
    let currency = pricing.charge.currency().clone();
    let list = Money::from_micros(buyable.store_price().amount_micros(), currency.clone());
    let transaction_pricing =
        TransactionPricing::new(list, pricing.charge, Money::zero(currency), 0)?;

    let status = if valid {
        PaymentStatus::Succeeded
    } else {
        PaymentStatus::Failed
    };
    let transaction = PaymentTransaction::record(
        TransactionId::new(),
        purchase.id,
        transaction_pricing,
        vendor,
        status,
        Some(submission.transaction_id.clone()),
        Some(receipt.clone()),
        Some(submission.raw_product_data.clone()),
    );

    Ok(StagedPurchase {
        purchase,
        transaction,
        buyable,
    })
}
