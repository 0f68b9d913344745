//! HTTP DTOs (Data Transfer Objects) for billing endpoints.
//!
//! These types define the JSON request/response structure for the billing API.
//! They serve as the boundary between HTTP and the application layer.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::application::handlers::subscription::SubscriptionView;
use crate::domain::ledger::PaymentTransaction;
use crate::domain::subscription::UserSubscription;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to record a store purchase from a submitted receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct PurchaseRequest {
    /// Vendor-assigned transaction id.
    pub transaction_id: String,
    /// Vendor tag, e.g. `GooglePlay` or `AppleAppStore`.
    pub store: String,
    /// Catalog name of the purchased product.
    pub product_key: String,
    /// The store client's purchase payload, passed through verbatim.
    pub raw_product_data: JsonValue,
    /// Optional stored payment method reference.
    #[serde(default)]
    pub stored_payment_method_id: Option<String>,
}

impl PurchaseRequest {
    /// Field-level validation mirroring what store clients must send.
    ///
    /// Returns the offending field name and a message.
    pub fn validate(&self) -> Result<(), (&'static str, String)> {
        if self.transaction_id.trim().is_empty() {
            return Err(("transaction_id", "This field may not be blank".to_string()));
        }
        if self.store.trim().is_empty() {
            return Err(("store", "This field may not be blank".to_string()));
        }
        if self.product_key.trim().is_empty() {
            return Err(("product_key", "This field may not be blank".to_string()));
        }
        let metadata = self
            .raw_product_data
            .get("purchasedProduct")
            .and_then(|p| p.get("metadata"))
            .and_then(JsonValue::as_object);
        match metadata {
            Some(map) if !map.is_empty() => Ok(()),
            _ => Err((
                "raw_product_data",
                "purchasedProduct.metadata must be a non-empty object".to_string(),
            )),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Response for a recorded purchase.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseResponse {
    /// `recorded` on first sighting, `already_processed` on resubmission.
    pub status: &'static str,
    /// Recorded transaction, absent on resubmission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction: Option<TransactionResponse>,
    /// The subscription the purchase opened or renewed, when the product
    /// is a subscription.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<PurchaseSubscriptionResponse>,
}

/// Recorded payment transaction view.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Purchase the transaction belongs to.
    pub purchase_id: String,
    /// Vendor that processed the payment.
    pub vendor: String,
    /// Vendor-assigned transaction id.
    pub vendor_transaction_id: Option<String>,
    /// Payment lifecycle status.
    pub status: String,
    /// When the transaction was recorded (ISO 8601).
    pub created_at: String,
}

impl From<&PaymentTransaction> for TransactionResponse {
    fn from(tx: &PaymentTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            purchase_id: tx.purchase_id.to_string(),
            vendor: tx.vendor.to_string(),
            vendor_transaction_id: tx.vendor_transaction_id.clone(),
            status: tx.status.to_string(),
            created_at: tx.created_at.as_datetime().to_rfc3339(),
        }
    }
}

/// Compact subscription view attached to purchase responses.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseSubscriptionResponse {
    /// Subscription ID.
    pub id: String,
    /// Subscribed catalog item.
    pub buyable_id: String,
    /// Status the purchase left the subscription in.
    pub status: String,
    /// When the entitlement begins (ISO 8601).
    pub start_date: String,
    /// When the entitlement lapses unless renewed (ISO 8601).
    pub expiration_date: String,
    /// Trial days consumed at creation.
    pub used_trial_days: u32,
}

impl From<&UserSubscription> for PurchaseSubscriptionResponse {
    fn from(s: &UserSubscription) -> Self {
        Self {
            id: s.id.to_string(),
            buyable_id: s.buyable_id.to_string(),
            status: s.status.to_string(),
            start_date: s.start_date.as_datetime().to_rfc3339(),
            expiration_date: s.expiration_date.as_datetime().to_rfc3339(),
            used_trial_days: s.used_trial_days,
        }
    }
}

/// Reconciled subscription state for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResponse {
    /// Subscription ID.
    pub id: String,
    /// Subscribed catalog item.
    pub buyable_id: String,
    /// Reconciled status.
    pub status: String,
    /// Billing period of the subscribed product.
    pub period: String,
    /// Kind of the subscribed product.
    pub buyable_type: String,
    /// When the entitlement begins (ISO 8601).
    pub start_date: String,
    /// When the entitlement lapses unless renewed (ISO 8601).
    pub expiration_date: String,
    /// Trial days consumed at creation.
    pub used_trial_days: u32,
}

impl From<SubscriptionView> for SubscriptionResponse {
    fn from(view: SubscriptionView) -> Self {
        Self {
            id: view.subscription.id.to_string(),
            buyable_id: view.subscription.buyable_id.to_string(),
            status: view.subscription.status.to_string(),
            period: view.period.to_string(),
            buyable_type: view.buyable_type.to_string(),
            start_date: view.subscription.start_date.as_datetime().to_rfc3339(),
            expiration_date: view
                .subscription
                .expiration_date
                .as_datetime()
                .to_rfc3339(),
            used_trial_days: view.subscription.used_trial_days,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Response DTO
// ════════════════════════════════════════════════════════════════════════════════

/// Standard error response for API errors.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub error_code: String,
    /// Human-readable error message.
    pub message: String,
    /// Additional details (optional).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            details: None,
        }
    }
}
