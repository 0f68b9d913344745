//! Payment transaction entity.
//!
//! One row per payment attempt against a purchase. Store renewals append
//! new transactions to the original purchase rather than creating new
//! purchases, so a long-lived subscription is one purchase with many
//! transactions.

use crate::domain::foundation::{DomainError, Money, PurchaseId, Timestamp, TransactionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::PaymentVendor;
use crate::domain::foundation::ValidationError;

/// Lifecycle status of a payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Initial,
    Pending,
    Stale,
    Canceled,
    Reverted,
    Failed,
    Succeeded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initial => "initial",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Stale => "stale",
            PaymentStatus::Canceled => "canceled",
            PaymentStatus::Reverted => "reverted",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Succeeded => "succeeded",
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, PaymentStatus::Succeeded)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(PaymentStatus::Initial),
            "pending" => Ok(PaymentStatus::Pending),
            "stale" => Ok(PaymentStatus::Stale),
            "canceled" => Ok(PaymentStatus::Canceled),
            "reverted" => Ok(PaymentStatus::Reverted),
            "failed" => Ok(PaymentStatus::Failed),
            "succeeded" => Ok(PaymentStatus::Succeeded),
            other => Err(ValidationError::invalid_format(
                "status",
                format!("unknown payment status '{}'", other),
            )),
        }
    }
}

/// Monetary breakdown of a payment attempt.
///
/// All three amounts share one currency. `list` is the catalog price,
/// `charge` what the store actually collected, `credit` any promotional
/// credit applied. Tax rate is stored in thousandths to avoid floats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPricing {
    pub list: Money,
    pub charge: Money,
    pub credit: Money,
    pub tax_rate_millis: u32,
}

impl TransactionPricing {
    /// # Errors
    ///
    /// Returns error if the three amounts disagree on currency.
    pub fn new(list: Money, charge: Money, credit: Money, tax_rate_millis: u32) -> Result<Self, DomainError> {
        if list.currency() != charge.currency() || list.currency() != credit.currency() {
            return Err(DomainError::validation(
                "currency",
                "List, charge and credit amounts must share one currency",
            ));
        }
        Ok(Self {
            list,
            charge,
            credit,
            tax_rate_millis,
        })
    }

    /// Catalog price with zero charge and credit, for failed attempts.
    pub fn unpaid(list: Money) -> Self {
        let currency = list.currency().clone();
        Self {
            charge: Money::zero(currency.clone()),
            credit: Money::zero(currency),
            list,
            tax_rate_millis: 0,
        }
    }
}

/// Payment transaction entity.
///
/// # Invariants
///
/// - `(vendor, vendor_transaction_id)` is unique among non-deleted rows
///   (database level), which is what makes receipt submission idempotent
/// - All monetary amounts share the pricing currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    /// Unique identifier for this transaction.
    pub id: TransactionId,

    /// Purchase this payment attempt belongs to.
    pub purchase_id: PurchaseId,

    /// Monetary breakdown.
    pub pricing: TransactionPricing,

    /// Vendor that processed the payment.
    pub vendor: PaymentVendor,

    /// Payment instrument label, e.g. `credit_card`.
    pub payment_method: String,

    /// Vendor-side payer identifier, when the vendor exposes one.
    pub payer_id: Option<String>,

    /// Client IP at purchase time, empty when unknown.
    pub ip_address: String,

    /// Lifecycle status of the attempt.
    pub status: PaymentStatus,

    /// Vendor-assigned transaction identifier. Half of the idempotency
    /// key; absent only for vendors that assign none.
    pub vendor_transaction_id: Option<String>,

    /// Cleaned receipt document the client submitted, if any.
    pub receipt: Option<Value>,

    /// Raw request payload that produced this transaction.
    pub raw_product_data: Option<Value>,

    /// When the transaction was recorded.
    pub created_at: Timestamp,

    /// When the transaction was last updated.
    pub updated_at: Timestamp,
}

impl PaymentTransaction {
    /// Record a payment attempt observed from a store receipt.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        id: TransactionId,
        purchase_id: PurchaseId,
        pricing: TransactionPricing,
        vendor: PaymentVendor,
        status: PaymentStatus,
        vendor_transaction_id: Option<String>,
        receipt: Option<Value>,
        raw_product_data: Option<Value>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            purchase_id,
            pricing,
            vendor,
            payment_method: "credit_card".to_string(),
            payer_id: None,
            ip_address: String::new(),
            status,
            vendor_transaction_id,
            receipt,
            raw_product_data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Derive a renewal transaction from this one, copying the pricing.
    ///
    /// Used when a vendor reports a renewal we have no receipt for. The
    /// derived row is succeeded and carries the vendor's renewal id.
    pub fn renewal(
        &self,
        id: TransactionId,
        vendor_transaction_id: String,
        raw_product_data: Option<Value>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            purchase_id: self.purchase_id,
            pricing: self.pricing.clone(),
            vendor: self.vendor,
            payment_method: self.payment_method.clone(),
            payer_id: self.payer_id.clone(),
            ip_address: self.ip_address.clone(),
            status: PaymentStatus::Succeeded,
            vendor_transaction_id: Some(vendor_transaction_id),
            receipt: None,
            raw_product_data,
            created_at: now,
            updated_at: now,
        }
    }

    /// Like [`renewal`](Self::renewal) but with promotional credit
    /// dropped, for vendors that do not re-apply credit on renewal.
    pub fn renewal_without_credit(
        &self,
        id: TransactionId,
        vendor_transaction_id: String,
        raw_product_data: Option<Value>,
    ) -> Self {
        let mut derived = self.renewal(id, vendor_transaction_id, raw_product_data);
        derived.pricing.credit = Money::zero(self.pricing.credit.currency().clone());
        derived
    }

    /// Currency shared by all amounts on this transaction.
    pub fn currency(&self) -> &crate::domain::foundation::Currency {
        self.pricing.list.currency()
    }
}
