//! Purchase and payment error types.
//!
//! Errors raised while turning a store receipt into ledger rows.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | BuyableNotFound | 404 |
//! | PurchaseNotFound | 404 |
//! | TransactionNotFound | 404 |
//! | EmptyReceipt | 400 |
//! | InvalidReceipt | 400 |
//! | UnsupportedVendor | 400 |
//! | ActiveSubscriptionExists | 409 |
//! | ValidationFailed | 400 |
//! | VerificationNotSatisfied | 500 |
//! | StoreProvider | 502 |
//! | Internal | 500 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, PurchaseId, UserId};

use super::PaymentVendor;

/// Purchase-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// No catalog item matches the product key from the receipt.
    BuyableNotFound(String),

    /// Purchase was not found.
    PurchaseNotFound(PurchaseId),

    /// No transaction matches the vendor transaction id.
    TransactionNotFound(String),

    /// Receipt field was missing or empty.
    EmptyReceipt,

    /// Receipt could not be parsed or was rejected by the vendor.
    InvalidReceipt { reason: String },

    /// Vendor cannot verify receipts.
    UnsupportedVendor(String),

    /// User already holds an active subscription.
    ActiveSubscriptionExists(UserId),

    /// Transaction creation was attempted before verification.
    VerificationNotSatisfied,

    /// Store API call failed.
    StoreProvider { vendor: PaymentVendor, message: String },

    /// Validation failed.
    ValidationFailed { field: String, message: String },

    /// Invariant the caller cannot repair was broken.
    Internal(String),

    /// Infrastructure error.
    Infrastructure(String),
}

impl PurchaseError {
    // Constructor functions for cleaner error creation

    pub fn buyable_not_found(product_key: impl Into<String>) -> Self {
        PurchaseError::BuyableNotFound(product_key.into())
    }

    pub fn purchase_not_found(id: PurchaseId) -> Self {
        PurchaseError::PurchaseNotFound(id)
    }

    pub fn transaction_not_found(vendor_transaction_id: impl Into<String>) -> Self {
        PurchaseError::TransactionNotFound(vendor_transaction_id.into())
    }

    pub fn empty_receipt() -> Self {
        PurchaseError::EmptyReceipt
    }

    pub fn invalid_receipt(reason: impl Into<String>) -> Self {
        PurchaseError::InvalidReceipt {
            reason: reason.into(),
        }
    }

    /// The vendor examined the receipt and said no.
    pub fn receipt_rejected(vendor: PaymentVendor) -> Self {
        PurchaseError::InvalidReceipt {
            reason: format!("{} didn't verify the receipt", vendor),
        }
    }

    pub fn unsupported_vendor(vendor: impl Into<String>) -> Self {
        PurchaseError::UnsupportedVendor(vendor.into())
    }

    pub fn active_subscription_exists(user_id: UserId) -> Self {
        PurchaseError::ActiveSubscriptionExists(user_id)
    }

    pub fn verification_not_satisfied() -> Self {
        PurchaseError::VerificationNotSatisfied
    }

    pub fn store_provider(vendor: PaymentVendor, message: impl Into<String>) -> Self {
        PurchaseError::StoreProvider {
            vendor,
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        PurchaseError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        PurchaseError::Internal(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        PurchaseError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            PurchaseError::BuyableNotFound(_) => ErrorCode::BuyableNotFound,
            PurchaseError::PurchaseNotFound(_) => ErrorCode::PurchaseNotFound,
            PurchaseError::TransactionNotFound(_) => ErrorCode::TransactionNotFound,
            PurchaseError::EmptyReceipt => ErrorCode::EmptyReceipt,
            PurchaseError::InvalidReceipt { .. } => ErrorCode::InvalidReceipt,
            PurchaseError::UnsupportedVendor(_) => ErrorCode::UnsupportedVendor,
            PurchaseError::ActiveSubscriptionExists(_) => ErrorCode::ActiveSubscriptionExists,
            PurchaseError::VerificationNotSatisfied => {
                ErrorCode::VerificationPrerequisiteNotSatisfied
            }
            PurchaseError::StoreProvider { .. } => ErrorCode::StoreProviderError,
            PurchaseError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            PurchaseError::Internal(_) => ErrorCode::InternalError,
            PurchaseError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            PurchaseError::BuyableNotFound(key) => {
                format!("No catalog item matches product key '{}'", key)
            }
            PurchaseError::PurchaseNotFound(id) => format!("Purchase not found: {}", id),
            PurchaseError::TransactionNotFound(tx_id) => {
                format!("No transaction matches vendor transaction id '{}'", tx_id)
            }
            PurchaseError::EmptyReceipt => "Receipt is empty or null".to_string(),
            PurchaseError::InvalidReceipt { reason } => reason.clone(),
            PurchaseError::UnsupportedVendor(vendor) => {
                format!("Vendor '{}' cannot verify receipts", vendor)
            }
            PurchaseError::ActiveSubscriptionExists(user_id) => {
                format!("User {} already has an active subscription", user_id)
            }
            PurchaseError::VerificationNotSatisfied => {
                "Called create_transaction before prepare_for_transaction".to_string()
            }
            PurchaseError::StoreProvider { vendor, message } => {
                format!("{} API request failed: {}", vendor, message)
            }
            PurchaseError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            PurchaseError::Internal(msg) => msg.clone(),
            PurchaseError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PurchaseError::Infrastructure(_) | PurchaseError::StoreProvider { .. }
        )
    }
}

impl std::fmt::Display for PurchaseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for PurchaseError {}

impl From<DomainError> for PurchaseError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::EmptyReceipt => PurchaseError::EmptyReceipt,
            ErrorCode::InvalidReceipt => PurchaseError::InvalidReceipt {
                reason: err.to_string(),
            },
            ErrorCode::UnsupportedVendor => PurchaseError::UnsupportedVendor(err.to_string()),
            ErrorCode::BuyableNotFound => PurchaseError::BuyableNotFound(err.to_string()),
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => PurchaseError::ValidationFailed {
                field: "unknown".to_string(),
                message: err.to_string(),
            },
            ErrorCode::InternalError => PurchaseError::Internal(err.to_string()),
            _ => PurchaseError::Infrastructure(err.to_string()),
        }
    }
}

impl From<PurchaseError> for DomainError {
    fn from(err: PurchaseError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
