//! Subscription error types.
//!
//! Errors raised while reading or mutating a user's entitlement window.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | NotFound | 404 |
//! | NoSubscription | 404 |
//! | SubscriptionExists | 409 |
//! | NotASubscription | 400 |
//! | ValidationFailed | 400 |
//! | Internal | 500 |
//! | Infrastructure | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, SubscriptionId, UserId};

/// Subscription-specific errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Subscription row was not found.
    NotFound(SubscriptionId),

    /// User has no subscription that grants access.
    NoSubscription(UserId),

    /// A second live subscription row collided with the per-user
    /// uniqueness constraint.
    SubscriptionExists(UserId),

    /// The buyable does not carry a billing period.
    NotASubscription(String),

    /// Validation failed.
    ValidationFailed { field: String, message: String },

    /// Invariant the caller cannot repair was broken.
    Internal(String),

    /// Infrastructure error.
    Infrastructure(String),
}

impl SubscriptionError {
    // Constructor functions for cleaner error creation

    pub fn not_found(id: SubscriptionId) -> Self {
        SubscriptionError::NotFound(id)
    }

    pub fn no_subscription(user_id: UserId) -> Self {
        SubscriptionError::NoSubscription(user_id)
    }

    pub fn subscription_exists(user_id: UserId) -> Self {
        SubscriptionError::SubscriptionExists(user_id)
    }

    pub fn not_a_subscription(buyable_name: impl Into<String>) -> Self {
        SubscriptionError::NotASubscription(buyable_name.into())
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        SubscriptionError::ValidationFailed {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        SubscriptionError::Internal(message.into())
    }

    pub fn infrastructure(message: impl Into<String>) -> Self {
        SubscriptionError::Infrastructure(message.into())
    }

    /// Returns the error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            SubscriptionError::NotFound(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::NoSubscription(_) => ErrorCode::SubscriptionNotFound,
            SubscriptionError::SubscriptionExists(_) => ErrorCode::SubscriptionExists,
            SubscriptionError::NotASubscription(_) => ErrorCode::ValidationFailed,
            SubscriptionError::ValidationFailed { .. } => ErrorCode::ValidationFailed,
            SubscriptionError::Internal(_) => ErrorCode::InternalError,
            SubscriptionError::Infrastructure(_) => ErrorCode::DatabaseError,
        }
    }

    /// Returns a user-friendly error message.
    pub fn message(&self) -> String {
        match self {
            SubscriptionError::NotFound(id) => format!("Subscription not found: {}", id),
            SubscriptionError::NoSubscription(user_id) => {
                format!("User {} has no subscription", user_id)
            }
            SubscriptionError::SubscriptionExists(user_id) => {
                format!("User {} already has a live subscription", user_id)
            }
            SubscriptionError::NotASubscription(name) => {
                format!("Buyable '{}' does not carry a billing period", name)
            }
            SubscriptionError::ValidationFailed { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            SubscriptionError::Internal(msg) => msg.clone(),
            SubscriptionError::Infrastructure(msg) => format!("Error: {}", msg),
        }
    }

    /// Returns true if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubscriptionError::Infrastructure(_))
    }
}

impl std::fmt::Display for SubscriptionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SubscriptionError {}

impl From<DomainError> for SubscriptionError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::SubscriptionExists | ErrorCode::ActiveSubscriptionExists => {
                SubscriptionError::Internal(err.to_string())
            }
            ErrorCode::ValidationFailed
            | ErrorCode::EmptyField
            | ErrorCode::OutOfRange
            | ErrorCode::InvalidFormat => SubscriptionError::ValidationFailed {
                field: "unknown".to_string(),
                message: err.to_string(),
            },
            ErrorCode::InternalError => SubscriptionError::Internal(err.to_string()),
            _ => SubscriptionError::Infrastructure(err.to_string()),
        }
    }
}

impl From<SubscriptionError> for DomainError {
    fn from(err: SubscriptionError) -> Self {
        DomainError::new(err.code(), err.message())
    }
}
