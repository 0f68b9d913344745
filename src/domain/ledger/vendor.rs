//! Payment vendors accepted by the ledger.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::ValidationError;

/// Origin of a payment.
///
/// The wire values are fixed: clients send them in purchase requests and
/// the ledger stores them verbatim, so renaming a variant is a data
/// migration, not a refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentVendor {
    /// Granted without payment, e.g. promotional access.
    Free,
    /// Apple App Store in-app purchase.
    #[serde(rename = "AppleAppStore")]
    AppleAppStore,
    /// Google Play in-app purchase.
    #[serde(rename = "GooglePlay")]
    GooglePlay,
}

impl PaymentVendor {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentVendor::Free => "Free",
            PaymentVendor::AppleAppStore => "AppleAppStore",
            PaymentVendor::GooglePlay => "GooglePlay",
        }
    }

    /// True for vendors backed by a real store that can verify receipts.
    pub fn is_store(&self) -> bool {
        !matches!(self, PaymentVendor::Free)
    }
}

impl fmt::Display for PaymentVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentVendor {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Free" => Ok(PaymentVendor::Free),
            "AppleAppStore" => Ok(PaymentVendor::AppleAppStore),
            "GooglePlay" => Ok(PaymentVendor::GooglePlay),
            other => Err(ValidationError::invalid_format(
                "vendor",
                format!("unknown payment vendor '{}'", other),
            )),
        }
    }
}
