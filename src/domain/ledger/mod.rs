//! Purchase ledger domain module.
//!
//! Purchases, their payment transactions, and the vendors that processed
//! them. The ledger is append-heavy: store renewals add transactions, and
//! the `(vendor, vendor_transaction_id)` uniqueness makes resubmitted
//! receipts harmless.
//!
//! # Module Structure
//!
//! - `purchase` - Purchase aggregate and line items
//! - `transaction` - PaymentTransaction entity and payment statuses
//! - `vendor` - PaymentVendor wire values
//! - `errors` - PurchaseError

mod errors;
mod purchase;
mod transaction;
mod vendor;

pub use errors::PurchaseError;
pub use purchase::{Purchase, PurchasedBuyable};
pub use transaction::{PaymentStatus, PaymentTransaction, TransactionPricing};
pub use vendor::PaymentVendor;
