//! HTTP adapters - REST API implementations.
//!
//! The billing adapter carries the whole public surface: purchase
//! recording, entitlement reads, and the store webhook intake.

pub mod billing;

// Re-export key types for convenience
pub use billing::billing_router;
pub use billing::BillingAppState;
