//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! This module provides adapters for PostgreSQL-backed persistence:
//! - `PostgresBuyableRepository` - Catalog lookups
//! - `PostgresPurchaseLedger` - Purchases and payment transactions
//! - `PostgresSubscriptionRepository` - Subscription rows with change auditing

mod buyable_repository;
mod purchase_ledger;
mod subscription_repository;

pub use buyable_repository::PostgresBuyableRepository;
pub use purchase_ledger::PostgresPurchaseLedger;
pub use subscription_repository::PostgresSubscriptionRepository;
