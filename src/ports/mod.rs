//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Persistence Ports
//!
//! - `BuyableRepository` - Catalog lookups
//! - `PurchaseLedger` - Purchase and payment transaction persistence
//! - `SubscriptionRepository` - UserSubscription persistence with change auditing
//!
//! ## Vendor Ports
//!
//! - `AppStoreClient` - App Store Server / Connect API calls
//! - `GooglePlayClient` - Google Play Developer API calls
//!
//! ## Event Ports
//!
//! - `EventPublisher` - Port for publishing domain events

mod app_store_client;
mod buyable_repository;
mod event_publisher;
mod google_play_client;
mod purchase_ledger;
mod subscription_repository;

pub use app_store_client::AppStoreClient;
pub use buyable_repository::BuyableRepository;
pub use event_publisher::EventPublisher;
pub use google_play_client::GooglePlayClient;
pub use purchase_ledger::{CommitOutcome, PurchaseLedger};
pub use subscription_repository::SubscriptionRepository;
