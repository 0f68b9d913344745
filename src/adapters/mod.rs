//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `app_store` - App Store Server/Connect API client and notification decoding
//! - `google_play` - Google Play Developer API client and Pub/Sub decoding
//! - `events` - Event bus implementations (in-memory)
//! - `http` - REST API surface (Axum)
//! - `postgres` - Persistence (sqlx)

pub mod app_store;
pub mod events;
pub mod google_play;
pub mod http;
pub mod postgres;

pub use events::InMemoryEventBus;
