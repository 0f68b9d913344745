//! HTTP adapter for billing endpoints.
//!
//! Exposes purchase recording, entitlement reads, and the store webhook
//! intake via REST API:
//! - `POST /api/purchases` - Record a store purchase from a submitted receipt
//! - `GET /api/subscription` - Get current user's reconciled subscription
//! - `POST /api/webhooks/google-play` - Handle Google Play Pub/Sub pushes
//! - `POST /api/webhooks/app-store` - Handle App Store server notifications

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AuthenticatedUser, BillingAppState};
pub use routes::{billing_router, billing_routes, webhook_routes};
