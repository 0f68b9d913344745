//! Google Play integration.
//!
//! Two pieces: the Pub/Sub push verifier that turns a webhook body into
//! a normalized notification event, and the androidpublisher API client
//! used for live subscription lookups.

mod client;
mod verifier;

pub use client::GooglePlayApiClient;
pub use verifier::GooglePlayNotificationVerifier;
