//! Vendor notification handlers.
//!
//! One handler per store, constructed over ports and invoked once per
//! webhook delivery. Dispatch is an explicit match on the notification
//! (type, subtype) pair; combinations the stores added since this code
//! was written fall through to a logged no-op so the webhook endpoint
//! never fails on them.
//!
//! Row resolution goes exclusively through vendor transaction ids
//! against the purchase ledger. The webhook body names no user and is
//! never trusted to.

mod app_store;
mod google_play;

pub use app_store::{AppStoreWebhookHandler, HandleAppStoreNotificationCommand};
pub use google_play::{GooglePlayWebhookHandler, HandleGooglePlayNotificationCommand};

/// What a webhook delivery did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// A mapped action ran.
    Applied { action: &'static str },

    /// The pair is mapped to a deliberate no-op.
    NoOp,

    /// The pair is not in the dispatch table.
    Ignored,
}

impl WebhookOutcome {
    /// The action label, for logging.
    pub fn action(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied { action } => action,
            WebhookOutcome::NoOp => "none",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}
