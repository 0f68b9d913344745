//! User subscription domain module.
//!
//! The entitlement side of billing: which user can access what, until
//! when. Rows are written when paid transactions land and corrected
//! lazily whenever they are read, so a subscription that ran past its
//! expiration date flips to expired the next time anyone looks at it.
//!
//! # Module Structure
//!
//! - `aggregate` - UserSubscription aggregate with lifecycle mutators
//! - `status` - SubscriptionStatus and its access rule
//! - `change` - Audit snapshots for off-schedule mutations
//! - `events` - SubscriptionEvent definitions
//! - `errors` - SubscriptionError

mod aggregate;
mod change;
mod errors;
mod events;
mod status;

pub use aggregate::UserSubscription;
pub use change::{needs_change_record, SubscriptionChangeRecord};
pub use errors::SubscriptionError;
pub use events::SubscriptionEvent;
pub use status::SubscriptionStatus;
