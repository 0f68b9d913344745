//! Vendor notification domain module.
//!
//! Classification enums and the normalized event container for store
//! webhooks. The byte-level verifiers that produce these events live
//! with the vendor adapters; this module only knows decoded shapes.
//!
//! # Module Structure
//!
//! - `event` - NotificationEvent container and vendor aliases
//! - `google` - Google Play notification types and subtype codes
//! - `apple` - App Store notification types and subtypes
//! - `errors` - NotificationError

mod apple;
mod errors;
mod event;
mod google;

pub use apple::{AppStoreNotificationSubtype, AppStoreNotificationType};
pub use errors::NotificationError;
pub use event::{AppStoreNotification, GooglePlayNotification, NotificationEvent};
pub use google::{GooglePlayNotificationSubtype, GooglePlayNotificationType};
