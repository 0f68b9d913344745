//! Subscription domain events.
//!
//! Emitted on entitlement lifecycle changes, for audit logging and for
//! downstream consumers (access control caches, messaging). Events are
//! named in past tense: something already happened by the time one is
//! published.

use crate::domain::foundation::{
    BuyableId, DomainEvent, EventId, PurchaseId, SubscriptionId, Timestamp, UserId,
};
use serde::{Deserialize, Serialize};

use super::SubscriptionStatus;

/// Events that occur during a subscription's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubscriptionEvent {
    /// A new entitlement window was opened for a paid purchase.
    Created {
        event_id: EventId,
        subscription_id: SubscriptionId,
        user_id: UserId,
        buyable_id: BuyableId,
        purchase_id: PurchaseId,
        status: SubscriptionStatus,
        expiration_date: Timestamp,
        occurred_at: Timestamp,
    },

    /// The entitlement was extended by one billing period.
    Renewed {
        event_id: EventId,
        subscription_id: SubscriptionId,
        user_id: UserId,
        new_expiration: Timestamp,
        occurred_at: Timestamp,
    },

    /// The entitlement lapsed or was withdrawn.
    Expired {
        event_id: EventId,
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// The vendor paused billing; access is withheld until it resumes.
    Suspended {
        event_id: EventId,
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },

    /// Auto-renew was turned off; access continues to the expiration.
    Canceled {
        event_id: EventId,
        subscription_id: SubscriptionId,
        user_id: UserId,
        occurred_at: Timestamp,
    },
}

impl SubscriptionEvent {
    /// Returns the versioned event type string for routing and filtering.
    pub fn event_type(&self) -> &'static str {
        match self {
            SubscriptionEvent::Created { .. } => "subscription.created.v1",
            SubscriptionEvent::Renewed { .. } => "subscription.renewed.v1",
            SubscriptionEvent::Expired { .. } => "subscription.expired.v1",
            SubscriptionEvent::Suspended { .. } => "subscription.suspended.v1",
            SubscriptionEvent::Canceled { .. } => "subscription.canceled.v1",
        }
    }

    /// Returns the subscription this event concerns.
    pub fn subscription_id(&self) -> SubscriptionId {
        match self {
            SubscriptionEvent::Created { subscription_id, .. }
            | SubscriptionEvent::Renewed { subscription_id, .. }
            | SubscriptionEvent::Expired { subscription_id, .. }
            | SubscriptionEvent::Suspended { subscription_id, .. }
            | SubscriptionEvent::Canceled { subscription_id, .. } => *subscription_id,
        }
    }

    /// Returns the user whose entitlement changed.
    pub fn user_id(&self) -> &UserId {
        match self {
            SubscriptionEvent::Created { user_id, .. }
            | SubscriptionEvent::Renewed { user_id, .. }
            | SubscriptionEvent::Expired { user_id, .. }
            | SubscriptionEvent::Suspended { user_id, .. }
            | SubscriptionEvent::Canceled { user_id, .. } => user_id,
        }
    }
}

impl DomainEvent for SubscriptionEvent {
    fn event_type(&self) -> &'static str {
        SubscriptionEvent::event_type(self)
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn aggregate_id(&self) -> String {
        self.subscription_id().to_string()
    }

    fn aggregate_type(&self) -> &'static str {
        "UserSubscription"
    }

    fn occurred_at(&self) -> Timestamp {
        match self {
            SubscriptionEvent::Created { occurred_at, .. }
            | SubscriptionEvent::Renewed { occurred_at, .. }
            | SubscriptionEvent::Expired { occurred_at, .. }
            | SubscriptionEvent::Suspended { occurred_at, .. }
            | SubscriptionEvent::Canceled { occurred_at, .. } => *occurred_at,
        }
    }

    fn event_id(&self) -> EventId {
        match self {
            SubscriptionEvent::Created { event_id, .. }
            | SubscriptionEvent::Renewed { event_id, .. }
            | SubscriptionEvent::Expired { event_id, .. }
            | SubscriptionEvent::Suspended { event_id, .. }
            | SubscriptionEvent::Canceled { event_id, .. } => event_id.clone(),
        }
    }
}
