//! Presence bounded context - Busy Lamp Field subscriptions

pub mod manager;
pub mod subscription;
pub mod value_object;

pub use manager::{PresenceManager, SubscribeOutcome};
pub use subscription::{BlfSubscription, SubscriptionStatus};
pub use value_object::{presence_for, DialogState, Presence};
