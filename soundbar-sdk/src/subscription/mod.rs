//! Event subscriptions and the background listener

pub mod manager;
mod worker;

pub use manager::{EventSubscriber, Subscription, SubscriptionSet, SubscriptionState};
pub use worker::ListenerHandle;
pub(crate) use worker::{spawn_listener, ListenerContext};
