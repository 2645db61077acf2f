//! Subscription-id routing for inbound NOTIFY requests.
//!
//! Only ids registered by the subscription owner are accepted. Each accepted
//! notification is forwarded untouched, with its GENA event key, to a
//! single channel.
//!
//! A device may send its initial full-state NOTIFY before the SUBSCRIBE
//! response carrying the new `SID` has been read. While a SUBSCRIBE is in
//! flight ([`EventRouter::begin_pending`]), notifications for unknown ids are
//! held instead of refused, and released when their id is registered.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Notifications held per pending window; older ones are dropped first
pub const MAX_HELD_NOTIFICATIONS: usize = 16;

/// Unparsed event notification received from the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    /// `SID` header of the NOTIFY
    pub subscription_id: String,
    /// `SEQ` header, the GENA event key, when the device sent a valid one
    pub sequence: Option<u32>,
    /// Raw `e:propertyset` body
    pub event_xml: String,
}

/// What the router did with a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Forwarded to the channel, or discarded because the consumer is gone
    Accepted,
    /// Unknown id received while a SUBSCRIBE is in flight; kept until the id
    /// is registered or the pending window closes
    Held,
    /// The subscription id is not registered
    UnknownSubscription,
}

impl Delivery {
    /// Whether the device should be answered with success
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Delivery::UnknownSubscription)
    }
}

#[derive(Debug, Default)]
struct RouterState {
    /// Registered ids and the last event key seen for each
    sequences: HashMap<String, Option<u32>>,
    /// SUBSCRIBE requests currently awaiting their response
    pending: usize,
    held: Vec<NotificationPayload>,
}

/// Accepts or drops notifications by subscription id.
///
/// Cloning shares the registered set.
#[derive(Debug, Clone)]
pub struct EventRouter {
    state: Arc<RwLock<RouterState>>,
    sender: mpsc::UnboundedSender<NotificationPayload>,
}

impl EventRouter {
    pub fn new(sender: mpsc::UnboundedSender<NotificationPayload>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RouterState::default())),
            sender,
        }
    }

    /// Start accepting `subscription_id`.
    ///
    /// Re-registering an id keeps it accepted and forgets its last event key.
    /// Notifications held for the id are forwarded in arrival order.
    ///
    /// ```
    /// # use tokio::sync::mpsc;
    /// # use callback_server::EventRouter;
    /// # #[tokio::main]
    /// # async fn main() {
    /// # let (tx, _rx) = mpsc::unbounded_channel();
    /// let router = EventRouter::new(tx);
    /// router.register("uuid:avt-1".to_string()).await;
    /// assert!(router.is_registered("uuid:avt-1").await);
    /// # }
    /// ```
    pub async fn register(&self, subscription_id: String) {
        let released = {
            let mut state = self.state.write().await;
            let (released, kept) = std::mem::take(&mut state.held)
                .into_iter()
                .partition::<Vec<_>, _>(|held| held.subscription_id == subscription_id);
            state.held = kept;

            let last = released.iter().rev().find_map(|held| held.sequence);
            state.sequences.insert(subscription_id, last);
            released
        };

        for notification in released {
            tracing::debug!(sid = %notification.subscription_id, "Releasing held notification");
            self.forward(notification);
        }
    }

    pub async fn unregister(&self, subscription_id: &str) {
        self.state.write().await.sequences.remove(subscription_id);
    }

    pub async fn is_registered(&self, subscription_id: &str) -> bool {
        self.state.read().await.sequences.contains_key(subscription_id)
    }

    pub async fn registered_count(&self) -> usize {
        self.state.read().await.sequences.len()
    }

    /// Last event key delivered for `subscription_id`
    pub async fn last_sequence(&self, subscription_id: &str) -> Option<u32> {
        self.state
            .read()
            .await
            .sequences
            .get(subscription_id)
            .copied()
            .flatten()
    }

    /// Open a pending window for one SUBSCRIBE about to be sent.
    ///
    /// Every call must be matched by [`EventRouter::end_pending`].
    pub async fn begin_pending(&self) {
        self.state.write().await.pending += 1;
    }

    /// Close one pending window. When none remain open, notifications still
    /// held belong to no subscription and are dropped.
    pub async fn end_pending(&self) {
        let mut state = self.state.write().await;
        state.pending = state.pending.saturating_sub(1);

        if state.pending == 0 && !state.held.is_empty() {
            tracing::debug!(
                dropped = state.held.len(),
                "Dropping notifications for subscriptions never granted"
            );
            state.held.clear();
        }
    }

    /// Number of notifications currently held
    pub async fn held_count(&self) -> usize {
        self.state.read().await.held.len()
    }

    /// Forward a notification if its subscription id is registered, or hold
    /// it while a SUBSCRIBE is pending.
    ///
    /// A gap in the event key is logged but the notification is still
    /// delivered; `LastChange` always carries the full current values.
    pub async fn route(&self, notification: NotificationPayload) -> Delivery {
        {
            let mut state = self.state.write().await;
            let pending = state.pending;

            let Some(last) = state.sequences.get_mut(&notification.subscription_id) else {
                if pending == 0 {
                    return Delivery::UnknownSubscription;
                }

                if state.held.len() >= MAX_HELD_NOTIFICATIONS {
                    state.held.remove(0);
                }
                state.held.push(notification);
                return Delivery::Held;
            };

            if let (Some(previous), Some(current)) = (*last, notification.sequence) {
                if current != previous.wrapping_add(1) {
                    tracing::debug!(
                        sid = %notification.subscription_id,
                        previous,
                        current,
                        "Event key gap"
                    );
                }
            }
            if notification.sequence.is_some() {
                *last = notification.sequence;
            }
        }

        self.forward(notification);
        Delivery::Accepted
    }

    fn forward(&self, notification: NotificationPayload) {
        if self.sender.send(notification).is_err() {
            tracing::debug!("Notification consumer is gone, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(sid: &str, sequence: Option<u32>) -> NotificationPayload {
        NotificationPayload {
            subscription_id: sid.to_string(),
            sequence,
            event_xml: "<e:propertyset/>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_registered_notification_is_forwarded() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);
        router.register("uuid:avt-1".to_string()).await;

        let delivery = router.route(notification("uuid:avt-1", Some(0))).await;

        assert_eq!(delivery, Delivery::Accepted);
        assert_eq!(rx.recv().await, Some(notification("uuid:avt-1", Some(0))));
        assert_eq!(router.last_sequence("uuid:avt-1").await, Some(0));
    }

    #[tokio::test]
    async fn test_unregistered_notification_is_dropped() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);
        router.register("uuid:avt-1".to_string()).await;
        router.unregister("uuid:avt-1").await;

        assert_eq!(
            router.route(notification("uuid:avt-1", None)).await,
            Delivery::UnknownSubscription
        );
        assert_eq!(
            router.route(notification("uuid:never", None)).await,
            Delivery::UnknownSubscription
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_sequence_gap_still_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);
        router.register("uuid:rcs-1".to_string()).await;

        router.route(notification("uuid:rcs-1", Some(3))).await;
        router.route(notification("uuid:rcs-1", Some(7))).await;
        router.route(notification("uuid:rcs-1", None)).await;

        assert_eq!(rx.recv().await.and_then(|n| n.sequence), Some(3));
        assert_eq!(rx.recv().await.and_then(|n| n.sequence), Some(7));
        assert_eq!(rx.recv().await.map(|n| n.sequence), Some(None));
        assert_eq!(router.last_sequence("uuid:rcs-1").await, Some(7));
    }

    #[tokio::test]
    async fn test_reregistering_resets_sequence() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);
        router.register("uuid:avt-1".to_string()).await;
        router.route(notification("uuid:avt-1", Some(5))).await;

        router.register("uuid:avt-1".to_string()).await;

        assert_eq!(router.registered_count().await, 1);
        assert_eq!(router.last_sequence("uuid:avt-1").await, None);
    }

    #[tokio::test]
    async fn test_initial_event_before_registration_is_released() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);

        router.begin_pending().await;
        let delivery = router.route(notification("uuid:avt-1", Some(0))).await;
        assert_eq!(delivery, Delivery::Held);
        assert!(delivery.is_accepted());
        assert!(rx.try_recv().is_err());

        router.register("uuid:avt-1".to_string()).await;
        router.end_pending().await;

        assert_eq!(rx.recv().await, Some(notification("uuid:avt-1", Some(0))));
        assert_eq!(router.last_sequence("uuid:avt-1").await, Some(0));
        assert_eq!(router.held_count().await, 0);
    }

    #[tokio::test]
    async fn test_held_events_for_other_ids_are_dropped_when_window_closes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);

        router.begin_pending().await;
        router.route(notification("uuid:other", Some(0))).await;
        router.register("uuid:avt-1".to_string()).await;
        assert_eq!(router.held_count().await, 1);

        router.end_pending().await;

        assert_eq!(router.held_count().await, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            router.route(notification("uuid:other", Some(1))).await,
            Delivery::UnknownSubscription
        );
    }

    #[tokio::test]
    async fn test_held_notifications_are_bounded() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);

        router.begin_pending().await;
        for seq in 0..(MAX_HELD_NOTIFICATIONS as u32 + 4) {
            router.route(notification("uuid:avt-1", Some(seq))).await;
        }

        assert_eq!(router.held_count().await, MAX_HELD_NOTIFICATIONS);
    }

    #[tokio::test]
    async fn test_closed_consumer_still_accepts() {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = EventRouter::new(tx);
        router.register("uuid:avt-1".to_string()).await;
        drop(rx);

        assert!(router.route(notification("uuid:avt-1", None)).await.is_accepted());
    }
}
