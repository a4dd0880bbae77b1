//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Traffic is partitioned into four [`Topic`] lanes so components only
//! receive the messages they care about:
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::StateStream`] | High-frequency per-object pose updates |
//! | [`Topic::Rpc`] | Low-frequency control messages (anchor advertisements, spawn, reset, ownership) |
//! | [`Topic::AnchorEvents`] | Located-anchor progress from the watcher |
//! | [`Topic::SessionAlerts`] | Safety warnings: stalled components, rejected calibrations, denied operations |

use coframe_types::{Event, ShareError};
use futures_util::Stream;
use futures_util::stream;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all first-class routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// High-frequency per-object pose updates.
    StateStream,
    /// Low-frequency control messages: anchor advertisements, spawn, reset,
    /// ownership changes.
    Rpc,
    /// Located-anchor progress events from the watcher.
    AnchorEvents,
    /// Safety warnings: stalled components, rejected calibrations, denied
    /// operations.
    SessionAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    state_stream: broadcast::Sender<Event>,
    rpc: broadcast::Sender<Event>,
    anchor_events: broadcast::Sender<Event>,
    session_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity, applied to every
    /// topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let (state_stream, _) = broadcast::channel(capacity);
        let (rpc, _) = broadcast::channel(capacity);
        let (anchor_events, _) = broadcast::channel(capacity);
        let (session_alerts, _) = broadcast::channel(capacity);
        Self {
            state_stream,
            rpc,
            anchor_events,
            session_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active subscribers that were handed the event.
    /// Zero subscribers is a normal condition (nobody is watching that lane
    /// right now), not an error.
    pub fn publish(&self, topic: Topic, event: Event) -> usize {
        match self.topic_sender(topic).send(event) {
            Ok(n) => n,
            Err(_) => 0,
        }
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::StateStream => &self.state_stream,
            Topic::Rpc => &self.rpc,
            Topic::AnchorEvents => &self.anchor_events,
            Topic::SessionAlerts => &self.session_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TopicReceiver
// ────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe`].  A subscriber that falls behind is
/// skipped forward: dropped events are logged and the next live event is
/// returned, so slow consumers degrade instead of stalling the bus.
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns [`ShareError::Channel`] only when the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, ShareError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "bus subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ShareError::Channel(format!(
                        "bus topic {:?} closed",
                        self.topic
                    )));
                }
            }
        }
    }

    /// Non-blocking variant for tick-driven callers.  `None` when nothing is
    /// waiting (or the lane is closed).
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "bus subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Adapt the receiver into a [`Stream`] of events, ending when the bus
    /// shuts down.
    pub fn into_stream(self) -> impl Stream<Item = Event> {
        stream::unfold(self, |mut receiver| async move {
            receiver.recv().await.ok().map(|event| (event, receiver))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coframe_types::{AnchorId, EventPayload, LocateStatus};
    use futures_util::StreamExt;

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::AnchorLocated {
                anchor_id: AnchorId::from("anchor-0"),
                status: LocateStatus::Located,
            },
        )
    }

    #[tokio::test]
    async fn publish_and_receive_on_topic() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe(Topic::AnchorEvents);

        let event = make_event("coframe-net::test");
        assert_eq!(bus.publish(Topic::AnchorEvents, event.clone()), 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, event.id);
        assert_eq!(received.source, event.source);
    }

    #[test]
    fn publish_without_subscribers_reaches_nobody() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(Topic::Rpc, make_event("test")), 0);
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe(Topic::SessionAlerts);
        let mut rx2 = bus.subscribe(Topic::SessionAlerts);

        let event = make_event("coframe-session::watchdog");
        assert_eq!(bus.publish(Topic::SessionAlerts, event.clone()), 2);

        assert_eq!(rx1.recv().await.unwrap().id, event.id);
        assert_eq!(rx2.recv().await.unwrap().id, event.id);
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe(Topic::SessionAlerts);
        let _state = bus.subscribe(Topic::StateStream);

        bus.publish(Topic::StateStream, make_event("coframe-net::stream"));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "alert lane must not see state traffic");
    }

    #[tokio::test]
    async fn slow_subscriber_skips_forward_instead_of_stalling() {
        let bus = EventBus::new(4);
        let mut slow = bus.subscribe(Topic::StateStream);

        for _ in 0..64 {
            bus.publish(Topic::StateStream, make_event("flood"));
        }

        // The receiver lost the oldest events but still yields a live one.
        assert!(slow.recv().await.is_ok());
    }

    #[tokio::test]
    async fn try_recv_does_not_block() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe(Topic::Rpc);
        assert!(rx.try_recv().is_none());

        bus.publish(Topic::Rpc, make_event("coframe-net::rpc"));
        assert!(rx.try_recv().is_some());
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn stream_adapter_yields_events() {
        let bus = EventBus::default();
        let rx = bus.subscribe(Topic::AnchorEvents);

        let event = make_event("coframe-anchors::sim");
        bus.publish(Topic::AnchorEvents, event.clone());

        let mut stream = Box::pin(rx.into_stream());
        let received = stream.next().await.unwrap();
        assert_eq!(received.id, event.id);
    }

    #[test]
    fn receiver_reports_its_topic() {
        let bus = EventBus::default();
        assert_eq!(bus.subscribe(Topic::Rpc).topic(), Topic::Rpc);
    }
}
