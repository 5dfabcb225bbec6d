//! Bounded, non-blocking event channel shared by every gateway subsystem
//! that publishes observability events (spec.md §5 "Event channels":
//! capacity 100, senders never block, drop on full with a dropped-events
//! counter).

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Fixed per spec.md §5; not configurable, matching the spec's framing of
/// this as a hard system property rather than a tunable.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// A single-producer-multi-consumer event bus. `publish` never blocks: a
/// full channel evicts its oldest buffered event (broadcast semantics),
/// which is reported to late subscribers as a lag and counted here.
pub struct EventChannel<T> {
    sender: broadcast::Sender<T>,
    dropped: AtomicU64,
}

impl<T: Clone> EventChannel<T> {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender, dropped: AtomicU64::new(0) }
    }

    /// Publishes `event` to every current subscriber. Returns without
    /// blocking regardless of subscriber count or channel fullness.
    pub fn publish(&self, event: T) {
        // `send` fails only when there are no receivers; that's not an
        // overflow, so it isn't counted as a drop.
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.sender.subscribe()
    }

    /// Call from a subscriber's receive loop when `recv()` returns
    /// `Lagged(n)`: records that `n` events were dropped before this
    /// subscriber could see them.
    pub fn record_lagged(&self, skipped: u64) {
        self.dropped.fetch_add(skipped, Ordering::Relaxed);
    }

    #[must_use]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T: Clone> Default for EventChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// State transitions from the load balancer's health view, the circuit
/// breaker, and the health checker, all published on one channel so a
/// single observability sink can subscribe to every subsystem (spec.md
/// §4.4/§4.5/§4.6 "feeds the circuit breaker" / "publishes... transitions").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    BreakerTransition { backend_id: crate::model::BackendId, event: crate::balancer::BreakerEvent },
    BackendStatusChanged { backend_id: crate::model::BackendId, status: crate::model::BackendStatus },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_subscriber_receives_published_events() {
        let channel: EventChannel<u32> = EventChannel::new();
        let mut rx = channel.subscribe();
        channel.publish(7);
        assert_eq!(rx.recv().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_panic() {
        let channel: EventChannel<u32> = EventChannel::new();
        channel.publish(1);
    }

    #[tokio::test]
    async fn overflow_is_reported_as_lag_and_can_be_counted() {
        let channel: EventChannel<u32> = EventChannel::new();
        let mut rx = channel.subscribe();
        for i in 0..(EVENT_CHANNEL_CAPACITY as u32 + 5) {
            channel.publish(i);
        }
        match rx.recv().await {
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                channel.record_lagged(skipped);
                assert!(channel.dropped_count() > 0);
            }
            other => panic!("expected a lag error, got {other:?}"),
        }
    }
}
