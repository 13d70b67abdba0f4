//! The in-process event bus (`spec.md` §4.3 "Event bus and notification
//! fan-out").
//!
//! Single-producer multi-consumer, process-local: the analysis daemon
//! publishes, the web daemon subscribes. Each subscriber gets its own
//! bounded buffer (`tokio::sync::broadcast`'s per-receiver queue already
//! has exactly this shape) so a slow subscriber never blocks a fast one;
//! when a subscriber falls behind far enough that the buffer wraps, the
//! oldest un-received detections are dropped, which `broadcast` surfaces
//! as `RecvError::Lagged(n)` on the next `recv()`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::types::Detection;

/// Per-bus counters exposed for the health/metrics surface (`spec.md` §4.3
/// "overflow drops the oldest, logs, and increments a metric").
#[derive(Debug, Default)]
pub struct EventBusMetrics {
    pub published: AtomicU64,
    pub dropped: AtomicU64,
}

/// The publisher handle, held by the analysis daemon. Cloning is cheap
/// (it clones the underlying `broadcast::Sender`, an `Arc` internally).
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<Detection>>,
    metrics: Arc<EventBusMetrics>,
}

/// A single subscriber's receive half. `recv` surfaces lag as a logged,
/// counted drop rather than propagating `RecvError` to the caller: from
/// the subscriber's point of view there is no failure mode, only
/// "the next detection available," per the spec's "never surface a cache
/// failure as a request failure"-style philosophy applied to the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<Arc<Detection>>,
    metrics: Arc<EventBusMetrics>,
}

impl EventBus {
    /// `buffer` is the per-subscriber bounded buffer size; a subscriber
    /// that falls more than `buffer` detections behind starts losing the
    /// oldest ones.
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            sender,
            metrics: Arc::new(EventBusMetrics::default()),
        }
    }

    /// Publishes `detection` to every current subscriber. Fire-and-forget
    /// per `spec.md` §4.2 "the bus publish is fire-and-forget and must not
    /// block detection creation": a full buffer never blocks the sender,
    /// it only evicts the oldest unread entry for lagging subscribers.
    pub fn publish(&self, detection: Detection) {
        self.metrics.published.fetch_add(1, Ordering::Relaxed);
        // No receivers yet is not an error: a detection published before
        // the web daemon has subscribed is simply not delivered to anyone.
        let _ = self.sender.send(Arc::new(detection));
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            metrics: self.metrics.clone(),
        }
    }

    pub fn metrics(&self) -> Arc<EventBusMetrics> {
        self.metrics.clone()
    }
}

impl Subscription {
    /// Waits for the next detection, transparently skipping over any gap
    /// left by a lag (logging and counting it) rather than returning it to
    /// the caller as an error.
    pub async fn recv(&mut self) -> Option<Arc<Detection>> {
        loop {
            match self.receiver.recv().await {
                Ok(detection) => return Some(detection),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.metrics.dropped.fetch_add(skipped, Ordering::Relaxed);
                    tracing::warn!(skipped, "event bus subscriber lagged, oldest detections dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NewDetection;

    fn sample_detection() -> Detection {
        Detection::new(
            NewDetection {
                scientific_name: "Turdus migratorius".to_string(),
                common_name: "American Robin".to_string(),
                confidence: 0.95,
                latitude: Some(40.0),
                longitude: Some(-74.0),
                species_confidence_threshold: 0.5,
                sensitivity_setting: 1.0,
                overlap: 0.5,
                week: 20,
                audio_file_id: None,
            },
            chrono::Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn every_subscriber_receives_every_publish() {
        let bus = EventBus::new(8);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        bus.publish(sample_detection());

        assert_eq!(a.recv().await.unwrap().scientific_name, "Turdus migratorius");
        assert_eq!(b.recv().await.unwrap().scientific_name, "Turdus migratorius");
    }

    #[tokio::test]
    async fn a_slow_subscriber_does_not_block_a_fast_one() {
        let bus = EventBus::new(2);
        let mut fast = bus.subscribe();
        let _slow = bus.subscribe();

        for _ in 0..5 {
            bus.publish(sample_detection());
        }

        // The fast subscriber can still drain everything it was sent
        // without the publisher having blocked on the slow one.
        for _ in 0..2 {
            assert!(fast.recv().await.is_some());
        }
    }

    #[tokio::test]
    async fn overflow_increments_the_dropped_counter() {
        let bus = EventBus::new(1);
        let mut lagging = bus.subscribe();

        bus.publish(sample_detection());
        bus.publish(sample_detection());
        bus.publish(sample_detection());

        assert!(lagging.recv().await.is_some());
        assert!(bus.metrics().dropped.load(Ordering::Relaxed) > 0);
    }
}
