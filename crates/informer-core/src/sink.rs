//! Event sink - bounded hand-off of lifecycle events to a consumer
//!
//! Producers run on the correlation path and must never wait. `publish`
//! either enqueues the event or drops it and counts the drop; there is no
//! retry and no buffering past the channel capacity.

use crate::events::LifecycleEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tracing::trace;

/// Destination for consolidated lifecycle events
pub trait EventSink: Send + Sync {
    /// Hand an event off without blocking. Returns false if it was dropped.
    fn publish(&self, event: LifecycleEvent) -> bool;
}

impl<S: EventSink + ?Sized> EventSink for Arc<S> {
    fn publish(&self, event: LifecycleEvent) -> bool {
        (**self).publish(event)
    }
}

/// Aggregate sink counters
#[derive(Debug, Default)]
pub struct SinkStats {
    published: AtomicU64,
    dropped: AtomicU64,
}

impl SinkStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> SinkStatsSnapshot {
        SinkStatsSnapshot {
            published: self.published(),
            dropped: self.dropped(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkStatsSnapshot {
    pub published: u64,
    pub dropped: u64,
}

/// Producer half of a bounded lifecycle event channel
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<LifecycleEvent>,
    stats: Arc<SinkStats>,
}

/// Consumer half of a bounded lifecycle event channel
pub struct SinkReceiver {
    rx: mpsc::Receiver<LifecycleEvent>,
    stats: Arc<SinkStats>,
}

/// Create a sink holding at most `capacity` undelivered events
pub fn channel(capacity: usize) -> (ChannelSink, SinkReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let stats = Arc::new(SinkStats::default());
    (
        ChannelSink {
            tx,
            stats: stats.clone(),
        },
        SinkReceiver { rx, stats },
    )
}

impl ChannelSink {
    pub fn stats(&self) -> Arc<SinkStats> {
        self.stats.clone()
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: LifecycleEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.stats.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("sink full, dropped {} event", event.kind);
                false
            }
            Err(TrySendError::Closed(event)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                trace!("sink closed, dropped {} event", event.kind);
                false
            }
        }
    }
}

impl SinkReceiver {
    /// Wait for the next event; `None` once every producer is gone
    pub async fn recv(&mut self) -> Option<LifecycleEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is queued
    pub fn try_recv(&mut self) -> Option<LifecycleEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Take everything currently queued
    pub fn drain(&mut self) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{
        ActorIdentity, Attributes, LifecycleKind, OperationKind, TrackedObject,
    };

    fn event(id: u32) -> LifecycleEvent {
        LifecycleEvent::new(
            LifecycleKind::Added,
            TrackedObject {
                object_id: id,
                owner: ActorIdentity::new(1, 1),
                kind: OperationKind::ProgramLoad,
                created_at: 0,
                attributes: Attributes::named("prog"),
            },
            id as u64,
        )
    }

    #[test]
    fn test_publish_and_drain() {
        let (sink, mut rx) = channel(4);
        assert!(sink.publish(event(1)));
        assert!(sink.publish(event(2)));
        let events = rx.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].object.object_id, 1);
        assert_eq!(sink.stats().published(), 2);
    }

    #[test]
    fn test_drop_on_full() {
        let (sink, mut rx) = channel(2);
        assert!(sink.publish(event(1)));
        assert!(sink.publish(event(2)));
        assert!(!sink.publish(event(3)));

        let stats = rx.stats().snapshot();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.dropped, 1);
        // The dropped event is gone for good
        assert_eq!(rx.drain().len(), 2);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_publish_after_consumer_gone() {
        let (sink, rx) = channel(2);
        drop(rx);
        assert!(!sink.publish(event(1)));
        assert_eq!(sink.stats().dropped(), 1);
    }

    #[test]
    fn test_many_producers() {
        let (sink, mut rx) = channel(1000);
        std::thread::scope(|s| {
            for t in 0..4u32 {
                let sink = sink.clone();
                s.spawn(move || {
                    for i in 0..100u32 {
                        sink.publish(event(t * 1000 + i));
                    }
                });
            }
        });
        assert_eq!(rx.drain().len(), 400);
    }

    #[tokio::test]
    async fn test_recv_ends_when_producers_dropped() {
        let (sink, mut rx) = channel(4);
        sink.publish(event(7));
        drop(sink);
        assert_eq!(rx.recv().await.map(|e| e.object.object_id), Some(7));
        assert!(rx.recv().await.is_none());
    }
}
