//! In-flight two-phase operations
//!
//! An entry is recorded when a creating syscall is entered and consumed when
//! the same (actor, kind) exits. There is no timeout: an entry whose exit is
//! never seen stays until capacity pressure evicts it.

use informer_core::events::{ActorIdentity, Attributes, OperationKind, PendingOperation};
use informer_core::metrics::SharedMetrics;
use informer_core::store::{KeyedStateStore, OverflowPolicy};
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

/// Correlation key of a pending operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingKey {
    pub actor: ActorIdentity,
    pub kind: OperationKind,
}

/// Table of operations whose entry was seen but not their exit
pub struct PendingOperationTracker {
    table: KeyedStateStore<PendingKey, PendingOperation>,
    metrics: SharedMetrics,
}

impl PendingOperationTracker {
    pub fn new(
        capacity: usize,
        shards: usize,
        policy: OverflowPolicy,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            table: KeyedStateStore::new(capacity, shards, policy),
            metrics,
        }
    }

    /// Record the start of an operation.
    ///
    /// A second begin for the same (actor, kind) replaces the first. A full
    /// table loses the begin; neither case is reported to the caller.
    pub fn begin(
        &self,
        actor: ActorIdentity,
        kind: OperationKind,
        attributes: Attributes,
        now: u64,
    ) {
        let op = PendingOperation {
            actor,
            kind,
            started_at: now,
            attributes,
        };

        match self.table.upsert(PendingKey { actor, kind }, op) {
            Ok(None) => {
                self.metrics.pending.begun.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Some(previous)) => {
                self.metrics.pending.begun.fetch_add(1, Ordering::Relaxed);
                self.metrics.pending.overwritten.fetch_add(1, Ordering::Relaxed);
                debug!(
                    %actor,
                    %kind,
                    previous_started_at = previous.started_at,
                    "unfinished {} replaced by a new begin",
                    kind
                );
            }
            Err(err) => {
                self.metrics.pending.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(%actor, %kind, "begin dropped: {}", err);
            }
        }
    }

    /// Consume the pending entry matching (actor, kind).
    ///
    /// `None` means no begin was observed for it, which is expected when the
    /// informer started mid-operation or the entry was evicted.
    pub fn complete(
        &self,
        actor: ActorIdentity,
        kind: OperationKind,
        result_handle: i64,
        now: u64,
    ) -> Option<PendingOperation> {
        let op = self.table.remove(&PendingKey { actor, kind })?;
        self.metrics.pending.completed.fetch_add(1, Ordering::Relaxed);
        trace!(
            %actor,
            %kind,
            result_handle,
            latency_ns = now.saturating_sub(op.started_at),
            "pending operation completed"
        );
        Some(op)
    }

    /// Drop the pending entry for (actor, kind), if any
    pub fn discard(&self, actor: ActorIdentity, kind: OperationKind) -> Option<PendingOperation> {
        self.table.remove(&PendingKey { actor, kind })
    }

    pub fn lookup(&self, actor: ActorIdentity, kind: OperationKind) -> Option<PendingOperation> {
        self.table.lookup(&PendingKey { actor, kind })
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Entries reclaimed by capacity pressure
    pub fn evicted(&self) -> u64 {
        self.table.evicted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use informer_core::metrics::create_metrics;
    use informer_core::store::DEFAULT_SHARDS;

    fn tracker(capacity: usize) -> PendingOperationTracker {
        PendingOperationTracker::new(capacity, 4, OverflowPolicy::EvictLeastRecent, create_metrics())
    }

    #[test]
    fn test_complete_returns_begin_attributes() {
        let tracker = tracker(32);
        let actors: Vec<_> = (0..8).map(|i| ActorIdentity::new(100 + i, 200 + i)).collect();

        for (i, actor) in actors.iter().enumerate() {
            for kind in OperationKind::ALL {
                let attrs = Attributes {
                    size: i as u32,
                    ..Attributes::named(kind.as_str())
                };
                tracker.begin(*actor, kind, attrs, i as u64);
            }
        }
        // 32 begins on a 32-slot table: every one must still be there
        assert_eq!(tracker.len(), 32);
        assert_eq!(tracker.evicted(), 0);

        for (i, actor) in actors.iter().enumerate() {
            for kind in OperationKind::ALL {
                let op = tracker.complete(*actor, kind, 1, 100).unwrap();
                assert_eq!(op.attributes.size, i as u32);
                assert_eq!(op.attributes.name.to_string_lossy(), kind.as_str());
                assert_eq!(op.actor, *actor);
                assert_eq!(op.kind, kind);
            }
        }
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_round_trip_unique_keys() {
        let tracker = tracker(64);
        let actor = ActorIdentity::new(1, 2);
        let attrs = Attributes {
            flags: 0x10,
            size: 4096,
            ..Attributes::named("ringbuf")
        };
        tracker.begin(actor, OperationKind::MapCreate, attrs, 10);
        let op = tracker.complete(actor, OperationKind::MapCreate, 42, 20).unwrap();
        assert_eq!(op.attributes, attrs);
        assert_eq!(op.started_at, 10);
        assert!(tracker.complete(actor, OperationKind::MapCreate, 42, 21).is_none());
    }

    #[test]
    fn test_second_begin_wins() {
        let metrics = create_metrics();
        let tracker =
            PendingOperationTracker::new(8, 1, OverflowPolicy::EvictLeastRecent, metrics.clone());
        let actor = ActorIdentity::new(5, 5);

        tracker.begin(actor, OperationKind::ProgramLoad, Attributes::named("first"), 1);
        tracker.begin(actor, OperationKind::ProgramLoad, Attributes::named("second"), 2);

        let op = tracker.complete(actor, OperationKind::ProgramLoad, 3, 3).unwrap();
        assert_eq!(op.attributes.name.to_string_lossy(), "second");
        assert_eq!(metrics.snapshot().pending_overwritten, 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_complete_without_begin() {
        let tracker = tracker(8);
        let actor = ActorIdentity::new(2, 2);
        assert!(tracker.complete(actor, OperationKind::ProgramLoad, 9, 1).is_none());
    }

    #[test]
    fn test_kinds_do_not_collide() {
        let tracker = tracker(8);
        let actor = ActorIdentity::new(3, 3);
        tracker.begin(actor, OperationKind::MapCreate, Attributes::named("map"), 1);
        tracker.begin(actor, OperationKind::ProgramLoad, Attributes::named("prog"), 2);
        assert_eq!(tracker.len(), 2);
        let map = tracker.complete(actor, OperationKind::MapCreate, 4, 3).unwrap();
        assert_eq!(map.attributes.name.to_string_lossy(), "map");
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_capacity_one_holds_single_entry() {
        let metrics = create_metrics();
        let tracker = PendingOperationTracker::new(
            1,
            DEFAULT_SHARDS,
            OverflowPolicy::EvictLeastRecent,
            metrics.clone(),
        );
        // 2 * capacity + 1 begins with distinct keys
        for i in 0..3u32 {
            tracker.begin(ActorIdentity::new(i, i), OperationKind::MapCreate, Attributes::default(), 0);
        }
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.evicted(), 2);
        // Evictions are not drops: every begin was stored at least briefly
        let s = metrics.snapshot();
        assert_eq!(s.pending_begun, 3);
        assert_eq!(s.pending_dropped, 0);
    }

    #[test]
    fn test_reject_policy_counts_drops() {
        let metrics = create_metrics();
        let tracker = PendingOperationTracker::new(1, 1, OverflowPolicy::Reject, metrics.clone());
        tracker.begin(ActorIdentity::new(1, 1), OperationKind::MapCreate, Attributes::default(), 0);
        tracker.begin(ActorIdentity::new(2, 2), OperationKind::MapCreate, Attributes::default(), 0);
        assert_eq!(tracker.len(), 1);
        assert_eq!(metrics.snapshot().pending_dropped, 1);
        assert!(tracker.lookup(ActorIdentity::new(1, 1), OperationKind::MapCreate).is_some());
    }
}
