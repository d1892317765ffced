//! Lifecycle correlation
//!
//! Turns raw probe notifications into consolidated lifecycle events:
//!
//! ```text
//! Unknown -> PendingCreate -> Live -> (Updated)* -> Deleted
//! ```
//!
//! Every method takes `&self` and may run concurrently from any number of
//! producer threads. Nothing here blocks beyond a shard lock held for one
//! table operation, and nothing here fails: a notification that cannot be
//! correlated is counted and dropped.

use crate::pending::PendingOperationTracker;
use crate::registry::{Classification, ObjectRegistry, RegistryLimits};
use informer_core::config::TableSettings;
use informer_core::events::{
    ActorIdentity, Attributes, LifecycleEvent, LifecycleKind, Notification, ObjectKey,
    OperationKind, TrackedObject,
};
use informer_core::metrics::{create_metrics, MetricsSnapshot, SharedMetrics};
use informer_core::sink::EventSink;
use informer_core::CorrelationError;
use std::sync::atomic::Ordering;
use tracing::{debug, trace};

/// What handling one notification led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A creation was recorded as in flight
    Pending,
    /// A transition was applied and its event accepted by the sink
    Emitted(LifecycleKind),
    /// A transition was applied but the sink dropped its event
    SinkSaturated(LifecycleKind),
    /// No transition
    Ignored(IgnoreReason),
}

/// Why a notification produced no transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Creation returned a non-positive result
    FailedCreate,
    /// Completion with no recorded begin
    UnmatchedCompletion,
    /// Release of an object that was never tracked
    UnknownObject,
    /// Release that left references behind
    StillReferenced,
    /// Object id of zero or out of range
    InvalidId,
    /// Named registry table full, new object not tracked
    CapacityExceeded { table: &'static str },
}

impl Disposition {
    /// The error-taxonomy view of a degraded outcome
    pub fn error(&self) -> Option<CorrelationError> {
        match self {
            Disposition::SinkSaturated(_) => Some(CorrelationError::SinkSaturated),
            Disposition::Ignored(IgnoreReason::UnmatchedCompletion)
            | Disposition::Ignored(IgnoreReason::UnknownObject) => {
                Some(CorrelationError::UnmatchedCompletion)
            }
            Disposition::Ignored(IgnoreReason::CapacityExceeded { table }) => {
                Some(CorrelationError::CapacityExceeded { table: *table })
            }
            _ => None,
        }
    }

    /// The transition that was applied, whether or not its event got out
    pub fn transition(&self) -> Option<LifecycleKind> {
        match self {
            Disposition::Emitted(kind) | Disposition::SinkSaturated(kind) => Some(*kind),
            _ => None,
        }
    }
}

/// Orchestrates the pending table, the registry and the sink
pub struct LifecycleCorrelator<S> {
    pending: PendingOperationTracker,
    registry: ObjectRegistry,
    sink: S,
    metrics: SharedMetrics,
}

impl<S: EventSink> LifecycleCorrelator<S> {
    pub fn new(tables: &TableSettings, sink: S) -> Self {
        Self::with_metrics(tables, sink, create_metrics())
    }

    pub fn with_metrics(tables: &TableSettings, sink: S, metrics: SharedMetrics) -> Self {
        Self {
            pending: PendingOperationTracker::new(
                tables.pending_capacity,
                tables.shards,
                tables.pending_policy,
                metrics.clone(),
            ),
            registry: ObjectRegistry::new(RegistryLimits {
                object_capacity: tables.object_capacity,
                handle_capacity: tables.handle_capacity,
                shards: tables.shards,
                policy: tables.object_policy,
            }),
            sink,
            metrics,
        }
    }

    /// Handle one raw notification
    pub fn handle(&self, notification: Notification) -> Disposition {
        self.metrics.notifications.fetch_add(1, Ordering::Relaxed);

        let disposition = match notification {
            Notification::ObjectCreateBegin {
                actor,
                kind,
                attributes,
                timestamp,
            } => {
                self.pending.begin(actor, kind, attributes, timestamp);
                Disposition::Pending
            }
            Notification::ObjectCreateEnd {
                actor,
                kind,
                result_handle,
                timestamp,
            } => self.on_create_end(actor, kind, result_handle, timestamp),
            Notification::ObjectLoaded {
                actor,
                kind,
                object_id,
                attributes,
                timestamp,
            } => self.on_loaded(actor, kind, object_id, attributes, timestamp),
            Notification::ObjectReleased {
                key,
                remaining_refs,
                timestamp,
            } => self.on_released(key, remaining_refs, timestamp),
        };

        if let Disposition::Ignored(reason) = disposition {
            self.count_ignored(reason);
            trace!(
                notification = notification.name(),
                kind = %notification.kind(),
                ?reason,
                "notification ignored"
            );
        }

        disposition
    }

    fn on_create_end(
        &self,
        actor: ActorIdentity,
        kind: OperationKind,
        result_handle: i64,
        timestamp: u64,
    ) -> Disposition {
        if result_handle <= 0 {
            // The failed operation cannot be completed later; free its slot now
            self.pending.discard(actor, kind);
            return Disposition::Ignored(IgnoreReason::FailedCreate);
        }

        let Some(op) = self.pending.complete(actor, kind, result_handle, timestamp) else {
            debug!(%actor, %kind, result_handle, "completion without a recorded begin");
            return Disposition::Ignored(IgnoreReason::UnmatchedCompletion);
        };

        let Ok(object_id) = u32::try_from(result_handle) else {
            return Disposition::Ignored(IgnoreReason::InvalidId);
        };

        let object = TrackedObject {
            object_id,
            owner: op.actor,
            kind: op.kind,
            created_at: op.started_at,
            attributes: op.attributes,
        };
        self.settle(object, timestamp)
    }

    fn on_loaded(
        &self,
        actor: ActorIdentity,
        kind: OperationKind,
        object_id: u32,
        attributes: Attributes,
        timestamp: u64,
    ) -> Disposition {
        if object_id == 0 {
            return Disposition::Ignored(IgnoreReason::InvalidId);
        }

        let object = TrackedObject {
            object_id,
            owner: actor,
            kind,
            created_at: timestamp,
            attributes,
        };
        self.settle(object, timestamp)
    }

    fn on_released(&self, key: ObjectKey, remaining_refs: u32, timestamp: u64) -> Disposition {
        if remaining_refs > 0 {
            return Disposition::Ignored(IgnoreReason::StillReferenced);
        }

        match self.registry.unregister(&key) {
            Some(object) => self.emit(LifecycleKind::Deleted, object, timestamp),
            None => {
                debug!(%key, "release of an object that was never tracked");
                Disposition::Ignored(IgnoreReason::UnknownObject)
            }
        }
    }

    /// Register a now-identified object and report Added or Updated
    fn settle(&self, object: TrackedObject, timestamp: u64) -> Disposition {
        match self.registry.register(object.key(), object) {
            Classification::Added => self.emit(LifecycleKind::Added, object, timestamp),
            Classification::Updated => self.emit(LifecycleKind::Updated, object, timestamp),
            Classification::Rejected { table } => {
                Disposition::Ignored(IgnoreReason::CapacityExceeded { table })
            }
        }
    }

    fn emit(&self, kind: LifecycleKind, object: TrackedObject, timestamp: u64) -> Disposition {
        let counter = match kind {
            LifecycleKind::Added => &self.metrics.lifecycle.added,
            LifecycleKind::Updated => &self.metrics.lifecycle.updated,
            LifecycleKind::Deleted => &self.metrics.lifecycle.deleted,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        let event = LifecycleEvent::new(kind, object, timestamp);
        trace!(code = kind.code(), %event, "lifecycle transition");

        if self.sink.publish(event) {
            Disposition::Emitted(kind)
        } else {
            self.metrics
                .lifecycle
                .sink_dropped
                .fetch_add(1, Ordering::Relaxed);
            Disposition::SinkSaturated(kind)
        }
    }

    fn count_ignored(&self, reason: IgnoreReason) {
        let ignored = &self.metrics.ignored;
        let counter = match reason {
            IgnoreReason::FailedCreate => &ignored.failed_creates,
            IgnoreReason::UnmatchedCompletion => &ignored.unmatched_completions,
            IgnoreReason::UnknownObject => &ignored.unknown_releases,
            IgnoreReason::StillReferenced => &ignored.still_referenced,
            IgnoreReason::InvalidId => &ignored.invalid_ids,
            IgnoreReason::CapacityExceeded { .. } => &ignored.capacity_rejections,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending(&self) -> &PendingOperationTracker {
        &self.pending
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Counters plus the evictions recorded by the tables themselves
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pending_evicted: self.pending.evicted(),
            objects_evicted: self.registry.evicted(),
            ..self.metrics.snapshot()
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}
