//! Correlator counters
//!
//! Every degraded outcome on the correlation path is counted here instead of
//! being reported individually.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Counters updated by the correlator
#[derive(Debug)]
pub struct CorrelatorMetrics {
    start_time: Instant,
    pub notifications: AtomicU64,
    pub pending: PendingMetrics,
    pub lifecycle: LifecycleMetrics,
    pub ignored: IgnoredMetrics,
}

/// Pending operation table activity
#[derive(Debug, Default)]
pub struct PendingMetrics {
    pub begun: AtomicU64,
    /// A begin replaced an unfinished begin for the same (actor, kind)
    pub overwritten: AtomicU64,
    pub completed: AtomicU64,
    /// Begins lost because the table was full
    pub dropped: AtomicU64,
}

/// Emitted transitions
#[derive(Debug, Default)]
pub struct LifecycleMetrics {
    pub added: AtomicU64,
    pub updated: AtomicU64,
    pub deleted: AtomicU64,
    pub sink_dropped: AtomicU64,
}

/// Notifications that produced no transition
#[derive(Debug, Default)]
pub struct IgnoredMetrics {
    pub unmatched_completions: AtomicU64,
    pub failed_creates: AtomicU64,
    pub unknown_releases: AtomicU64,
    pub still_referenced: AtomicU64,
    pub invalid_ids: AtomicU64,
    pub capacity_rejections: AtomicU64,
}

impl Default for CorrelatorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelatorMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            notifications: AtomicU64::new(0),
            pending: PendingMetrics::default(),
            lifecycle: LifecycleMetrics::default(),
            ignored: IgnoredMetrics::default(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Copy every counter owned here.
    ///
    /// Eviction counts live in the tables themselves and are left at zero;
    /// the correlator's `metrics_snapshot` fills them in.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        MetricsSnapshot {
            uptime_seconds: self.uptime_seconds(),
            notifications: load(&self.notifications),
            pending_begun: load(&self.pending.begun),
            pending_overwritten: load(&self.pending.overwritten),
            pending_completed: load(&self.pending.completed),
            pending_dropped: load(&self.pending.dropped),
            pending_evicted: 0,
            objects_evicted: 0,
            added: load(&self.lifecycle.added),
            updated: load(&self.lifecycle.updated),
            deleted: load(&self.lifecycle.deleted),
            sink_dropped: load(&self.lifecycle.sink_dropped),
            unmatched_completions: load(&self.ignored.unmatched_completions),
            failed_creates: load(&self.ignored.failed_creates),
            unknown_releases: load(&self.ignored.unknown_releases),
            still_referenced: load(&self.ignored.still_referenced),
            invalid_ids: load(&self.ignored.invalid_ids),
            capacity_rejections: load(&self.ignored.capacity_rejections),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.snapshot().to_json()
    }

    /// Export metrics in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        self.snapshot().to_prometheus()
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_seconds: u64,
    pub notifications: u64,
    pub pending_begun: u64,
    pub pending_overwritten: u64,
    pub pending_completed: u64,
    pub pending_dropped: u64,
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
    pub sink_dropped: u64,
    pub unmatched_completions: u64,
    pub failed_creates: u64,
    pub unknown_releases: u64,
    pub still_referenced: u64,
    pub invalid_ids: u64,
    pub capacity_rejections: u64,
    /// Pending entries reclaimed by `EvictLeastRecent`
    pub pending_evicted: u64,
    /// Registry entries reclaimed by `EvictLeastRecent`
    pub objects_evicted: u64,
}

impl MetricsSnapshot {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Export metrics in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let s = self;
        let mut output = String::new();

        output.push_str("# HELP informer_uptime_seconds Time since the correlator started\n");
        output.push_str("# TYPE informer_uptime_seconds gauge\n");
        output.push_str(&format!("informer_uptime_seconds {}\n\n", s.uptime_seconds));

        output.push_str("# HELP informer_notifications_total Raw notifications handled\n");
        output.push_str("# TYPE informer_notifications_total counter\n");
        output.push_str(&format!("informer_notifications_total {}\n\n", s.notifications));

        output.push_str("# HELP informer_pending_total Pending operation table activity\n");
        output.push_str("# TYPE informer_pending_total counter\n");
        for (state, value) in [
            ("begun", s.pending_begun),
            ("overwritten", s.pending_overwritten),
            ("completed", s.pending_completed),
            ("dropped", s.pending_dropped),
            ("evicted", s.pending_evicted),
        ] {
            output.push_str(&format!(
                "informer_pending_total{{state=\"{}\"}} {}\n",
                state, value
            ));
        }
        output.push('\n');

        output.push_str("# HELP informer_lifecycle_events_total Lifecycle events emitted\n");
        output.push_str("# TYPE informer_lifecycle_events_total counter\n");
        for (kind, value) in [
            ("added", s.added),
            ("updated", s.updated),
            ("deleted", s.deleted),
        ] {
            output.push_str(&format!(
                "informer_lifecycle_events_total{{kind=\"{}\"}} {}\n",
                kind, value
            ));
        }
        output.push('\n');

        output.push_str("# HELP informer_objects_evicted_total Live objects evicted from a full registry\n");
        output.push_str("# TYPE informer_objects_evicted_total counter\n");
        output.push_str(&format!("informer_objects_evicted_total {}\n\n", s.objects_evicted));

        output.push_str("# HELP informer_sink_dropped_total Lifecycle events dropped by a full sink\n");
        output.push_str("# TYPE informer_sink_dropped_total counter\n");
        output.push_str(&format!("informer_sink_dropped_total {}\n\n", s.sink_dropped));

        output.push_str("# HELP informer_ignored_total Notifications that produced no transition\n");
        output.push_str("# TYPE informer_ignored_total counter\n");
        for (reason, value) in [
            ("unmatched_completion", s.unmatched_completions),
            ("failed_create", s.failed_creates),
            ("unknown_release", s.unknown_releases),
            ("still_referenced", s.still_referenced),
            ("invalid_id", s.invalid_ids),
            ("capacity", s.capacity_rejections),
        ] {
            output.push_str(&format!(
                "informer_ignored_total{{reason=\"{}\"}} {}\n",
                reason, value
            ));
        }

        output
    }
}

/// Shared metrics instance
pub type SharedMetrics = Arc<CorrelatorMetrics>;

pub fn create_metrics() -> SharedMetrics {
    Arc::new(CorrelatorMetrics::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reads_counters() {
        let metrics = CorrelatorMetrics::new();
        metrics.notifications.fetch_add(3, Ordering::Relaxed);
        metrics.lifecycle.added.fetch_add(2, Ordering::Relaxed);
        metrics.ignored.unmatched_completions.fetch_add(1, Ordering::Relaxed);

        let s = metrics.snapshot();
        assert_eq!(s.notifications, 3);
        assert_eq!(s.added, 2);
        assert_eq!(s.unmatched_completions, 1);
        assert_eq!(s.deleted, 0);
    }

    #[test]
    fn test_prometheus_output() {
        let metrics = CorrelatorMetrics::new();
        metrics.lifecycle.deleted.fetch_add(4, Ordering::Relaxed);
        let text = metrics.to_prometheus();
        assert!(text.contains("informer_lifecycle_events_total{kind=\"deleted\"} 4"));
        assert!(text.contains("# TYPE informer_notifications_total counter"));
    }

    #[test]
    fn test_snapshot_renders_evictions() {
        let s = MetricsSnapshot {
            pending_evicted: 7,
            objects_evicted: 2,
            ..MetricsSnapshot::default()
        };
        let text = s.to_prometheus();
        assert!(text.contains("informer_pending_total{state=\"evicted\"} 7"));
        assert!(text.contains("informer_objects_evicted_total 2"));
        assert_eq!(s.to_json()["objects_evicted"], 2);
    }

    #[test]
    fn test_json_output() {
        let metrics = CorrelatorMetrics::new();
        metrics.pending.begun.fetch_add(5, Ordering::Relaxed);
        let json = metrics.to_json();
        assert_eq!(json["pending_begun"], 5);
    }
}
