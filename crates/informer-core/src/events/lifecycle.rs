//! Consolidated lifecycle events handed to the sink

use super::object::TrackedObject;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transition reported by a lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleKind {
    Added,
    Updated,
    Deleted,
}

impl LifecycleKind {
    /// Wire value used by the kernel-side ring buffer record
    pub const fn code(&self) -> u32 {
        match self {
            LifecycleKind::Added => 1,
            LifecycleKind::Updated => 2,
            LifecycleKind::Deleted => 3,
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            LifecycleKind::Added => "added",
            LifecycleKind::Updated => "updated",
            LifecycleKind::Deleted => "deleted",
        }
    }
}

impl fmt::Display for LifecycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state transition of a tracked object
///
/// The embedded object is a snapshot; it shares nothing with the registry
/// entry once emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub kind: LifecycleKind,
    pub object: TrackedObject,
    /// Monotonic timestamp of the notification that produced this event (ns)
    pub sequence_hint: u64,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, object: TrackedObject, sequence_hint: u64) -> Self {
        Self {
            kind,
            object,
            sequence_hint,
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} id={} owner={} name={}",
            self.kind,
            self.object.kind,
            self.object.object_id,
            self.object.owner,
            self.object.attributes.name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ActorIdentity, Attributes, OperationKind};

    #[test]
    fn test_kind_codes_match_ring_buffer_values() {
        assert_eq!(LifecycleKind::Added.code(), 1);
        assert_eq!(LifecycleKind::Updated.code(), 2);
        assert_eq!(LifecycleKind::Deleted.code(), 3);
    }

    #[test]
    fn test_event_json_shape() {
        let event = LifecycleEvent::new(
            LifecycleKind::Updated,
            TrackedObject {
                object_id: 12,
                owner: ActorIdentity::new(40, 41),
                kind: OperationKind::BtfLoad,
                created_at: 3,
                attributes: Attributes::named("vmlinux"),
            },
            9,
        );
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["kind"], "updated");
        assert_eq!(json["sequence_hint"], 9);
        assert_eq!(
            event.to_string(),
            "updated btf_load id=12 owner=40/41 name=vmlinux"
        );
    }
}
