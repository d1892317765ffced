//! Raw notifications delivered by probe call-sites

use super::object::{ActorIdentity, Attributes, ObjectKey, OperationKind};
use serde::{Deserialize, Serialize};

/// One raw "event occurred" notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Syscall entry for an object-creating command
    #[serde(rename = "create_begin")]
    ObjectCreateBegin {
        actor: ActorIdentity,
        kind: OperationKind,
        #[serde(default)]
        attributes: Attributes,
        timestamp: u64,
    },

    /// Syscall exit; `result_handle <= 0` means the creation failed
    #[serde(rename = "create_end")]
    ObjectCreateEnd {
        actor: ActorIdentity,
        kind: OperationKind,
        result_handle: i64,
        timestamp: u64,
    },

    /// Internal kernel function entry where the object id is already known
    #[serde(rename = "loaded")]
    ObjectLoaded {
        actor: ActorIdentity,
        kind: OperationKind,
        object_id: u32,
        #[serde(default)]
        attributes: Attributes,
        timestamp: u64,
    },

    /// Object released or destroyed
    #[serde(rename = "released")]
    ObjectReleased {
        key: ObjectKey,
        /// References still held after this release; only zero ends the object
        #[serde(default)]
        remaining_refs: u32,
        timestamp: u64,
    },
}

impl Notification {
    pub fn timestamp(&self) -> u64 {
        match self {
            Notification::ObjectCreateBegin { timestamp, .. }
            | Notification::ObjectCreateEnd { timestamp, .. }
            | Notification::ObjectLoaded { timestamp, .. }
            | Notification::ObjectReleased { timestamp, .. } => *timestamp,
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Notification::ObjectCreateBegin { kind, .. }
            | Notification::ObjectCreateEnd { kind, .. }
            | Notification::ObjectLoaded { kind, .. } => *kind,
            Notification::ObjectReleased { key, .. } => key.kind(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Notification::ObjectCreateBegin { .. } => "create_begin",
            Notification::ObjectCreateEnd { .. } => "create_end",
            Notification::ObjectLoaded { .. } => "loaded",
            Notification::ObjectReleased { .. } => "released",
        }
    }
}
