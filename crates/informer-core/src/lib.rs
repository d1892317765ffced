//! Informer Core - data model, bounded state tables and event sink
//!
//! This crate provides the foundational pieces of the BPF object informer:
//!
//! - **Events**: raw probe notifications, tracked objects and lifecycle events
//! - **Store**: fixed-capacity sharded tables backing every correlation map
//! - **Sink**: non-blocking, drop-on-full hand-off of lifecycle events
//! - **Config / Metrics / Replay**: the ambient plumbing around them

pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod replay;
pub mod sink;
pub mod store;

// Re-export commonly used types
pub use error::{CorrelationError, StoreError};
pub use events::{
    ActorIdentity, Attributes, IdentityScheme, LifecycleEvent, LifecycleKind, Notification,
    ObjectKey, ObjectName, OperationKind, PendingOperation, TrackedObject,
};
pub use metrics::{CorrelatorMetrics, MetricsSnapshot, SharedMetrics};
pub use sink::{ChannelSink, EventSink, SinkReceiver, SinkStats};
pub use store::{KeyedStateStore, OverflowPolicy};

/// Informer version
pub const INFORMER_VERSION: &str = env!("CARGO_PKG_VERSION");
