//! Lifecycle correlation of BPF object notifications
//!
//! Pairs syscall entry and exit notifications into pending operations,
//! settles them into a bounded object registry and publishes one
//! lifecycle event per observed transition.

pub mod correlator;
pub mod pending;
pub mod registry;

pub use correlator::{Disposition, IgnoreReason, LifecycleCorrelator};
pub use pending::{PendingKey, PendingOperationTracker};
pub use registry::{Classification, ObjectRegistry, RegistryLimits};
