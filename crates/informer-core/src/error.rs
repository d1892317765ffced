//! Error taxonomy of the correlation path
//!
//! None of these are fatal. Each one means a single transition was not
//! observed; callers count it and move on.

use thiserror::Error;

/// Failure of a bounded state table operation
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("table full: {capacity} entries")]
    CapacityExceeded { capacity: usize },
}

/// Degraded outcomes of correlating a notification
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorrelationError {
    #[error("{table} table is full")]
    CapacityExceeded { table: &'static str },

    #[error("completion or release without matching state")]
    UnmatchedCompletion,

    #[error("event sink saturated, event dropped")]
    SinkSaturated,
}
