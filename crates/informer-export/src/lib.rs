//! Exporters for lifecycle events

pub mod jsonl;

pub use jsonl::{ExportError, ExportResult, JsonlExporter};
