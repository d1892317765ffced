//! JSONL lifecycle event exporter

use informer_core::config::JsonlExportConfig;
use informer_core::events::LifecycleEvent;
use informer_core::sink::SinkReceiver;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type ExportResult<T> = Result<T, ExportError>;

/// Writes one JSON object per line, to a file or to standard output
pub struct JsonlExporter {
    destination: Option<PathBuf>,
    flush_each: bool,
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    events_written: AtomicU64,
}

impl JsonlExporter {
    /// Open the configured destination
    pub fn new(config: &JsonlExportConfig) -> ExportResult<Self> {
        let destination = config.path.as_ref().map(PathBuf::from);

        let output: Box<dyn Write + Send> = match &destination {
            Some(path) => {
                let file = if config.append {
                    OpenOptions::new().create(true).append(true).open(path)?
                } else {
                    File::create(path)?
                };
                info!("JSONL exporter writing to: {:?}", path);
                Box::new(file)
            }
            None => {
                info!("JSONL exporter writing to stdout");
                Box::new(io::stdout())
            }
        };

        Ok(Self {
            destination,
            flush_each: config.flush_each,
            writer: Mutex::new(BufWriter::new(output)),
            events_written: AtomicU64::new(0),
        })
    }

    pub fn export(&self, event: &LifecycleEvent) -> ExportResult<()> {
        let json = serde_json::to_string(event)?;

        let mut w = self.writer.lock();
        writeln!(w, "{}", json)?;
        if self.flush_each {
            w.flush()?;
        }

        self.events_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush(&self) -> ExportResult<()> {
        self.writer.lock().flush()?;
        Ok(())
    }

    /// Drain `rx` until every producer is gone, then flush.
    ///
    /// Returns the number of events written by this call.
    pub async fn run(&self, mut rx: SinkReceiver) -> ExportResult<u64> {
        let mut written = 0;
        while let Some(event) = rx.recv().await {
            self.export(&event)?;
            written += 1;
        }
        self.flush()?;

        let stats = rx.stats().snapshot();
        debug!(
            written,
            published = stats.published,
            dropped = stats.dropped,
            "sink closed, exporter done"
        );
        Ok(written)
    }

    pub fn events_written(&self) -> u64 {
        self.events_written.load(Ordering::Relaxed)
    }

    /// File path, or `None` for standard output
    pub fn destination(&self) -> Option<&PathBuf> {
        self.destination.as_ref()
    }
}
