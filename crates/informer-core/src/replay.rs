//! Notification replay from JSONL files
//!
//! Feeds a recorded stream of raw probe notifications into the correlator,
//! for development and testing without live probes.

use crate::events::Notification;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for notification replay
#[derive(Debug, Clone, Default)]
pub struct ReplayConfig {
    /// Path to the JSONL file containing notifications
    pub input_file: PathBuf,

    /// Whether to loop playback continuously
    pub loop_playback: bool,
}

/// Notification replay engine
pub struct NotificationReplay {
    config: ReplayConfig,
    running: Arc<AtomicBool>,
}

impl NotificationReplay {
    pub fn new(config: ReplayConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Get a handle to stop the replay from another task
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Send every notification in the file to `tx`, in file order.
    ///
    /// Returns the number of notifications forwarded. A stop requested before
    /// the first poll is honored and nothing is sent.
    pub async fn run(&self, tx: mpsc::Sender<Notification>) -> anyhow::Result<u64> {
        let mut total = 0u64;
        loop {
            total += self.replay_file(&tx).await?;

            if !self.config.loop_playback || !self.running.load(Ordering::Relaxed) {
                break;
            }
            info!("Looping replay, restarting from beginning...");
        }

        self.running.store(false, Ordering::Relaxed);
        Ok(total)
    }

    async fn replay_file(&self, tx: &mpsc::Sender<Notification>) -> anyhow::Result<u64> {
        let file = tokio::fs::File::open(&self.config.input_file).await?;
        let mut lines = BufReader::new(file).lines();

        let mut count = 0u64;
        let mut line_number = 0u64;

        info!("Starting replay from {:?}", self.config.input_file);

        while let Some(line) = lines.next_line().await? {
            line_number += 1;

            if !self.running.load(Ordering::Relaxed) {
                info!("Replay stopped at line {}", line_number);
                break;
            }

            let Some(notification) = parse_line(&line, line_number) else {
                continue;
            };

            if tx.send(notification).await.is_err() {
                debug!("Replay receiver closed at line {}", line_number);
                self.running.store(false, Ordering::Relaxed);
                break;
            }
            count += 1;
        }

        info!(
            "Replay complete: {} notifications from {:?}",
            count, self.config.input_file
        );
        Ok(count)
    }
}

fn parse_line(line: &str, line_number: u64) -> Option<Notification> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(n) => Some(n),
        Err(err) => {
            warn!("Failed to parse notification at line {}: {}", line_number, err);
            debug!("Line content: {}", line);
            None
        }
    }
}

/// Read notifications from a JSONL file without replaying
pub async fn read_notifications_from_file(path: &Path) -> anyhow::Result<Vec<Notification>> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = BufReader::new(file).lines();

    let mut notifications = Vec::new();
    let mut line_number = 0u64;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if let Some(n) = parse_line(&line, line_number) {
            notifications.push(n);
        }
    }

    Ok(notifications)
}
