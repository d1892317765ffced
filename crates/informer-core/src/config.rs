//! Configuration system for the informer
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Validation of table and sink bounds

use crate::store::{OverflowPolicy, DEFAULT_SHARDS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Kernel-side size of each informer hash map
pub const DEFAULT_TABLE_CAPACITY: usize = 10_000;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete informer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InformerConfig {
    /// General settings
    pub informer: InformerSettings,

    /// Correlation table bounds
    pub tables: TableSettings,

    /// Event sink settings
    pub sink: SinkSettings,

    /// Export settings
    pub export: ExportSettings,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InformerSettings {
    /// Log level: trace, debug, info, warn, error
    pub log_level: String,
}

impl Default for InformerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Correlation table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSettings {
    /// In-flight operations keyed by (actor, kind)
    pub pending_capacity: usize,

    /// Settled objects keyed by kernel id
    pub object_capacity: usize,

    /// Settled objects keyed by (owner, handle)
    pub handle_capacity: usize,

    /// Lock shards per table
    pub shards: usize,

    /// Overflow policy of the pending table
    pub pending_policy: OverflowPolicy,

    /// Overflow policy of both object tables
    pub object_policy: OverflowPolicy,
}

impl Default for TableSettings {
    fn default() -> Self {
        Self {
            pending_capacity: DEFAULT_TABLE_CAPACITY,
            object_capacity: DEFAULT_TABLE_CAPACITY,
            handle_capacity: DEFAULT_TABLE_CAPACITY,
            shards: DEFAULT_SHARDS,
            pending_policy: OverflowPolicy::EvictLeastRecent,
            object_policy: OverflowPolicy::Reject,
        }
    }
}

/// Event sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Undelivered events held before new ones are dropped
    pub capacity: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self { capacity: 65_536 }
    }
}

/// Export settings container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// JSONL file output
    pub jsonl: JsonlExportConfig,
}

/// JSONL export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlExportConfig {
    /// Output file path; standard output when unset
    pub path: Option<String>,

    /// Append to existing file
    pub append: bool,

    /// Flush after each event
    pub flush_each: bool,
}

impl Default for JsonlExportConfig {
    fn default() -> Self {
        Self {
            path: None,
            append: true,
            flush_each: true,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. BPF_INFORMER_CONFIG environment variable
    /// 3. ~/.config/bpf-informer/config.toml
    /// 4. /etc/bpf-informer/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<InformerConfig> {
        let mut config = if let Some(path) = self.find_config_file() {
            info!("Loading configuration from: {}", path.display());
            self.load_from_file(&path)?
        } else {
            debug!("No config file found, using defaults");
            InformerConfig::default()
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;

        Ok(config)
    }

    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("BPF_INFORMER_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("BPF_INFORMER_CONFIG path does not exist: {}", env_path);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("bpf-informer").join("config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/bpf-informer/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(&self, path: &Path) -> ConfigResult<InformerConfig> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: InformerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    fn apply_env_overrides(&self, config: &mut InformerConfig) {
        if let Ok(val) = std::env::var("BPF_INFORMER_LOG_LEVEL") {
            config.informer.log_level = val;
        }

        let parse_usize = |name: &str, current: usize| -> usize {
            match std::env::var(name) {
                Ok(val) => val.parse().unwrap_or_else(|_| {
                    warn!("Ignoring non-numeric {}={}", name, val);
                    current
                }),
                Err(_) => current,
            }
        };

        config.tables.pending_capacity =
            parse_usize("BPF_INFORMER_PENDING_CAPACITY", config.tables.pending_capacity);
        config.tables.object_capacity =
            parse_usize("BPF_INFORMER_OBJECT_CAPACITY", config.tables.object_capacity);
        config.tables.handle_capacity =
            parse_usize("BPF_INFORMER_HANDLE_CAPACITY", config.tables.handle_capacity);
        config.tables.shards = parse_usize("BPF_INFORMER_SHARDS", config.tables.shards);
        config.sink.capacity = parse_usize("BPF_INFORMER_SINK_CAPACITY", config.sink.capacity);

        if let Ok(val) = std::env::var("BPF_INFORMER_JSONL_PATH") {
            config.export.jsonl.path = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self, config: &InformerConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.informer.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.informer.log_level, valid_levels
            )));
        }

        for (name, value) in [
            ("tables.pending_capacity", config.tables.pending_capacity),
            ("tables.object_capacity", config.tables.object_capacity),
            ("tables.handle_capacity", config.tables.handle_capacity),
            ("tables.shards", config.tables.shards),
            ("sink.capacity", config.sink.capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} cannot be 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &InformerConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("bpf-informer").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

mod dirs {
    use std::path::PathBuf;

    /// User config directory (XDG on Linux)
    pub fn config_dir() -> Option<PathBuf> {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }
}
