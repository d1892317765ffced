//! BPF Informer - object lifecycle correlation
//!
//! Consumes raw BPF-object notifications and emits one lifecycle event per
//! observed transition.

use clap::{Parser, Subcommand, ValueEnum};
use informer_core::config::{ConfigLoader, InformerConfig};
use informer_core::replay::{NotificationReplay, ReplayConfig};
use informer_core::sink;
use informer_core::MetricsSnapshot;
use informer_correlate::LifecycleCorrelator;
use informer_export::JsonlExporter;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "informer")]
#[command(version)]
#[command(about = "BPF object lifecycle informer", long_about = None)]
struct Cli {
    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "BPF_INFORMER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Correlate a recorded notification stream (JSONL)
    Replay {
        /// Input file of notifications
        #[arg(short, long)]
        input: PathBuf,

        /// Output file for lifecycle events (stdout if unset)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Restart from the beginning when the input is exhausted
        #[arg(long = "loop")]
        loop_playback: bool,

        /// Print correlator metrics to stderr when done
        #[arg(long, value_enum)]
        metrics: Option<MetricsFormat>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum MetricsFormat {
    Json,
    Prometheus,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.clone());

    // CLI verbose flag takes precedence over the configured level
    let log_level = if cli.verbose > 0 {
        match cli.verbose {
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        }
    } else {
        match config.informer.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        }
    };

    // Events may go to stdout; logs never do
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Replay {
            input,
            output,
            loop_playback,
            metrics,
        } => {
            let mut config = config;
            if let Some(output) = output {
                config.export.jsonl.path = Some(output.to_string_lossy().into_owned());
            }
            replay_command(
                config,
                ReplayConfig {
                    input_file: input,
                    loop_playback,
                },
                metrics,
            )
            .await
        }
        Commands::Config => config_command(&config),
    }
}

/// Load configuration from file/env, with fallback to defaults
fn load_config(cli_path: Option<PathBuf>) -> InformerConfig {
    let loader = ConfigLoader::new().with_cli_path(cli_path);
    match loader.load() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load configuration: {}, using defaults", e);
            InformerConfig::default()
        }
    }
}

async fn replay_command(
    config: InformerConfig,
    replay_config: ReplayConfig,
    metrics_format: Option<MetricsFormat>,
) -> anyhow::Result<()> {
    info!("Starting BPF informer replay...");

    let (event_sink, event_rx) = sink::channel(config.sink.capacity);
    let sink_stats = event_sink.stats();
    let correlator = LifecycleCorrelator::new(&config.tables, event_sink);

    let exporter = JsonlExporter::new(&config.export.jsonl)?;
    let export_task = tokio::spawn(async move {
        let written = exporter.run(event_rx).await?;
        Ok::<_, informer_export::ExportError>(written)
    });

    let replay = NotificationReplay::new(replay_config);
    let stop = replay.stop_handle();
    let (tx, mut rx) = mpsc::channel(1024);
    let replay_task = tokio::spawn(async move { replay.run(tx).await });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping replay");
            stop.store(false, Ordering::Relaxed);
        }
    });

    while let Some(notification) = rx.recv().await {
        correlator.handle(notification);
    }

    let replayed = replay_task.await??;

    // Dropping the correlator drops the last sink producer and ends the export
    let live = correlator.registry().len();
    let pending = correlator.pending().len();
    let metrics = correlator.metrics_snapshot();
    drop(correlator);
    let written = export_task.await??;

    let stats = sink_stats.snapshot();
    info!(
        replayed,
        written,
        live,
        pending,
        sink_dropped = stats.dropped,
        pending_evicted = metrics.pending_evicted,
        objects_evicted = metrics.objects_evicted,
        "Replay finished"
    );

    if let Some(format) = metrics_format {
        print_metrics(&metrics, format);
    }

    Ok(())
}

fn print_metrics(metrics: &MetricsSnapshot, format: MetricsFormat) {
    match format {
        MetricsFormat::Json => match serde_json::to_string_pretty(&metrics.to_json()) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => warn!("Failed to render metrics: {}", e),
        },
        MetricsFormat::Prometheus => eprint!("{}", metrics.to_prometheus()),
    }
}

fn config_command(config: &InformerConfig) -> anyhow::Result<()> {
    println!("# Effective configuration");
    if let Some(path) = ConfigLoader::default_config_path() {
        println!("# User config path: {}", path.display());
    }
    println!();
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
