//! Screen Session Recorder CLI
//!
//! Session-aware screen activity capture for research.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use screen_session_recorder::{
    capture::{PlatformCapturer, SelectionScope},
    collector::{check_permission, Collector, CollectorConfig},
    config::{Config, SourceConfig, StorageBackend},
    observer::{ScreenObserver, ScreenObserverSettings},
    storage::{JsonlStore, Observation, ObservationStore},
    transparency::create_shared_log_with_persistence,
    Aggregator, RunContext, StopHandle, StopReason, CONSENT_DECLARATION, VERSION,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "session-recorder")]
#[command(version = VERSION)]
#[command(about = "Session-aware screen activity recorder for research", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start recording until Ctrl+C or an automatic stop
    Start {
        /// Input sources to watch (keyboard, mouse, or all)
        #[arg(long, default_value = "all")]
        sources: String,

        /// Comma-separated window ids to capture (default: all screens)
        #[arg(long, default_value = "")]
        windows: String,

        /// Debounce gap between events of one session, in milliseconds
        #[arg(long)]
        debounce_ms: Option<u64>,

        /// Stop after this many idle minutes
        #[arg(long)]
        inactivity_minutes: Option<u64>,
    },

    /// Show current configuration and cumulative statistics
    Status,

    /// Display the consent declaration
    Privacy,

    /// Export recorded observations
    Export {
        /// Output file (default: data directory)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Export format (json or jsonl)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Show configuration
    Config,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start {
            sources,
            windows,
            debounce_ms,
            inactivity_minutes,
        } => cmd_start(&sources, &windows, debounce_ms, inactivity_minutes),
        Commands::Status => cmd_status(),
        Commands::Privacy => {
            println!("{CONSENT_DECLARATION}");
            Ok(())
        }
        Commands::Export { output, format } => cmd_export(output, &format),
        Commands::Config => cmd_config(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_start(
    sources: &str,
    windows: &str,
    debounce_ms: Option<u64>,
    inactivity_minutes: Option<u64>,
) -> Result<()> {
    println!("Screen Session Recorder v{VERSION}");
    println!();

    if !check_permission() {
        eprintln!("Error: Input Monitoring permission not granted.");
        eprintln!();
        eprintln!("To grant permission:");
        eprintln!("1. Open System Settings > Privacy & Security");
        eprintln!("2. Select 'Input Monitoring' and 'Screen Recording'");
        eprintln!("3. Add this application to both lists");
        eprintln!("4. Restart the application");
        std::process::exit(1);
    }

    let mut config = Config::load().context("loading configuration")?;
    config.sources = SourceConfig::from_csv(sources);
    if !config.sources.any_enabled() {
        bail!("at least one source must be enabled (keyboard or mouse)");
    }
    if let Some(ms) = debounce_ms {
        config.debounce_gap = Duration::from_millis(ms);
    }
    if let Some(minutes) = inactivity_minutes {
        config.inactivity_timeout_minutes = minutes;
    }
    config
        .ensure_directories()
        .context("creating data directories")?;

    let scope = SelectionScope::from_csv(windows).context("parsing --windows")?;
    let ctx = RunContext::new(config, scope).context("invalid configuration")?;

    println!("{CONSENT_DECLARATION}");
    println!("Recording {}", ctx.selection_scope);
    println!(
        "  Keyboard: {}",
        if ctx.config.sources.keyboard {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Mouse: {}",
        if ctx.config.sources.mouse {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Debounce gap: {}ms", ctx.config.debounce_gap.as_millis());
    println!(
        "  Inactivity timeout: {} minutes",
        ctx.config.inactivity_timeout_minutes
    );
    println!("  Log: {}", ctx.config.observation_log_path().display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
    runtime.block_on(record(ctx))
}

async fn record(ctx: RunContext) -> Result<()> {
    let transparency = create_shared_log_with_persistence(ctx.config.transparency_path());

    let store = open_store(&ctx.config).await?;
    let input = Collector::new(CollectorConfig {
        capture_keyboard: ctx.config.sources.keyboard,
        capture_mouse: ctx.config.sources.mouse,
    });
    let observer = ScreenObserver::new(
        &ctx,
        ScreenObserverSettings::from_config(&ctx.config),
        Box::new(input),
        Arc::new(PlatformCapturer::new()),
    )?;

    let uploads = start_uploads(&ctx.config, &transparency)?;

    let mut aggregator = Aggregator::new(ctx, store).with_transparency(transparency.clone());
    if let Some(dispatcher) = &uploads {
        aggregator = aggregator.with_uploads(dispatcher.queue());
    }
    aggregator.register(Box::new(observer))?;
    ctrlc_handler(aggregator.stop_handle())?;

    let summary = aggregator.run().await?;
    drop(aggregator);

    if let Some(dispatcher) = uploads {
        println!("Waiting for pending uploads...");
        let report = dispatcher.finish().await;
        println!(
            "Uploaded {} screenshot(s), {} failed",
            report.uploaded, report.failed
        );
    }

    if let Err(e) = transparency.save() {
        eprintln!("Warning: Could not save transparency log: {e}");
    }

    println!();
    println!("{summary}");
    println!("{}", transparency.summary());

    if summary.stop_reason.is_fatal() {
        bail!(
            "recording stopped: {}",
            summary
                .fatal_error
                .unwrap_or_else(|| summary.stop_reason.to_string())
        );
    }
    Ok(())
}

async fn open_store(config: &Config) -> Result<Box<dyn ObservationStore>> {
    let path = config.observation_log_path();
    match config.storage {
        StorageBackend::Jsonl => Ok(Box::new(
            JsonlStore::open(&path)
                .await
                .with_context(|| format!("opening {}", path.display()))?,
        )),
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => Ok(Box::new(
            screen_session_recorder::storage::SqliteStore::open(&path, config.write_timeout)
                .with_context(|| format!("opening {}", path.display()))?,
        )),
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => {
            bail!("sqlite storage requires building with the `sqlite` feature")
        }
    }
}

#[cfg(feature = "upload")]
fn start_uploads(
    config: &Config,
    transparency: &screen_session_recorder::SharedTransparencyLog,
) -> Result<Option<screen_session_recorder::upload::UploadDispatcher>> {
    use screen_session_recorder::upload::{HttpUploader, UploadDispatcher};

    let Some(upload) = &config.upload else {
        return Ok(None);
    };
    let uploader = HttpUploader::new(upload)?;
    println!("  Uploading screenshots to {}", upload.endpoint);
    Ok(Some(UploadDispatcher::spawn(
        Arc::new(uploader),
        Some(transparency.clone()),
    )))
}

#[cfg(not(feature = "upload"))]
fn start_uploads(
    config: &Config,
    _transparency: &screen_session_recorder::SharedTransparencyLog,
) -> Result<Option<screen_session_recorder::upload::UploadDispatcher>> {
    if config.upload.is_some() {
        eprintln!("Warning: upload configured but the `upload` feature is not enabled");
    }
    Ok(None)
}

fn cmd_status() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Screen Session Recorder Status");
    println!("==============================");
    println!();

    let has_permission = check_permission();
    println!(
        "Input Monitoring Permission: {}",
        if has_permission {
            "Granted ✓"
        } else {
            "Not Granted ✗"
        }
    );
    println!();

    println!("Configuration:");
    println!(
        "  Keyboard capture: {}",
        if config.sources.keyboard {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!(
        "  Mouse capture: {}",
        if config.sources.mouse {
            "enabled"
        } else {
            "disabled"
        }
    );
    println!("  Debounce gap: {}ms", config.debounce_gap.as_millis());
    println!(
        "  Inactivity timeout: {} minutes",
        config.inactivity_timeout_minutes
    );
    println!("  Log: {}", config.observation_log_path().display());
    println!();

    if config.transparency_path().exists() {
        let log = create_shared_log_with_persistence(config.transparency_path());
        println!("{}", log.summary());
    } else {
        println!("No previous recording data found.");
    }
    Ok(())
}

fn read_observations(config: &Config) -> Result<Vec<Observation>> {
    let path = config.observation_log_path();
    match config.storage {
        StorageBackend::Jsonl => {
            JsonlStore::read_all(&path).with_context(|| format!("reading {}", path.display()))
        }
        #[cfg(feature = "sqlite")]
        StorageBackend::Sqlite => screen_session_recorder::storage::SqliteStore::read_all(&path)
            .with_context(|| format!("reading {}", path.display())),
        #[cfg(not(feature = "sqlite"))]
        StorageBackend::Sqlite => {
            bail!("sqlite storage requires building with the `sqlite` feature")
        }
    }
}

fn cmd_export(output: Option<PathBuf>, format: &str) -> Result<()> {
    let jsonl = match format {
        "jsonl" => true,
        "json" => false,
        other => bail!("unknown export format '{other}' (expected json or jsonl)"),
    };

    let config = Config::load().context("loading configuration")?;
    let observations = read_observations(&config)?;
    if observations.is_empty() {
        println!("No observations found.");
        println!("Run 'session-recorder start' to begin recording.");
        return Ok(());
    }

    let output_path = output.unwrap_or_else(|| {
        config.data_path.join(format!(
            "export_{}.{}",
            Utc::now().format("%Y%m%d_%H%M%S"),
            if jsonl { "jsonl" } else { "json" }
        ))
    });

    let content = if jsonl {
        let mut lines = Vec::with_capacity(observations.len());
        for obs in &observations {
            lines.push(serde_json::to_string(obs)?);
        }
        lines.join("\n")
    } else {
        serde_json::to_string_pretty(&observations)?
    };
    std::fs::write(&output_path, content)
        .with_context(|| format!("writing {}", output_path.display()))?;

    println!(
        "Exported {} observations to {}",
        observations.len(),
        output_path.display()
    );
    Ok(())
}

fn cmd_config() -> Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", Config::config_path().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Route Ctrl+C into the run's stop path.
fn ctrlc_handler(stop: StopHandle) -> Result<()> {
    ctrlc::set_handler(move || {
        if stop.request(StopReason::UserCancelled) {
            eprintln!();
            eprintln!("Stopping, finishing open sessions...");
        }
    })
    .context("setting Ctrl+C handler")
}
