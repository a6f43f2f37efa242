//! Doctel capture - document lifecycle telemetry.
//!
//! This binary watches a workspace directory as if it were an editor session,
//! turns file activity into document telemetry events, and delivers them to
//! the configured exporters. A remote command channel lets the collection
//! server ask for documents to be re-opened and reported.
//!
//! # Commands
//!
//! - `doctel-capture run`: Start the capture daemon
//! - `doctel-capture resolve`: Print the resolved exporter configuration
//! - `doctel-capture hash <FILE>`: Print the content hash of a file
//!
//! # Environment Variables
//!
//! See the `doctel_capture::config` module for available configuration options.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use doctel_capture::config::{default_settings_path, Config};
use doctel_capture::document::FsDocumentSource;
use doctel_capture::envelope::{content_hash, HostEnvironment, TelemetrySwitch};
use doctel_capture::exporter::ExporterSink;
use doctel_capture::identity::IdentityRegistry;
use doctel_capture::pipeline::Pipeline;
use doctel_capture::remote::{channel_url, RemoteChannel};
use doctel_capture::resolve::resolve_settings;
use doctel_capture::settings::TelemetrySettings;
use doctel_capture::watcher::WorkspaceWatcher;

/// Captures document lifecycle telemetry and delivers it to exporters.
#[derive(Parser, Debug)]
#[command(name = "doctel-capture")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    DOCTEL_SETTINGS           Settings file (default: ~/.doctel/settings.json)
    DOCTEL_SERVER_URL         Command channel URL (default: ws://localhost:8080)
    DOCTEL_MACHINE_ID         Machine identifier (default: derived from hostname)
    DOCTEL_WORKSPACE          Workspace directory (default: current directory)
    DOCTEL_TELEMETRY_ENABLED  Initial telemetry switch (default: true)
    DOCTEL_SIGNAL_BUFFER      Channel capacity (default: 1000)
    DOCTEL_REMOTE             Open the command channel (default: true)

EXAMPLES:
    # Show which exporters would receive which events
    doctel-capture resolve --settings ./settings.json

    # Start capturing in the current directory
    doctel-capture run

    # Toggle telemetry on a running instance (Unix)
    kill -USR1 <pid>
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the capture daemon.
    ///
    /// Watches the workspace, delivers events to exporters, and serves
    /// reopen commands from the collection server.
    Run,

    /// Print the resolved exporters and their active events as JSON.
    Resolve {
        /// Settings file (default: DOCTEL_SETTINGS or ~/.doctel/settings.json).
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// Print the content hash a reopen of FILE would carry.
    Hash {
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Resolve { settings } => run_resolve(settings),
        Command::Hash { file } => run_hash(&file),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_capture())
        }
    }
}

fn run_resolve(settings: Option<PathBuf>) -> Result<()> {
    let path = match settings {
        Some(path) => path,
        None => default_settings_path()?,
    };
    let settings = TelemetrySettings::from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    let resolved = resolve_settings(&settings);
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    Ok(())
}

fn run_hash(file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    println!("{}", content_hash(&text));
    Ok(())
}

/// Runs the capture daemon.
async fn run_capture() -> Result<()> {
    init_logging();

    info!("Starting doctel capture");

    let config = Config::from_env().context("Failed to load configuration")?;
    info!(
        settings = %config.settings_path.display(),
        workspace = %config.workspace_dir.display(),
        machine_id = %config.machine_id,
        "Configuration loaded"
    );

    let settings = TelemetrySettings::from_path(&config.settings_path).with_context(|| {
        format!(
            "Failed to load settings from {}",
            config.settings_path.display()
        )
    })?;

    let session_id = Uuid::new_v4().to_string();
    let switch = TelemetrySwitch::new(config.telemetry_enabled);
    let host = HostEnvironment::new(&switch, session_id.clone(), config.machine_id.clone());
    let sink = ExporterSink::new(settings.key.clone()).context("Failed to create exporter client")?;

    let pipeline = Pipeline::activate(
        &settings,
        host,
        Arc::new(IdentityRegistry::new()),
        Arc::new(sink),
        FsDocumentSource,
    );
    info!(session_id = %session_id, "Pipeline activated");

    let mut status = pipeline.status().subscribe();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let text = status.borrow_and_update().clone();
            debug!(status = %text, "Status");
        }
    });

    let (signal_tx, signal_rx) = mpsc::channel(config.buffer_size);
    let (command_tx, command_rx) = mpsc::channel(config.buffer_size);

    let _watcher = WorkspaceWatcher::new(config.workspace_dir.clone(), signal_tx).with_context(
        || {
            format!(
                "Failed to watch workspace {}",
                config.workspace_dir.display()
            )
        },
    )?;

    let remote = if config.remote_enabled {
        let url = channel_url(&config.server_url, &config.machine_id)
            .context("Invalid DOCTEL_SERVER_URL")?;
        Some(RemoteChannel::spawn(url, command_tx))
    } else {
        info!("Remote command channel disabled");
        drop(command_tx);
        None
    };

    info!("Capture running. Press Ctrl+C to stop.");

    tokio::select! {
        () = wait_for_shutdown() => {
            info!("Shutdown signal received");
        }
        () = pipeline.run(signal_rx, command_rx) => {}
        () = toggle_on_user_signal(&switch) => {}
    }

    info!("Shutting down...");
    if let Some(remote) = remote {
        remote.close().await;
    }

    info!("Capture stopped");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Flips the telemetry switch on every SIGUSR1.
#[cfg(unix)]
async fn toggle_on_user_signal(switch: &TelemetrySwitch) {
    let mut user = match signal::unix::signal(signal::unix::SignalKind::user_defined1()) {
        Ok(user) => user,
        Err(e) => {
            error!(error = %e, "Failed to install SIGUSR1 handler");
            return std::future::pending().await;
        }
    };

    while user.recv().await.is_some() {
        let enabled = !switch.is_enabled();
        info!(enabled, "Telemetry switch toggled");
        switch.set(enabled);
    }
    std::future::pending().await
}

#[cfg(not(unix))]
async fn toggle_on_user_signal(_switch: &TelemetrySwitch) {
    std::future::pending().await
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
