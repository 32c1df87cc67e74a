use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use hub_core::settings::{load_settings, load_settings_from_path, HubSettings};
use hub_core::SummaryBackend;
use hub_llm::{resolve_api_key, GeminiBackend};
use hub_monitor::{Monitor, MonitorConfig, Notifier};
use hub_server::{HandlerState, ServerConfig};
use hub_store::{BoardStore, Database};
use hub_telemetry::{init_telemetry, TelemetryConfig};

#[derive(Parser, Debug)]
#[command(name = "agent-hub", version, about = "Shared message board for cooperating agents")]
struct Cli {
    /// Settings file (defaults to ~/.config/agent-hub/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the board over HTTP with the topic monitor attached.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Default sender for calls that do not name one.
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        role: Option<String>,
        /// Run without the topic monitor.
        #[arg(long)]
        no_monitor: bool,
    },
    /// Run only the topic monitor against the board.
    Monitor {
        /// Sender name for summary posts.
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        role: Option<String>,
    },
    /// Check the database schema and backend credentials.
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(db) = &cli.db {
        settings.db_path = db.to_string_lossy().into_owned();
    }

    let telemetry = TelemetryConfig::from_level_name(&settings.logging.level, settings.logging.json);
    init_telemetry(&telemetry)?;

    match cli.command {
        Command::Serve {
            host,
            port,
            sender,
            role,
            no_monitor,
        } => {
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(sender) = sender {
                settings.agent.sender = sender;
            }
            if let Some(role) = role {
                settings.agent.role = role;
            }
            serve(settings, !no_monitor).await
        }
        Command::Monitor { sender, role } => {
            if let Some(sender) = sender {
                settings.monitor.identity = sender;
            }
            if let Some(role) = role {
                settings.monitor.role = role;
            }
            run_monitor(settings).await
        }
        Command::Doctor => doctor(&settings),
    }
}

fn open_database(settings: &HubSettings) -> anyhow::Result<Database> {
    let path = PathBuf::from(&settings.db_path);
    let db = Database::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    let report = db.check_integrity()?;
    if !report.is_ok() {
        bail!("database is missing tables: {}", report.missing().join(", "));
    }
    tracing::info!(path = %path.display(), schema_version = ?report.schema_version, "database opened");
    Ok(db)
}

/// Build the summary backend, or `None` to run on degraded digests only.
fn summary_backend(settings: &HubSettings) -> Option<Arc<dyn SummaryBackend>> {
    let Some((key, source)) = resolve_api_key(settings) else {
        tracing::warn!("no backend API key configured; summaries will be degraded digests");
        return None;
    };
    match GeminiBackend::new(key, settings.backend.model.clone()) {
        Ok(backend) => {
            tracing::info!(model = %settings.backend.model, source = %source, "summary backend ready");
            Some(Arc::new(backend))
        }
        Err(e) => {
            tracing::warn!(error = %e, "summary backend unavailable; summaries will be degraded digests");
            None
        }
    }
}

fn build_monitor(settings: &HubSettings, store: Arc<dyn BoardStore>) -> anyhow::Result<Arc<Monitor>> {
    let identity = &settings.monitor.identity;
    store
        .register_agent(identity, &settings.monitor.role)
        .context("failed to register monitor presence")?;
    Ok(Arc::new(Monitor::new(
        store,
        summary_backend(settings),
        MonitorConfig::from_settings(settings),
    )))
}

async fn serve(settings: HubSettings, with_monitor: bool) -> anyhow::Result<()> {
    let db = open_database(&settings)?;
    let store: Arc<dyn BoardStore> = Arc::new(db);
    store
        .register_agent(&settings.agent.sender, &settings.agent.role)
        .context("failed to register default agent")?;

    let shutdown = CancellationToken::new();
    let notifier = Arc::new(Notifier::new(Duration::from_secs(
        settings.server.default_wait_timeout_secs,
    )));
    let state = Arc::new(
        HandlerState::new(Arc::clone(&store), notifier, &settings.agent)
            .with_shutdown(shutdown.clone()),
    );

    let monitor_task = if with_monitor {
        let monitor = build_monitor(&settings, Arc::clone(&store))?;
        Some(monitor.spawn(shutdown.clone()))
    } else {
        None
    };

    let handle = hub_server::start(ServerConfig::from(&settings.server), state)
        .await
        .context("failed to start server")?;
    tracing::info!(port = handle.port, monitor = with_monitor, "agent hub ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    shutdown.cancel();

    handle.join().await;
    if let Some(task) = monitor_task {
        let _ = task.await;
    }
    Ok(())
}

async fn run_monitor(settings: HubSettings) -> anyhow::Result<()> {
    let store: Arc<dyn BoardStore> = Arc::new(open_database(&settings)?);
    let monitor = build_monitor(&settings, store)?;

    let shutdown = CancellationToken::new();
    let task = monitor.spawn(shutdown.clone());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("shutting down");
    shutdown.cancel();
    let _ = task.await;
    Ok(())
}

fn doctor(settings: &HubSettings) -> anyhow::Result<()> {
    let path = PathBuf::from(&settings.db_path);
    let db = Database::open(&path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;
    let report = db.check_integrity()?;

    println!("database: {}", path.display());
    match report.schema_version {
        Some(v) => println!("schema version: {v}"),
        None => println!("schema version: missing"),
    }
    for table in &report.tables {
        println!("  {:<18} {}", table.name, if table.present { "ok" } else { "MISSING" });
    }

    match resolve_api_key(settings) {
        Some((_, source)) => println!("backend: {} (key from {source})", settings.backend.model),
        None => println!("backend: none (summaries will be degraded digests)"),
    }

    if !report.is_ok() {
        bail!("database is missing tables: {}", report.missing().join(", "));
    }
    Ok(())
}
