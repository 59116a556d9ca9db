use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use homenexus::cascade::{CascadeOrchestrator, OrchestratorSettings};
use homenexus::connectors::{DefaultPowerController, SignalProviders, TcpProbe};
use homenexus::db::operation_log_service::OperationLogger;
use homenexus::db::MemoryStore;
use homenexus::monitoring::{InactivityRuleService, MonitorRuntime, MonitorSettings};
use homenexus::server::{apply_topology, read_topology, EventBroadcaster, ServerConfig};
use homenexus::topology::GraphStore;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // JSON to a daily-rotated file, human-readable to stdout.
    let file_appender = rolling::daily(log_dir, "homenexus.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let config = ServerConfig::load(args.config.as_deref())?;
    init_logging(&config.log_dir);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting homenexus server.");

    // --- Storage and topology ---
    let store = Arc::new(MemoryStore::new());
    let logger = OperationLogger::new(store.clone());
    let graph = Arc::new(GraphStore::load(store.clone(), logger.clone()).await?);
    let events = EventBroadcaster::new(config.event_channel_capacity);

    // --- Cascades ---
    let probe = Arc::new(TcpProbe);
    let power = Arc::new(DefaultPowerController::new(
        store.clone(),
        probe.clone(),
        config.step_timeout(),
        config.ready_poll_interval(),
        config.probe_timeout(),
    ));
    let orchestrator = CascadeOrchestrator::new(
        store.clone(),
        graph.clone(),
        power,
        probe.clone(),
        events.clone(),
        logger.clone(),
        OrchestratorSettings {
            step_timeout: config.step_timeout(),
            probe_timeout: config.probe_timeout(),
        },
    );

    // --- Inactivity monitor ---
    let monitor = MonitorRuntime::new(
        store.clone(),
        SignalProviders {
            probe,
            remote: None,
            traffic: None,
        },
        Arc::new(orchestrator.clone()),
        logger.clone(),
        MonitorSettings {
            interval: config.monitor_interval(),
            max_concurrency: config.monitor_max_concurrency,
            probe_timeout: config.probe_timeout(),
            signal_timeout: config.signal_timeout(),
        },
    );
    let rules = InactivityRuleService::new(store.clone(), monitor.clone());

    if let Some(path) = config.topology_path.as_deref() {
        let topology = read_topology(path).inspect_err(|e| {
            error!(path, code = e.code(), error = %e, "Failed to read topology file.");
        })?;
        apply_topology(topology, store.as_ref(), &graph, &rules).await?;
    }

    let report = orchestrator.reconcile_interrupted().await?;
    if report.cascades_failed > 0 {
        warn!(
            cascades_failed = report.cascades_failed,
            nodes_errored = report.nodes_errored,
            "Reconciled cascades interrupted by the previous shutdown."
        );
    }

    // --- Event log task ---
    let mut event_rx = events.subscribe();
    let event_task = tokio::spawn(async move {
        loop {
            match event_rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(event = %json, "Server event."),
                    Err(e) => warn!(error = %e, "Failed to serialize server event."),
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log task lagged behind the broadcaster.");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if config.monitor_enabled {
        monitor.start().await;
    } else {
        info!("Inactivity monitor disabled by configuration.");
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");
    monitor.stop().await;
    event_task.abort();
    info!("Server stopped.");
    Ok(())
}
