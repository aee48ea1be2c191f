use clap::{Parser, Subcommand};
use color_eyre::eyre::WrapErr;
use pm_core::config::loader::load_config;
use pm_core::nodes::provider::StaticNodeProvider;
use pm_core::state::store::PipelineStateStore;
use pm_core::PipelineManager;
use pm_protocol::events::SafeModeStatus;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pipeline-manager", version, about = "Replication pipeline manager daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory containing `.pipeline-manager/`
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the manager and its background pipeline creator until interrupted
    Run {
        /// Leave safe mode immediately instead of waiting for a release
        #[arg(long)]
        exit_safe_mode: bool,
    },
    /// Validate configuration and print the node inventory
    Check,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Run { exit_safe_mode } => run(&cli.root, exit_safe_mode).await,
        Commands::Check => check(&cli.root).await,
    }
}

fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn run(root: &std::path::Path, exit_safe_mode: bool) -> color_eyre::Result<()> {
    let config = load_config(root)
        .await
        .wrap_err_with(|| format!("failed to load configuration from {}", root.display()))?;
    tracing::info!(
        nodes = config.nodes.len(),
        descriptors = config.manager.descriptors.len(),
        "loaded configuration"
    );

    let provider = Arc::new(StaticNodeProvider::new(config.nodes));
    let store = Arc::new(PipelineStateStore::new());
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let manager = Arc::new(PipelineManager::new(config.manager, store, provider, events_tx));

    let events = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            tracing::debug!(pipeline = %event.pipeline_id(), ?event, "pipeline event");
        }
    });

    if exit_safe_mode {
        manager.on_safe_mode_status_change(SafeModeStatus::exited()).await;
    }
    manager.start_pipeline_creator().await;

    tokio::signal::ctrl_c().await.wrap_err("failed to listen for shutdown signal")?;
    tracing::info!("shutdown signal received");

    manager.close().await;
    let summary = manager.pipeline_info().await;
    tracing::info!(?summary, "pipeline manager stopped");

    drop(manager);
    events.await.wrap_err("event logger task failed")?;
    Ok(())
}

async fn check(root: &std::path::Path) -> color_eyre::Result<()> {
    let config = load_config(root)
        .await
        .wrap_err_with(|| format!("failed to load configuration from {}", root.display()))?;

    println!("descriptors:");
    for descriptor in config.manager.maintained_descriptors() {
        println!("  {descriptor} (pool of {})", config.manager.min_pipelines_per_descriptor);
    }
    println!("nodes:");
    for node in &config.nodes {
        println!("  {node}");
    }
    Ok(())
}
