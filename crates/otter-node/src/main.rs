use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use otter_governance::{Governance, GovernanceConfig};
use otter_storage::{BackendType, PersistenceStore, StorageConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;

use config::NodeConfig;

#[derive(Parser)]
#[command(name = "otter-node")]
#[command(about = "Otter governance node", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the governance node
    Start {
        /// Node identity; overrides the config file
        #[arg(long)]
        node_id: Option<String>,

        /// Data directory; overrides the config file
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };

    match cli.command {
        Commands::Start { node_id, data_dir } => {
            if let Some(node_id) = node_id {
                config.node.node_id = node_id;
            }
            if let Some(data_dir) = data_dir {
                config.node.data_dir = data_dir;
            }
            config.validate()?;
            start(config).await
        }
    }
}

async fn start(config: NodeConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .init();

    info!(node_id = %config.node.node_id, data_dir = %config.node.data_dir.display(), "Starting otter node");

    let backend_type = match config.storage.backend.as_str() {
        "memory" => BackendType::Memory,
        _ => BackendType::RocksDb {
            path: config.storage_path().to_string_lossy().into_owned(),
        },
    };
    let store = PersistenceStore::new(StorageConfig { backend_type })
        .context("failed to open persistence store")?;

    let governance_config = GovernanceConfig {
        node_id: config.node.node_id.clone(),
        data_dir: config.node.data_dir.clone(),
        expiry_window: config.expiry_window(),
        liveness_tick: config.liveness_tick(),
    };

    // A malformed identity key is fatal: regenerating it would replace
    // this node's governance identity.
    let governance = Governance::new(governance_config, store)
        .await
        .context("failed to initialize governance")?;

    info!(
        node_id = %governance.node_id(),
        public_key = %governance.public_key(),
        "Node running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    governance.shutdown().await;

    Ok(())
}
