//! NanoKV - in-memory key-value store with write-ahead logging and
//! leader/follower replication.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nanokv::config::Config;
use nanokv::dispatcher::Dispatcher;
use nanokv::error::Result;
use nanokv::network::{RequestHandler, TcpServer};
use nanokv::replication::ReplicationNode;
use nanokv::store::{run_recovery_consumer, InMemoryStore};
use nanokv::wal::{BatcherFlushConfig, SegmentReader, SegmentWriter, Wal};

/// NanoKV - in-memory key-value store with WAL and replication.
#[derive(Parser)]
#[command(name = "nanokv")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "nanokv.toml")]
    config: PathBuf,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node: query server, WAL, and (if configured) replication
    Start,

    /// Write a default configuration file
    Init {
        /// Output path for the configuration file
        #[arg(short, long, default_value = "nanokv.toml")]
        output: PathBuf,
    },

    /// Validate a configuration file without starting the node
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init { output } => init_config(&output),
        Commands::Validate => validate_config(&cli.config),
        Commands::Start => start(&cli).await,
    }
}

fn init_default_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_config(output: &PathBuf) -> Result<()> {
    let config = Config::default();
    let toml = toml::to_string_pretty(&config)
        .map_err(|e| nanokv::error::Error::Config(e.to_string()))?;
    std::fs::write(output, toml)?;
    println!("wrote default configuration to {}", output.display());
    Ok(())
}

fn validate_config(path: &PathBuf) -> Result<()> {
    let config = Config::from_file(path)?;
    config.validate()?;
    println!("{} is valid", path.display());
    Ok(())
}

async fn start(cli: &Cli) -> Result<()> {
    let config = Config::from_file(&cli.config)?;
    init_default_logging(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    tracing::info!(config = %cli.config.display(), "starting nanokv");

    let (recovery_tx, recovery_rx) = mpsc::channel(64);

    let store = InMemoryStore::new();
    tokio::spawn(run_recovery_consumer(store.clone(), recovery_rx));

    let reader = Arc::new(SegmentReader::new(config.wal.data_dir.clone()));

    let peers = config.replication.peers();
    let has_cluster = !peers.is_empty() || !config.replication.cluster.is_empty();

    let replication = if has_cluster {
        let id = if config.replication.id == 0 {
            nanokv::wal::now_nanos() % 1_000_000_000_000_000_000
        } else {
            config.replication.id
        };

        let follower_writer =
            SegmentWriter::new(config.wal.data_dir.clone(), config.wal.max_segment_size_bytes()?)?;

        let node = Arc::new(ReplicationNode::new(
            id,
            config.replication.host.clone(),
            peers,
            config.replication.sync_interval(),
            reader.clone(),
            follower_writer,
            recovery_tx.clone(),
        ));

        node.elect().await;
        Some(node)
    } else {
        None
    };

    let is_leader = match &replication {
        Some(node) => node.is_leader().await,
        None => true,
    };

    // Recover whatever is already on disk before serving any query.
    let recovered = reader.read_all()?;
    if !recovered.is_empty() {
        tracing::info!(count = recovered.len(), "replaying WAL segments at startup");
        store.apply_batch(&recovered).await;
    }

    let wal = if is_leader {
        Some(Arc::new(Wal::open(
            config.wal.data_dir.clone(),
            config.wal.max_segment_size_bytes()?,
            BatcherFlushConfig {
                size: config.wal.flushing_batch_size,
                timeout: config.wal.flushing_batch_timeout(),
            },
        )?))
    } else {
        None
    };

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), wal.clone(), replication.clone()));

    if let Some(node) = replication.clone() {
        let replication_server = Arc::new(TcpServer::new(
            config.replication.host.clone(),
            config.network.max_connections,
            node.clone(),
        ));
        tokio::spawn(async move {
            if let Err(e) = replication_server.serve().await {
                tracing::error!(error = %e, "replication server stopped");
            }
        });
        tokio::spawn(node.run());
    }

    let query_handler = Arc::new(QueryHandler { dispatcher });
    let query_server = Arc::new(TcpServer::new(
        config.network.address.clone(),
        config.network.max_connections,
        query_handler,
    ));

    let shutdown_server = query_server.clone();
    let wal_for_shutdown = wal.clone();
    let replication_for_shutdown = replication.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received shutdown signal");
        // Wait for in-flight query handlers to finish before tearing down
        // the WAL they may still be writing through.
        shutdown_server.stop().await;
        if let Some(node) = replication_for_shutdown {
            node.stop();
        }
        if let Some(wal) = wal_for_shutdown {
            wal.close().await;
        }
    });

    query_server.serve().await
}

/// Turns raw query bytes into a response line, bridging the TCP framing
/// layer and the query dispatcher.
struct QueryHandler {
    dispatcher: Arc<Dispatcher>,
}

#[async_trait]
impl RequestHandler for QueryHandler {
    async fn handle(&self, request: Vec<u8>) -> Vec<u8> {
        let line = String::from_utf8_lossy(&request).into_owned();
        match self.dispatcher.dispatch(&line).await {
            Ok(response) => response.into_bytes(),
            Err(e) => e.as_response().into_bytes(),
        }
    }
}
