//! CLI for SeqMQ
//!
//! Subcommands:
//! - `broker`: run the broker server
//! - `producer`: run the configured producer workers
//! - `consumer`: run the configured consumer workers

use clap::{Parser, Subcommand};
use seqmq::broker::Broker;
use seqmq::client::CapabilityRegistry;
use seqmq::client::runtime::{run_consumers, run_producers};
use seqmq::config::{Settings, load_config_from};
use seqmq::persistence::{DurableStore, spawn_writer};
use seqmq::transport::start_websocket_server;
use seqmq::utils::error::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "seqmq")]
struct Cli {
    /// Configuration file to read instead of config/default
    #[arg(long, global = true)]
    config: Option<String>,

    /// Maximum log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the broker server
    Broker,
    /// Run the producer workers of every configured channel
    Producer,
    /// Run the consumer workers of every configured channel
    Consumer,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    seqmq::utils::logging::init(&cli.log_level);

    let settings = match load_config_from(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received. Exiting gracefully.");
        }
        shutdown.cancel();
    });

    let registry = CapabilityRegistry::with_builtins();
    let result = match cli.command {
        Command::Broker => run_broker(&settings, cancel).await,
        Command::Producer => run_producers(&settings, &registry, cancel).await,
        Command::Consumer => run_consumers(&settings, &registry, cancel).await,
    };

    if let Err(e) = result {
        error!("seqmq failed: {e}");
        std::process::exit(1);
    }
}

async fn run_broker(settings: &Settings, cancel: CancellationToken) -> Result<()> {
    let store = DurableStore::open(&settings.broker.data_dir)?;
    let (persistence, _writer) = spawn_writer(store.clone());
    let broker = Broker::recover(&store, persistence.clone()).into_shared();

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    start_websocket_server(addr, broker, cancel).await?;

    persistence.flush().await?;
    info!("Broker state saved");
    Ok(())
}
