//! pump.fun launch sniper
//!
//! Wires the pipeline together:
//!
//! - **MintListener**: detects launches and vets their creators
//! - **BuyEngine**: acquires admitted assets and starts a creator-exit monitor
//! - **SellEngine**: races disposal transactions once the creator exits
//! - **RoutingManager**: decides when the tipped relay path is worth taking
//!
//! `/metrics`, `/health` and `/status` are served on the metrics port.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![deny(unused_variables)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sniper::buy_engine::BuyEngine;
use sniper::chain::{ChainProvider, SolanaChainProvider};
use sniper::config::Config;
use sniper::creator_monitor::CreatorExitMonitor;
use sniper::endpoints;
use sniper::registry::PendingRegistry;
use sniper::routing::RoutingManager;
use sniper::rpc_manager::{Broadcaster, TxDispatcher};
use sniper::sell_engine::SellEngine;
use sniper::sniffer::MintListener;
use sniper::store::{CreatorStore, SledCreatorStore};
use sniper::structured_logging::{
    StatusBoard, StatusJournal, StatusReporter, DEFAULT_JOURNAL_CAPACITY,
};
use sniper::tx_builder::{JitoBundler, TxBuilder};
use sniper::types::AssetRecord;
use sniper::vetting::CreatorVetter;
use sniper::wallet::WalletManager;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", env = "SNIPER_CONFIG")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Log as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Metrics port, overrides the config file
    #[arg(long)]
    metrics_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    dotenvy::dotenv().ok();
    init_logging(args.verbose, args.json_logs)?;

    info!("Starting sniper v{}", env!("CARGO_PKG_VERSION"));

    info!("Loading configuration from: {}", args.config);
    let mut config = load_config(&args.config)?;
    if let Some(port) = args.metrics_port {
        config.monitoring.metrics_port = port;
    }
    config.validate().context("Invalid configuration")?;

    let wallet = Arc::new(WalletManager::from_config(&config.wallet).context("Failed to load wallet")?);
    let payer = wallet.pubkey();
    info!("Wallet address: {}", payer);

    info!("Connecting to {} ({})", config.rpc.url, config.rpc.ws_url);
    let chain: Arc<dyn ChainProvider> = Arc::new(
        SolanaChainProvider::connect(&config.rpc)
            .await
            .context("Failed to connect to RPC")?,
    );

    let store: Arc<dyn CreatorStore> = Arc::new(
        SledCreatorStore::open(&config.store.path)
            .with_context(|| format!("Failed to open creator store at {}", config.store.path))?,
    );

    let builder = TxBuilder::new(chain.clone(), wallet.clone());
    builder
        .refresh_blockhash()
        .await
        .context("Failed to fetch initial blockhash")?;
    let blockhash_task =
        builder.spawn_blockhash_refresh(Duration::from_millis(config.trading.blockhash_refresh_ms));

    let bundler = Arc::new(
        JitoBundler::new(&config.jito.block_engine_url).context("Failed to create bundle client")?,
    );
    let dispatcher: Arc<dyn TxDispatcher> = Arc::new(Broadcaster::new(
        chain.clone(),
        builder,
        bundler,
        Duration::from_secs(config.trading.confirm_timeout_secs),
    ));

    let routing = Arc::new(
        RoutingManager::new(chain.clone(), config.jito.clone(), config.trading.enable_jito)
            .context("Failed to create routing manager")?,
    );
    let routing_tasks = routing
        .start()
        .await
        .context("Failed to initialize relay routing")?;
    if routing.is_enabled() {
        info!("Relay routing enabled ({} background tasks)", routing_tasks.len());
    } else {
        warn!("Relay routing disabled, every transaction uses priority fees");
    }

    let registry = Arc::new(PendingRegistry::new());
    let status = StatusReporter::new();

    if config.monitoring.enable_metrics {
        let journal = Arc::new(StatusJournal::new(DEFAULT_JOURNAL_CAPACITY));
        journal.clone().follow(&status);
        let board = Arc::new(StatusBoard::new(registry.clone(), journal));
        let metrics_port = config.monitoring.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(metrics_port, board).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let monitor = CreatorExitMonitor::new(
        chain.clone(),
        registry.clone(),
        status.clone(),
        config.monitor.clone(),
    );
    let buy_engine = Arc::new(BuyEngine::new(
        chain.clone(),
        registry.clone(),
        dispatcher.clone(),
        routing.clone(),
        monitor,
        status.clone(),
        payer,
        config.trading.clone(),
    ));
    let sell_engine = Arc::new(SellEngine::new(
        registry.clone(),
        dispatcher,
        routing.clone(),
        status.clone(),
        payer,
        config.trading.clone(),
        config.disposal.clone(),
    ));

    let vetter = Arc::new(CreatorVetter::new(
        chain.clone(),
        store.clone(),
        config.vetting.clone(),
    ));
    let (candidate_tx, candidate_rx) = mpsc::channel::<AssetRecord>(config.sniffer.candidate_buffer);
    let listener = Arc::new(MintListener::new(
        chain,
        vetter,
        store,
        candidate_tx,
        status,
        config.sniffer.clone(),
    ));

    let buy_task = tokio::spawn(buy_engine.run(candidate_rx));
    let sell_task = tokio::spawn(sell_engine.run());
    let listener_task = tokio::spawn(listener.run());

    info!("All components initialized, watching for launches");

    tokio::select! {
        result = listener_task => {
            match result {
                Ok(Ok(())) => warn!("Mint listener stopped"),
                Ok(Err(e)) => error!("Mint listener failed: {}", e),
                Err(e) => error!("Mint listener task panicked: {}", e),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Shutting down...");
    buy_task.abort();
    sell_task.abort();
    blockhash_task.abort();
    for task in routing_tasks {
        task.abort();
    }
    Ok(())
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_filter = if verbose {
        "sniper=debug,info"
    } else {
        "sniper=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file(path).with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Ok(Config::default())
    }
}
