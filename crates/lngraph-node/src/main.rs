//! lngraph node entry point.
//!
//! Replays recorded gossip against a recorded chain, waits for validation to
//! settle, then prints graph statistics and optionally a route as JSON.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use lngraph_core::NodeId;
use lngraph_gossip::{ChainRecord, InMemoryChain};
use lngraph_node::{GossipEnvelope, LnGraphConfig, Router};
use lngraph_routing::RouteRequest;

/// lngraph gossip replay node
#[derive(Parser, Debug)]
#[command(name = "lngraph-node", version, about = "Lightning gossip validation and routing node")]
struct Args {
    /// Path to the configuration file (TOML).
    #[arg(short, long, default_value = "lngraph.toml")]
    config: PathBuf,

    /// Generate a default config file and exit.
    #[arg(long)]
    init: bool,

    /// Override the log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// JSON array of funding transaction records served as the chain.
    #[arg(long)]
    chain: Option<PathBuf>,

    /// JSON array of `{origin, message}` gossip envelopes to replay.
    #[arg(long)]
    gossip: Option<PathBuf>,

    /// Route source node id (hex).
    #[arg(long, requires_all = ["route_to", "amount_msat"])]
    route_from: Option<NodeId>,

    /// Route target node id (hex).
    #[arg(long)]
    route_to: Option<NodeId>,

    /// Amount to deliver, in millisatoshi.
    #[arg(long)]
    amount_msat: Option<u64>,

    /// Seconds to wait for channel validation to settle.
    #[arg(long, default_value_t = 30)]
    settle_timeout: u64,
}

fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    if format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", path.display(), e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Handle --init flag
    if args.init {
        let config = LnGraphConfig::default();
        config.save(&args.config)?;
        println!("wrote default config to {}", args.config.display());
        return Ok(());
    }

    let mut config = LnGraphConfig::load(&args.config)?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging.level, &config.logging.format);

    tracing::info!("lngraph node v{}", env!("CARGO_PKG_VERSION"));

    let records: Vec<ChainRecord> = match &args.chain {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let gossip: Vec<GossipEnvelope> = match &args.gossip {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    tracing::info!(
        chain_records = records.len(),
        gossip_messages = gossip.len(),
        "replay inputs loaded"
    );

    let chain = Arc::new(InMemoryChain::from_records(
        config.validation.chain_hash,
        records,
    ));
    let router = Router::spawn(config, chain);

    for envelope in gossip {
        router.submit(envelope.origin, envelope.message).await?;
    }

    tokio::time::timeout(Duration::from_secs(args.settle_timeout), router.sync())
        .await
        .map_err(|_| anyhow::anyhow!("validation did not settle within {}s", args.settle_timeout))??;

    let stats = router.stats().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    if let (Some(source), Some(target), Some(amount_msat)) =
        (args.route_from, args.route_to, args.amount_msat)
    {
        match router
            .find_route(RouteRequest::new(source, target, amount_msat))
            .await
        {
            Ok(route) => println!("{}", serde_json::to_string_pretty(&route)?),
            Err(e) => {
                tracing::warn!(error = %e, "no route found");
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            }
        }
    }

    router.shutdown().await?;
    tracing::info!("lngraph node exited cleanly");
    Ok(())
}
