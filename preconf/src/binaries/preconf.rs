use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use preconf::auction::{AuctionError, AuctionMetrics, Auctioneer};
use preconf::config::NodeConfig;
use preconf::provider::RpcHeightSource;
use preconf_utils::types::logging;
use prometheus::{Encoder, TextEncoder};
use tokio::select;
use tokio::signal;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Parser, Debug)]
struct Cli {
    /// Path to the node configuration file.
    #[clap(long, short)]
    config: PathBuf,

    /// JSON-RPC endpoint of the chain, overriding the configured one.
    #[clap(long)]
    rpc_url: Option<Url>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let cli = Cli::parse();

    let mut config = NodeConfig::read(&cli.config)
        .await
        .with_context(|| format!("could not read node config {:?}", cli.config))?;

    if let Some(url) = cli.rpc_url {
        config.chain.rpc_url = url
    }

    config.validate().context("invalid auction timing")?;

    let registry = config.whitelist();
    if registry.is_empty() {
        warn!("no eligible bidders configured; every bid will be rejected")
    }

    let prom = prometheus::Registry::new();
    let metrics = Arc::new(AuctionMetrics::new(&prom)?);
    let source = RpcHeightSource::new(&config.chain.rpc_url);

    info!(
        rpc = %source.url(),
        bidders = registry.len(),
        round = ?config.auction.round_duration,
        "starting auctioneer"
    );

    let mut auctioneer = Auctioneer::new(config.auction_config(), source, registry, metrics);

    let result = loop {
        select! {
            res = auctioneer.next_winner() => match res {
                Ok(bid) => info!(
                    block = %bid.target_block(),
                    bidder = %bid.bidder(),
                    amount = %bid.amount(),
                    "winning bid"
                ),
                Err(AuctionError::Cancelled) => break Ok(()),
                Err(err) if !err.is_terminal() => warn!(%err, "auction round failed"),
                Err(err) => break Err(err),
            },
            _ = signal::ctrl_c() => {
                warn!("received ctrl-c; shutting down");
                auctioneer.shutdown()
            }
        }
    };

    let mut buf = Vec::new();
    TextEncoder::new().encode(&prom.gather(), &mut buf)?;
    debug!(metrics = %String::from_utf8_lossy(&buf), "final metrics");

    result.context("auctioneer terminated")
}
