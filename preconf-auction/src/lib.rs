mod config;
mod coordinator;
mod metrics;
mod monitor;
mod registry;

use std::future::Future;
use std::sync::Arc;

use preconf_types::{Bid, BlockNumber};
use tokio::select;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::{JoinError, JoinHandle, spawn};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use config::{AuctionConfig, AuctionConfigBuilder, InvalidConfig};
pub use coordinator::{Coordinator, Outcome, RoundHandle, SubmitError};
pub use metrics::AuctionMetrics;
pub use monitor::{BlockMonitor, HeightSource, MonitorError, SourceError};
pub use registry::{Registry, Whitelist};

type Result<T> = std::result::Result<T, AuctionError>;

/// Runs one auction per closed block and reports the winners.
///
/// A background task polls the chain height. Whenever a block closes, an
/// auction round for that block is opened on the shared [`Coordinator`],
/// and its winner, if any, is made available through
/// [`Auctioneer::next_winner`].
pub struct Auctioneer {
    coordinator: Coordinator,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
    output: Receiver<Result<Bid>>,
}

impl Drop for Auctioneer {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = &self.task {
            task.abort()
        }
    }
}

struct Task {
    config: AuctionConfig,
    coordinator: Coordinator,
    blocks: Receiver<BlockNumber>,
    output: Sender<Result<Bid>>,
    metrics: Arc<AuctionMetrics>,
    cancel: CancellationToken,
}

impl Auctioneer {
    /// Start monitoring `source` and auctioning each closed block among the
    /// bidders in `registry`.
    ///
    /// Must be called within a tokio runtime.
    pub fn new<H, R>(cfg: AuctionConfig, source: H, registry: R, metrics: Arc<AuctionMetrics>) -> Self
    where
        H: HeightSource,
        R: Registry,
    {
        let cancel = CancellationToken::new();
        let coordinator = Coordinator::new(registry, metrics.clone(), cancel.child_token());
        let monitor = BlockMonitor::new(source, cfg.poll_interval, metrics.clone());

        let (btx, brx) = mpsc::channel(cfg.queue_len);
        let (otx, orx) = mpsc::channel(cfg.queue_len);

        let monitor = spawn(monitor.go(btx, cancel.clone()));

        let task = Task {
            config: cfg,
            coordinator: coordinator.clone(),
            blocks: brx,
            output: otx,
            metrics,
            cancel: cancel.clone(),
        };

        Self {
            coordinator,
            cancel,
            task: Some(spawn(task.go(monitor))),
            output: orx,
        }
    }

    /// The coordinator accepting bids for the current round.
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn submit_bid(&self, bid: Bid) -> std::result::Result<(), SubmitError> {
        self.coordinator.submit_bid(bid)
    }

    pub fn submit_encoded(&self, bid: &str) -> std::result::Result<(), SubmitError> {
        self.coordinator.submit_encoded(bid)
    }

    pub fn current_bid(&self) -> Option<Bid> {
        self.coordinator.current_bid()
    }

    pub fn current_encoded(&self) -> Option<String> {
        self.coordinator.current_encoded()
    }

    /// Stop monitoring and close any open round.
    pub fn shutdown(&self) {
        self.cancel.cancel()
    }

    /// Get the next winning bid.
    ///
    /// Results that find the queue full are dropped, so an idle reader
    /// never holds up the auction of later blocks.
    ///
    /// A round that missed its watchdog deadline is reported as
    /// `AuctionError::Watchdog` and auctioning continues with the next block.
    /// All other errors are terminal; after a regular shutdown
    /// `AuctionError::Cancelled` is returned.
    pub async fn next_winner(&mut self) -> Result<Bid> {
        if let Some(res) = self.output.recv().await {
            return res;
        }
        let Some(task) = self.task.take() else {
            return Err(AuctionError::TaskTerminated);
        };
        match task.await {
            Ok(Ok(())) => Err(AuctionError::Cancelled),
            Ok(Err(err)) => {
                error!(%err, "auction task error");
                Err(err)
            }
            Err(err) => {
                error!(%err, "auction task panic");
                Err(AuctionError::TaskTerminated)
            }
        }
    }
}

impl Task {
    async fn go(mut self, mut monitor: JoinHandle<std::result::Result<(), MonitorError>>) -> Result<()> {
        loop {
            select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("auctioneer stopped");
                    return Ok(())
                }
                res = &mut monitor => return monitor_result(res),
                block = self.blocks.recv() => match block {
                    Some(b) => self.auction(b).await?,
                    None => return monitor_result(monitor.await)
                }
            }
        }
    }

    /// Run the round for `block` under the watchdog.
    async fn auction(&mut self, block: BlockNumber) -> Result<()> {
        info!(%block, "processing new block");
        let round = self.coordinator.start(block, self.config.round_duration)?;
        self.supervise(block, round.outcome()).await
    }

    /// Await the outcome of the open round for `block`, aborting it once the
    /// watchdog deadline passes.
    async fn supervise<F>(&mut self, block: BlockNumber, outcome: F) -> Result<()>
    where
        F: Future<Output = Result<Outcome>>,
    {
        let limit = self.config.watchdog();

        let outcome = select! {
            _ = self.cancel.cancelled() => {
                self.coordinator.abort();
                return Ok(())
            }
            o = timeout(limit, outcome) => o
        };

        match outcome {
            Ok(Ok(Outcome::Won(bid))) => {
                info!(
                    %block,
                    bidder = %bid.bidder(),
                    amount = %bid.amount(),
                    "auction won"
                );
                self.metrics.rounds_won.inc();
                self.emit(Ok(bid))
            }
            Ok(Ok(Outcome::NoBids)) => {
                info!(%block, "auction ended with no winner");
                Ok(())
            }
            Ok(Err(AuctionError::Cancelled)) => {
                warn!(%block, "auction round cancelled");
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => {
                self.coordinator.abort();
                self.metrics.watchdog_timeouts.inc();
                error!(%block, ?limit, "auction round did not end before watchdog deadline");
                self.emit(Err(AuctionError::Watchdog { block }))
            }
        }
    }

    fn emit(&self, item: Result<Bid>) -> Result<()> {
        match self.output.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(item)) => {
                self.metrics.results_dropped.inc();
                match item {
                    Ok(bid) => warn!(
                        block = %bid.target_block(),
                        bidder = %bid.bidder(),
                        "output queue full; dropping winning bid"
                    ),
                    Err(err) => warn!(%err, "output queue full; dropping error")
                }
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(AuctionError::ChannelClosed),
        }
    }
}

fn monitor_result(
    res: std::result::Result<std::result::Result<(), MonitorError>, JoinError>,
) -> Result<()> {
    match res {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(%err, "block monitor failed");
            Err(err.into())
        }
        Err(err) => {
            error!(%err, "block monitor panic");
            Err(AuctionError::TaskTerminated)
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuctionError {
    #[error("block monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("auction for block {block} did not end before the watchdog deadline")]
    Watchdog { block: BlockNumber },

    #[error("auction for block {open} still open, cannot start block {requested}")]
    RoundInProgress {
        open: BlockNumber,
        requested: BlockNumber,
    },

    #[error("auction cancelled")]
    Cancelled,

    #[error("channel closed")]
    ChannelClosed,

    #[error("task terminated")]
    TaskTerminated,
}

impl AuctionError {
    /// Does this error end the auctioneer?
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Watchdog { .. })
    }
}
