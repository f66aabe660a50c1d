use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use preconf_types::BlockNumber;
use tokio::select;
use tokio::sync::mpsc::Sender;
use tokio::time::{Interval, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::metrics::AuctionMetrics;

pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Reports the current height of the chain the auction follows.
#[async_trait]
pub trait HeightSource: Send + Sync + 'static {
    async fn current_height(&self) -> Result<u64, SourceError>;
}

#[async_trait]
impl<H: HeightSource + ?Sized> HeightSource for Arc<H> {
    async fn current_height(&self) -> Result<u64, SourceError> {
        (**self).current_height().await
    }
}

/// Polls a [`HeightSource`] and reports every block that closes.
pub struct BlockMonitor<H> {
    source: H,
    period: Duration,
    timer: Option<Interval>,
    last: Option<BlockNumber>,
    metrics: Arc<AuctionMetrics>,
}

impl<H: HeightSource> BlockMonitor<H> {
    pub fn new(source: H, period: Duration, metrics: Arc<AuctionMetrics>) -> Self {
        Self {
            source,
            period,
            timer: None,
            last: None,
            metrics,
        }
    }

    /// The last height observed, if any.
    pub fn last_height(&self) -> Option<BlockNumber> {
        self.last
    }

    /// Wait until the chain height increases and return the previous height,
    /// i.e. the block that just closed.
    ///
    /// The first reading only sets the baseline. Skipped heights still yield
    /// a single block. A failed reading is returned as is, without retry.
    pub async fn next_block(&mut self) -> Result<BlockNumber, MonitorError> {
        let period = self.period;
        let timer = self.timer.get_or_insert_with(|| {
            let mut i = interval(period);
            i.set_missed_tick_behavior(MissedTickBehavior::Delay);
            i
        });
        loop {
            timer.tick().await;
            let height = self
                .source
                .current_height()
                .await
                .map(BlockNumber::from)
                .map_err(MonitorError::Source)?;
            self.metrics.height.set(i64::try_from(*height).unwrap_or(i64::MAX));
            match self.last {
                None => {
                    debug!(%height, "initial block height");
                    self.last = Some(height)
                }
                Some(prev) if height > prev => {
                    info!(block = %prev, %height, "new block");
                    self.last = Some(height);
                    return Ok(prev);
                }
                Some(prev) if height < prev => {
                    warn!(%prev, %height, "chain height went backwards")
                }
                Some(_) => trace!(%height, "no new block"),
            }
        }
    }

    /// Forward closed blocks to `tx` until cancelled or the receiver is gone.
    pub async fn go(
        mut self,
        tx: Sender<BlockNumber>,
        cancel: CancellationToken,
    ) -> Result<(), MonitorError> {
        loop {
            let block = select! {
                _ = cancel.cancelled() => break,
                b = self.next_block() => b?
            };
            select! {
                _ = cancel.cancelled() => break,
                r = tx.send(block) => if r.is_err() {
                    debug!("block receiver dropped");
                    break
                }
            }
        }
        info!("block monitor stopped");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum MonitorError {
    #[error("height source unavailable: {0}")]
    Source(#[source] SourceError),
}
