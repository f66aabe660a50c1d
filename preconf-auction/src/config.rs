use std::time::Duration;

use bon::Builder;

#[derive(Debug, Clone, Builder)]
pub struct AuctionConfig {
    /// How often the chain height is polled.
    #[builder(default = Duration::from_millis(200))]
    pub(crate) poll_interval: Duration,

    /// How long bids are accepted for each block.
    #[builder(default = Duration::from_secs(5))]
    pub(crate) round_duration: Duration,

    /// Extra time a round gets to close before the watchdog fires.
    #[builder(default = Duration::from_secs(1))]
    pub(crate) watchdog_grace: Duration,

    /// The expected block interval of the chain.
    #[builder(default = Duration::from_secs(12))]
    pub(crate) block_time: Duration,

    /// Capacity of the new-block and winner queues.
    #[builder(default = 16)]
    pub(crate) queue_len: usize,
}

impl Default for AuctionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuctionConfig {
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn round_duration(&self) -> Duration {
        self.round_duration
    }

    pub fn watchdog_grace(&self) -> Duration {
        self.watchdog_grace
    }

    pub fn block_time(&self) -> Duration {
        self.block_time
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len
    }

    /// The outer deadline for a round to produce its result.
    pub fn watchdog(&self) -> Duration {
        self.round_duration + self.watchdog_grace
    }

    /// Check that detection latency, round and watchdog fit into one block.
    pub fn validate(&self) -> Result<(), InvalidConfig> {
        if self.round_duration.is_zero() {
            return Err(InvalidConfig::ZeroRound);
        }
        if self.queue_len == 0 {
            return Err(InvalidConfig::ZeroQueue);
        }
        if self.poll_interval.is_zero() || self.poll_interval >= self.block_time {
            return Err(InvalidConfig::PollInterval {
                poll: self.poll_interval,
                block: self.block_time,
            });
        }
        let budget = self.poll_interval + self.watchdog();
        if budget > self.block_time {
            return Err(InvalidConfig::Budget {
                budget,
                block: self.block_time,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidConfig {
    #[error("round duration must be non-zero")]
    ZeroRound,

    #[error("queue length must be non-zero")]
    ZeroQueue,

    #[error("poll interval {poll:?} must be non-zero and shorter than block time {block:?}")]
    PollInterval { poll: Duration, block: Duration },

    #[error("poll interval + round + grace ({budget:?}) exceeds block time {block:?}")]
    Budget { budget: Duration, block: Duration },
}
