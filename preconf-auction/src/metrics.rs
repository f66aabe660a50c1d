use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry, Result};

#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct AuctionMetrics {
    /// Last chain height observed by the block monitor.
    pub height: IntGauge,
    /// Auction rounds opened.
    pub rounds: IntCounter,
    /// Auction rounds that produced a winner.
    pub rounds_won: IntCounter,
    /// Bids accepted into a round.
    pub bids_accepted: IntCounter,
    /// Bids rejected, by reason.
    pub bids_rejected: IntCounterVec,
    /// Rounds that failed to close before the watchdog fired.
    pub watchdog_timeouts: IntCounter,
    /// Winners and watchdog errors dropped because the output queue was full.
    pub results_dropped: IntCounter,
}

impl AuctionMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let this = Self {
            height: IntGauge::new("preconf_block_height", "last observed chain height")?,
            rounds: IntCounter::new("preconf_rounds_total", "auction rounds opened")?,
            rounds_won: IntCounter::new("preconf_rounds_won_total", "auction rounds with a winner")?,
            bids_accepted: IntCounter::new("preconf_bids_accepted_total", "bids accepted")?,
            bids_rejected: IntCounterVec::new(
                Opts::new("preconf_bids_rejected_total", "bids rejected"),
                &["reason"],
            )?,
            watchdog_timeouts: IntCounter::new(
                "preconf_watchdog_timeouts_total",
                "rounds not closed before the watchdog deadline",
            )?,
            results_dropped: IntCounter::new(
                "preconf_results_dropped_total",
                "auction results dropped on a full output queue",
            )?,
        };
        registry.register(Box::new(this.height.clone()))?;
        registry.register(Box::new(this.rounds.clone()))?;
        registry.register(Box::new(this.rounds_won.clone()))?;
        registry.register(Box::new(this.bids_accepted.clone()))?;
        registry.register(Box::new(this.bids_rejected.clone()))?;
        registry.register(Box::new(this.watchdog_timeouts.clone()))?;
        registry.register(Box::new(this.results_dropped.clone()))?;
        Ok(this)
    }

    pub fn rejected(&self, reason: &str) -> u64 {
        self.bids_rejected.with_label_values(&[reason]).get()
    }
}
