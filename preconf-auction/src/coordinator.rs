use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use preconf_types::{Address, Bid, BlockNumber, U256};
use tokio::select;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::AuctionError;
use crate::metrics::AuctionMetrics;
use crate::registry::Registry;

/// The result of a closed auction round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The highest accepted bid.
    Won(Bid),
    /// No bid was accepted before the deadline.
    NoBids,
}

impl Outcome {
    pub fn winner(&self) -> Option<&Bid> {
        match self {
            Self::Won(b) => Some(b),
            Self::NoBids => None,
        }
    }
}

/// Runs auction rounds, one at a time.
///
/// Clones share the same round slot, so a clone can be handed to whatever
/// transport receives bids.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Arc<dyn Registry>,
    slot: Mutex<Option<Round>>,
    next_id: AtomicU64,
    metrics: Arc<AuctionMetrics>,
    cancel: CancellationToken,
}

/// An open round. Removing it from the slot closes it.
struct Round {
    id: u64,
    block: BlockNumber,
    deadline: Instant,
    best: Option<Bid>,
    result: oneshot::Sender<Outcome>,
}

/// Yields the single outcome of a round.
#[derive(Debug)]
pub struct RoundHandle {
    block: BlockNumber,
    rx: oneshot::Receiver<Outcome>,
}

impl RoundHandle {
    pub fn block(&self) -> BlockNumber {
        self.block
    }

    /// Wait for the round to close.
    ///
    /// Returns `AuctionError::Cancelled` if the round was aborted or the
    /// coordinator shut down before the deadline.
    pub async fn outcome(self) -> Result<Outcome, AuctionError> {
        self.rx.await.map_err(|_| AuctionError::Cancelled)
    }
}

impl Coordinator {
    pub fn new<R>(registry: R, metrics: Arc<AuctionMetrics>, cancel: CancellationToken) -> Self
    where
        R: Registry,
    {
        Self {
            inner: Arc::new(Inner {
                registry: Arc::new(registry),
                slot: Mutex::new(None),
                next_id: AtomicU64::new(0),
                metrics,
                cancel,
            }),
        }
    }

    /// Open a round for `block` that accepts bids for `duration`.
    ///
    /// Only one round may be open at a time; starting another one before the
    /// current round closed is a caller bug and yields
    /// `AuctionError::RoundInProgress`. Must be called within a tokio
    /// runtime, the round is closed by a spawned task.
    pub fn start(&self, block: BlockNumber, duration: Duration) -> Result<RoundHandle, AuctionError> {
        let (tx, rx) = oneshot::channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = Instant::now() + duration;
        {
            let mut slot = self.inner.slot.lock();
            if let Some(open) = &*slot {
                return Err(AuctionError::RoundInProgress {
                    open: open.block,
                    requested: block,
                });
            }
            *slot = Some(Round {
                id,
                block,
                deadline,
                best: None,
                result: tx,
            });
        }
        self.inner.metrics.rounds.inc();
        info!(%block, ?duration, "auction round opened");
        tokio::spawn(close(self.inner.clone(), id, deadline));
        Ok(RoundHandle { block, rx })
    }

    /// Offer a bid to the open round.
    ///
    /// The bid replaces the current best bid only if its amount is strictly
    /// greater. A rejected bid leaves the round untouched.
    pub fn submit_bid(&self, bid: Bid) -> Result<(), SubmitError> {
        let res = self.try_submit(bid);
        match &res {
            Ok(()) => self.inner.metrics.bids_accepted.inc(),
            Err(e) => {
                debug!(err = %e, "bid rejected");
                self.inner
                    .metrics
                    .bids_rejected
                    .with_label_values(&[e.code()])
                    .inc()
            }
        }
        res
    }

    /// Decode a bid from its wire format and offer it to the open round.
    pub fn submit_encoded(&self, s: &str) -> Result<(), SubmitError> {
        match Bid::decode(s) {
            Ok(bid) => self.submit_bid(bid),
            Err(e) => {
                let e = SubmitError::Malformed(e.to_string());
                self.inner
                    .metrics
                    .bids_rejected
                    .with_label_values(&[e.code()])
                    .inc();
                Err(e)
            }
        }
    }

    /// Snapshot of the best bid of the open round.
    pub fn current_bid(&self) -> Option<Bid> {
        self.inner.slot.lock().as_ref().and_then(|r| r.best.clone())
    }

    /// Wire encoding of [`Coordinator::current_bid`].
    pub fn current_encoded(&self) -> Option<String> {
        self.current_bid().map(|b| b.encode())
    }

    /// The block of the open round, if any.
    pub fn current_block(&self) -> Option<BlockNumber> {
        self.inner.slot.lock().as_ref().map(|r| r.block)
    }

    /// Close the open round without a result.
    ///
    /// Returns the block of the aborted round, if there was one.
    pub fn abort(&self) -> Option<BlockNumber> {
        let round = self.inner.slot.lock().take()?;
        warn!(block = %round.block, "auction round aborted");
        Some(round.block)
    }

    fn try_submit(&self, bid: Bid) -> Result<(), SubmitError> {
        let (id, block) = {
            let slot = self.inner.slot.lock();
            let Some(r) = slot.as_ref().filter(|r| r.is_open()) else {
                return Err(SubmitError::NoActiveRound);
            };
            (r.id, r.block)
        };

        if !block.matches(bid.target_block()) {
            return Err(SubmitError::WrongBlock {
                expected: block,
                actual: bid.target_block(),
            });
        }

        // Signature recovery happens outside of the lock.
        if !bid.verify() {
            return Err(SubmitError::BadSignature(bid.bidder()));
        }

        if !self.inner.registry.is_eligible(&bid.bidder()) {
            return Err(SubmitError::NotEligible(bid.bidder()));
        }

        let mut slot = self.inner.slot.lock();
        let Some(r) = slot.as_mut().filter(|r| r.id == id && r.is_open()) else {
            return Err(SubmitError::NoActiveRound);
        };
        r.offer(bid);
        Ok(())
    }
}

impl Inner {
    /// Take the round out of the slot if it is still round `id`.
    fn take(&self, id: u64) -> Option<Round> {
        let mut slot = self.slot.lock();
        if slot.as_ref().is_some_and(|r| r.id == id) {
            slot.take()
        } else {
            None
        }
    }
}

impl Round {
    fn is_open(&self) -> bool {
        Instant::now() < self.deadline
    }

    fn offer(&mut self, bid: Bid) {
        if self.best.as_ref().is_none_or(|b| bid.amount() > b.amount()) {
            debug!(
                block = %self.block,
                bidder = %bid.bidder(),
                amount = %bid.amount(),
                "new best bid"
            );
            self.best = Some(bid)
        }
    }

    fn close(self) {
        let outcome = match self.best {
            Some(bid) => {
                info!(
                    block = %self.block,
                    bidder = %bid.bidder(),
                    amount = %bid.amount(),
                    "auction round closed"
                );
                Outcome::Won(bid)
            }
            None => {
                info!(block = %self.block, "auction round closed without bids");
                Outcome::NoBids
            }
        };
        if self.result.send(outcome).is_err() {
            debug!(block = %self.block, "round outcome receiver dropped")
        }
    }
}

/// Close round `id` once its deadline has passed.
async fn close(inner: Arc<Inner>, id: u64, deadline: Instant) {
    select! {
        _ = sleep_until(deadline) => {}
        _ = inner.cancel.cancelled() => {
            inner.take(id);
            return
        }
    }
    if let Some(round) = inner.take(id) {
        round.close()
    }
}

/// Why a bid was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum SubmitError {
    #[error("no auction round in progress")]
    NoActiveRound,

    #[error("bid targets block {actual}, auction is for block {expected}")]
    WrongBlock { expected: BlockNumber, actual: U256 },

    #[error("signature was not produced by bidder {0}")]
    BadSignature(Address),

    #[error("bidder {0} is not eligible")]
    NotEligible(Address),

    #[error("malformed bid: {0}")]
    Malformed(String),
}

impl SubmitError {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoActiveRound => "no_active_round",
            Self::WrongBlock { .. } => "wrong_block",
            Self::BadSignature(_) => "bad_signature",
            Self::NotEligible(_) => "not_eligible",
            Self::Malformed(_) => "malformed",
        }
    }
}
