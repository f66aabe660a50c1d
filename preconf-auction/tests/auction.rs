use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use preconf_auction::{
    AuctionConfig, AuctionError, AuctionMetrics, Auctioneer, HeightSource, MonitorError,
    SourceError, SubmitError, Whitelist,
};
use preconf_types::{Bid, BlockNumber, Signer, U256};
use preconf_utils::types::logging::init_logging;
use prometheus::Registry;
use tokio::time::{sleep, timeout};

/// A chain whose height the test controls.
#[derive(Default)]
struct Chain {
    height: AtomicU64,
    down: AtomicBool,
}

impl Chain {
    fn new(height: u64) -> Arc<Self> {
        let c = Self::default();
        c.height.store(height, Ordering::Relaxed);
        Arc::new(c)
    }

    fn advance(&self) {
        self.height.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl HeightSource for Chain {
    async fn current_height(&self) -> Result<u64, SourceError> {
        if self.down.load(Ordering::Relaxed) {
            return Err("connection refused".into());
        }
        Ok(self.height.load(Ordering::Relaxed))
    }
}

fn config(queue_len: usize) -> AuctionConfig {
    AuctionConfig::builder()
        .poll_interval(Duration::from_millis(50))
        .round_duration(Duration::from_millis(500))
        .watchdog_grace(Duration::from_millis(200))
        .block_time(Duration::from_secs(1))
        .queue_len(queue_len)
        .build()
}

fn start(chain: &Arc<Chain>, bidders: &[Signer]) -> (Auctioneer, Arc<AuctionMetrics>) {
    start_with(config(16), chain, bidders)
}

fn start_with(
    cfg: AuctionConfig,
    chain: &Arc<Chain>,
    bidders: &[Signer],
) -> (Auctioneer, Arc<AuctionMetrics>) {
    cfg.validate().unwrap();
    let metrics = Arc::new(AuctionMetrics::new(&Registry::new()).unwrap());
    let registry = Whitelist::new(bidders.iter().map(|s| s.address()));
    let a = Auctioneer::new(cfg, chain.clone(), registry, metrics.clone());
    (a, metrics)
}

/// Wait until a round for `block` accepts bids.
async fn round_open(a: &Auctioneer, block: u64) {
    while a.coordinator().current_block() != Some(BlockNumber::from(block)) {
        sleep(Duration::from_millis(5)).await
    }
}

fn bid(s: &Signer, amount: u64, block: u64) -> Bid {
    Bid::sign(U256::from(amount), U256::from(block), s).unwrap()
}

#[tokio::test(start_paused = true)]
async fn highest_bid_wins() {
    init_logging();

    let bidders: Vec<Signer> = (0..3).map(|_| Signer::random()).collect();
    let chain = Chain::new(100);
    let (mut a, metrics) = start(&chain, &bidders);

    assert_eq!(
        a.submit_bid(bid(&bidders[0], 1, 100)),
        Err(SubmitError::NoActiveRound)
    );
    assert_eq!(a.current_bid(), None);

    sleep(Duration::from_millis(60)).await;
    chain.advance();
    round_open(&a, 100).await;

    a.submit_bid(bid(&bidders[0], 5, 100)).unwrap();
    a.submit_encoded(&bid(&bidders[1], 9, 100).encode()).unwrap();
    a.submit_bid(bid(&bidders[2], 9, 100)).unwrap();

    let outsider = Signer::random();
    assert_eq!(
        a.submit_bid(bid(&outsider, 50, 100)),
        Err(SubmitError::NotEligible(outsider.address()))
    );
    assert!(matches!(
        a.submit_bid(bid(&bidders[0], 50, 101)),
        Err(SubmitError::WrongBlock { .. })
    ));

    let best = a.current_bid().unwrap();
    assert_eq!(best.bidder(), bidders[1].address());
    assert_eq!(best.amount(), U256::from(9));
    assert_eq!(a.current_encoded(), Some(best.encode()));

    let winner = a.next_winner().await.unwrap();
    assert_eq!(winner, best);
    assert_eq!(metrics.rounds_won.get(), 1);
    assert_eq!(metrics.bids_accepted.get(), 3);

    a.shutdown();
    assert!(matches!(a.next_winner().await, Err(AuctionError::Cancelled)));
}

#[tokio::test(start_paused = true)]
async fn blocks_without_bids_are_silent() {
    init_logging();

    let bidder = Signer::random();
    let chain = Chain::new(7);
    let (mut a, metrics) = start(&chain, std::slice::from_ref(&bidder));

    sleep(Duration::from_millis(60)).await;
    chain.advance();
    round_open(&a, 7).await;

    // Block 7 gets no bids. Once its round is over the next block closes.
    sleep(Duration::from_millis(600)).await;
    chain.advance();
    round_open(&a, 8).await;

    let b = bid(&bidder, 42, 8);
    a.submit_bid(b.clone()).unwrap();

    assert_eq!(a.next_winner().await.unwrap(), b);
    assert_eq!(metrics.rounds.get(), 2);
    assert_eq!(metrics.rounds_won.get(), 1);
}

#[tokio::test(start_paused = true)]
async fn rounds_are_sequential() {
    init_logging();

    let bidder = Signer::random();
    let chain = Chain::new(1);
    let (mut a, _metrics) = start(&chain, std::slice::from_ref(&bidder));

    sleep(Duration::from_millis(60)).await;
    chain.advance();
    round_open(&a, 1).await;

    // Two blocks close while round 1 is still open; they queue up.
    sleep(Duration::from_millis(60)).await;
    chain.advance();
    sleep(Duration::from_millis(60)).await;
    chain.advance();
    assert_eq!(a.coordinator().current_block(), Some(BlockNumber::from(1)));

    a.submit_bid(bid(&bidder, 1, 1)).unwrap();
    assert_eq!(a.next_winner().await.unwrap().amount(), U256::from(1));

    round_open(&a, 2).await;
    a.submit_bid(bid(&bidder, 2, 2)).unwrap();
    assert_eq!(a.next_winner().await.unwrap().target_block(), U256::from(2));

    round_open(&a, 3).await;
    a.submit_bid(bid(&bidder, 3, 3)).unwrap();
    assert_eq!(a.next_winner().await.unwrap().target_block(), U256::from(3));
}

#[tokio::test(start_paused = true)]
async fn unreachable_chain_is_terminal() {
    init_logging();

    let chain = Chain::new(5);
    let (mut a, _metrics) = start(&chain, &[]);

    sleep(Duration::from_millis(60)).await;
    chain.down.store(true, Ordering::Relaxed);

    let err = a.next_winner().await.unwrap_err();
    assert!(matches!(err, AuctionError::Monitor(MonitorError::Source(_))));
    assert!(err.is_terminal());
    assert!(matches!(
        a.next_winner().await,
        Err(AuctionError::TaskTerminated)
    ));
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_open_round() {
    init_logging();

    let bidder = Signer::random();
    let chain = Chain::new(20);
    let (mut a, _metrics) = start(&chain, std::slice::from_ref(&bidder));

    sleep(Duration::from_millis(60)).await;
    chain.advance();
    round_open(&a, 20).await;
    a.submit_bid(bid(&bidder, 1, 20)).unwrap();

    a.shutdown();
    assert!(matches!(a.next_winner().await, Err(AuctionError::Cancelled)));
    assert_eq!(a.current_bid(), None);
    assert_eq!(
        a.submit_bid(bid(&bidder, 2, 20)),
        Err(SubmitError::NoActiveRound)
    );
}

#[tokio::test(start_paused = true)]
async fn idle_reader_does_not_stall_rounds() {
    init_logging();

    let bidder = Signer::random();
    let chain = Chain::new(30);
    let (mut a, metrics) = start_with(config(2), &chain, std::slice::from_ref(&bidder));

    sleep(Duration::from_millis(60)).await;
    for block in 30..38 {
        chain.advance();
        timeout(Duration::from_secs(2), round_open(&a, block))
            .await
            .unwrap_or_else(|_| panic!("round for block {block} never opened"));
        a.submit_bid(bid(&bidder, block, block)).unwrap();
        sleep(Duration::from_millis(600)).await;
    }

    assert_eq!(metrics.rounds.get(), 8);
    assert_eq!(metrics.rounds_won.get(), 8);
    assert_eq!(metrics.results_dropped.get(), 6);

    // The queued winners are the oldest ones.
    assert_eq!(a.next_winner().await.unwrap().target_block(), U256::from(30));
    assert_eq!(a.next_winner().await.unwrap().target_block(), U256::from(31));
}
