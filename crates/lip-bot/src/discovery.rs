//! Market discovery worker.
//!
//! Periodically fetches the universe of open liquidity-program markets,
//! filters out unsuitable candidates, and pushes the rest into a bounded
//! queue. The scheduler drains the queue at the start of each tick up to
//! the tracked-market cap and applies the risk gate at admission.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lip_core::Ticker;
use lip_exchange::{ExchangeClient, MarketInfo};
use lip_mm::resolution::{EDGE_HIGH, EDGE_LOW};

/// Candidate queue capacity; overflow discards the oldest entries.
const QUEUE_CAPACITY: usize = 64;

/// A discovered market awaiting admission.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub ticker: Ticker,
    pub close_ts: i64,
    pub lip_target: u32,
}

/// Bounded, thread-safe candidate queue.
#[derive(Default)]
pub struct CandidateQueue {
    inner: Mutex<VecDeque<Candidate>>,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a candidate, discarding the oldest on overflow.
    pub fn push(&self, candidate: Candidate) {
        let mut queue = self.inner.lock();
        if queue.iter().any(|c| c.ticker == candidate.ticker) {
            return;
        }
        if queue.len() >= QUEUE_CAPACITY {
            if let Some(dropped) = queue.pop_front() {
                warn!(ticker = %dropped.ticker, "Discovery queue full, discarding oldest candidate");
            }
        }
        queue.push_back(candidate);
    }

    /// Take up to `max` candidates, oldest first.
    pub fn drain(&self, max: usize) -> Vec<Candidate> {
        let mut queue = self.inner.lock();
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// Reasons the universe filter dropped candidates in one cycle.
#[derive(Debug, Default)]
struct DropCounts {
    already_tracked: usize,
    toxic: usize,
    past_close: usize,
    extreme_price: usize,
}

/// Apply the discovery filter to one market.
fn eligible(
    market: &MarketInfo,
    tracked: &[Ticker],
    now_ts: i64,
    drops: &mut DropCounts,
) -> bool {
    if tracked.contains(&market.ticker) {
        drops.already_tracked += 1;
        return false;
    }
    if market.toxic {
        drops.toxic += 1;
        return false;
    }
    if market.close_ts <= now_ts {
        drops.past_close += 1;
        return false;
    }
    // Already pinned at an outcome: nothing to make.
    let yes_bid = market.yes_bid.map(|p| p.inner());
    let yes_ask = market.no_bid.map(|p| Decimal::ONE - p.inner());
    let pinned = yes_bid.is_some_and(|p| p >= EDGE_HIGH) || yes_ask.is_some_and(|p| p <= EDGE_LOW);
    if pinned {
        drops.extreme_price += 1;
        return false;
    }
    true
}

/// Long-lived discovery task.
pub struct DiscoveryWorker {
    client: Arc<dyn ExchangeClient>,
    queue: Arc<CandidateQueue>,
    tracked: Arc<RwLock<Vec<Ticker>>>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl DiscoveryWorker {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        queue: Arc<CandidateQueue>,
        tracked: Arc<RwLock<Vec<Ticker>>>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            queue,
            tracked,
            interval,
            shutdown,
        }
    }

    /// Run until shutdown.
    pub async fn run(self) {
        loop {
            self.cycle(chrono::Utc::now().timestamp()).await;

            tokio::select! {
                () = tokio::time::sleep(self.interval) => {}
                () = self.shutdown.cancelled() => break,
            }
        }
        info!("Discovery worker stopped");
    }

    /// One discovery pass.
    pub async fn cycle(&self, now_ts: i64) {
        let universe = match self.client.get_valid_markets().await {
            Ok(markets) => markets,
            Err(e) => {
                warn!(error = %e, "Universe fetch failed");
                return;
            }
        };

        let tracked = self.tracked.read().clone();
        let mut drops = DropCounts::default();
        let mut pushed = 0usize;

        for market in &universe {
            if !eligible(market, &tracked, now_ts, &mut drops) {
                continue;
            }
            self.queue.push(Candidate {
                ticker: market.ticker.clone(),
                close_ts: market.close_ts,
                lip_target: market.lip_target,
            });
            pushed += 1;
        }

        info!(
            universe = universe.len(),
            pushed,
            already_tracked = drops.already_tracked,
            toxic = drops.toxic,
            past_close = drops.past_close,
            extreme_price = drops.extreme_price,
            "Discovery cycle"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_core::Price;
    use lip_exchange::{BookSnapshot, SimExchange};

    fn market(name: &str, close_ts: i64) -> MarketInfo {
        MarketInfo {
            ticker: Ticker::from(name),
            close_ts,
            lip_target: 100,
            yes_bid: Some(Price::from_cents(45)),
            no_bid: Some(Price::from_cents(53)),
            toxic: false,
        }
    }

    fn worker(sim: Arc<SimExchange>, tracked: Vec<Ticker>) -> (DiscoveryWorker, Arc<CandidateQueue>) {
        let queue = Arc::new(CandidateQueue::new());
        let w = DiscoveryWorker::new(
            sim,
            queue.clone(),
            Arc::new(RwLock::new(tracked)),
            Duration::from_secs(10),
            CancellationToken::new(),
        );
        (w, queue)
    }

    #[tokio::test]
    async fn test_cycle_filters_universe() {
        let sim = Arc::new(SimExchange::new());
        sim.add_market(market("GOOD", 10_000), BookSnapshot::default());
        sim.add_market(market("TRACKED", 10_000), BookSnapshot::default());
        sim.add_market(
            MarketInfo {
                toxic: true,
                ..market("TOXIC", 10_000)
            },
            BookSnapshot::default(),
        );
        sim.add_market(market("EXPIRED", 50), BookSnapshot::default());
        sim.add_market(
            MarketInfo {
                yes_bid: Some(Price::from_cents(99)),
                ..market("PINNED", 10_000)
            },
            BookSnapshot::default(),
        );

        let (w, queue) = worker(sim, vec![Ticker::from("TRACKED")]);
        w.cycle(100).await;

        let drained = queue.drain(10);
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].ticker, Ticker::from("GOOD"));
    }

    #[tokio::test]
    async fn test_queue_dedup_and_overflow() {
        let queue = CandidateQueue::new();
        let c = |name: String| Candidate {
            ticker: Ticker::from(name.as_str()),
            close_ts: 10_000,
            lip_target: 100,
        };

        queue.push(c("A".into()));
        queue.push(c("A".into()));
        assert_eq!(queue.len(), 1);

        for i in 0..(QUEUE_CAPACITY + 10) {
            queue.push(c(format!("M{i}")));
        }
        assert_eq!(queue.len(), QUEUE_CAPACITY);
        // Oldest were discarded: "A" is gone.
        assert!(!queue.drain(QUEUE_CAPACITY).iter().any(|c| c.ticker == Ticker::from("A")));
    }

    #[tokio::test]
    async fn test_drain_respects_cap() {
        let queue = CandidateQueue::new();
        for i in 0..5 {
            queue.push(Candidate {
                ticker: Ticker::from(format!("M{i}").as_str()),
                close_ts: 10_000,
                lip_target: 100,
            });
        }
        assert_eq!(queue.drain(2).len(), 2);
        assert_eq!(queue.len(), 3);
    }
}
