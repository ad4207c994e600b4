//! Order-book stream worker.
//!
//! Subscribes to the orderbook channel for every tracked ticker, applies
//! snapshot/delta events to the registry, and resyncs a market from a REST
//! snapshot whenever sequencing breaks. Disconnects reconnect with
//! exponential backoff (1 s doubling, capped at 30 s) and resubscribe the
//! current tracked set.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lip_core::{Price, Ticker};
use lip_exchange::{BookEvent, BookEventKind, ExchangeClient};

use crate::registry::BookRegistry;
use crate::{BACKOFF_BASE_MS, BACKOFF_MAX_MS};

/// Commands from the scheduler to a stream worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamCommand {
    /// Tracked set changed; drop the stream and resubscribe.
    Resubscribe,
}

/// Emitted when an update moves a market's best YES bid.
///
/// Drives the reactive ask path; the buy side waits for the next tick.
#[derive(Debug, Clone)]
pub struct TouchUpdate {
    pub ticker: Ticker,
    pub best_bid: Price,
}

/// Long-lived book stream task.
pub struct BookStreamWorker {
    client: Arc<dyn ExchangeClient>,
    registry: Arc<BookRegistry>,
    tracked: Arc<RwLock<Vec<Ticker>>>,
    touch_tx: mpsc::Sender<TouchUpdate>,
    command_rx: mpsc::Receiver<StreamCommand>,
    shutdown: CancellationToken,
}

impl BookStreamWorker {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        registry: Arc<BookRegistry>,
        tracked: Arc<RwLock<Vec<Ticker>>>,
        touch_tx: mpsc::Sender<TouchUpdate>,
        command_rx: mpsc::Receiver<StreamCommand>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            registry,
            tracked,
            touch_tx,
            command_rx,
            shutdown,
        }
    }

    /// Run until shutdown.
    pub async fn run(self) {
        let Self {
            client,
            registry,
            tracked,
            touch_tx,
            mut command_rx,
            shutdown,
        } = self;

        let mut backoff = Duration::from_millis(BACKOFF_BASE_MS);

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let tickers = tracked.read().clone();
            if tickers.is_empty() {
                // Nothing to subscribe to yet; wait for a resubscribe nudge.
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    cmd = command_rx.recv() => {
                        if cmd.is_none() {
                            break;
                        }
                        continue;
                    }
                    () = tokio::time::sleep(Duration::from_millis(BACKOFF_BASE_MS)) => continue,
                }
            }

            match client.subscribe_orderbook(&tickers).await {
                Ok(mut rx) => {
                    info!(markets = tickers.len(), "Orderbook stream subscribed");
                    backoff = Duration::from_millis(BACKOFF_BASE_MS);

                    loop {
                        tokio::select! {
                            () = shutdown.cancelled() => return,
                            cmd = command_rx.recv() => match cmd {
                                Some(StreamCommand::Resubscribe) => {
                                    debug!("Tracked set changed, resubscribing");
                                    break;
                                }
                                None => return,
                            },
                            event = rx.recv() => match event {
                                Some(event) => {
                                    handle_event(&client, &registry, &touch_tx, event).await;
                                }
                                None => {
                                    warn!("Orderbook stream disconnected");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Orderbook subscribe failed");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = shutdown.cancelled() => break,
            }
            backoff = (backoff * 2).min(Duration::from_millis(BACKOFF_MAX_MS));
        }

        info!("Book stream worker stopped");
    }
}

async fn handle_event(
    client: &Arc<dyn ExchangeClient>,
    registry: &BookRegistry,
    touch_tx: &mpsc::Sender<TouchUpdate>,
    event: BookEvent,
) {
    let Some(handle) = registry.get(&event.ticker) else {
        debug!(ticker = %event.ticker, "Book event for untracked ticker, dropping");
        return;
    };

    let (previous_bid, outcome) = {
        let mut book = handle.lock();
        let previous_bid = book.best_yes_bid().map(|(p, _)| p);
        let outcome = match event.kind {
            BookEventKind::Snapshot(ref levels) => {
                book.apply_snapshot(event.side, levels, event.seq);
                Ok(())
            }
            BookEventKind::Delta { price, delta } => {
                book.apply_delta(event.side, price, delta, event.seq)
            }
        };
        (previous_bid, outcome)
    };

    if let Err(e) = outcome {
        warn!(ticker = %event.ticker, error = %e, "Book update discarded, resyncing");
        resync(client, registry, &event).await;
    }

    let current_bid = handle.lock().best_yes_bid().map(|(p, _)| p);
    if let Some(best_bid) = current_bid {
        if previous_bid != Some(best_bid) {
            // Best effort; a full queue just delays the reactive path
            // until the next tick.
            let _ = touch_tx.try_send(TouchUpdate {
                ticker: event.ticker.clone(),
                best_bid,
            });
        }
    }
}

/// Rebuild the affected side from a REST snapshot, adopting the offending
/// event's sequence as the new baseline.
async fn resync(client: &Arc<dyn ExchangeClient>, registry: &BookRegistry, event: &BookEvent) {
    match client.get_orderbook(&event.ticker).await {
        Ok(snapshot) => {
            if let Some(handle) = registry.get(&event.ticker) {
                handle.lock().resync(&snapshot, event.side, event.seq);
                info!(ticker = %event.ticker, side = %event.side, seq = event.seq, "Book resynced");
            }
        }
        Err(e) => {
            warn!(ticker = %event.ticker, error = %e, "Resync snapshot fetch failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_core::ContractSide;
    use lip_exchange::{BookLevel, BookSnapshot, MarketInfo, SimExchange};

    fn ticker() -> Ticker {
        Ticker::from("BKS-1")
    }

    fn market(t: &Ticker) -> MarketInfo {
        MarketInfo {
            ticker: t.clone(),
            close_ts: 2_000_000_000,
            lip_target: 100,
            yes_bid: Some(Price::from_cents(50)),
            no_bid: Some(Price::from_cents(47)),
            toxic: false,
        }
    }

    fn book() -> BookSnapshot {
        BookSnapshot {
            yes_bids: vec![BookLevel {
                price: Price::from_cents(50),
                count: 100,
            }],
            no_bids: vec![BookLevel {
                price: Price::from_cents(47),
                count: 100,
            }],
        }
    }

    struct Harness {
        sim: Arc<SimExchange>,
        registry: Arc<BookRegistry>,
        touch_rx: mpsc::Receiver<TouchUpdate>,
        _command_tx: mpsc::Sender<StreamCommand>,
        shutdown: CancellationToken,
    }

    async fn spawn_worker() -> Harness {
        let sim = Arc::new(SimExchange::new());
        sim.add_market(market(&ticker()), book());

        let registry = Arc::new(BookRegistry::new());
        registry.track(ticker());

        let tracked = Arc::new(RwLock::new(vec![ticker()]));
        let (touch_tx, touch_rx) = mpsc::channel(16);
        let (command_tx, command_rx) = mpsc::channel(4);
        let shutdown = CancellationToken::new();

        let worker = BookStreamWorker::new(
            sim.clone(),
            registry.clone(),
            tracked,
            touch_tx,
            command_rx,
            shutdown.clone(),
        );
        tokio::spawn(worker.run());

        Harness {
            sim,
            registry,
            touch_rx,
            _command_tx: command_tx,
            shutdown,
        }
    }

    #[tokio::test]
    async fn test_snapshot_then_delta_applied() {
        let mut h = spawn_worker().await;

        // Initial snapshots raise the best bid from nothing to 0.50.
        let update = h.touch_rx.recv().await.unwrap();
        assert_eq!(update.best_bid, Price::from_cents(50));

        // A delta lifting the bid triggers a touch update.
        h.sim
            .push_delta(&ticker(), ContractSide::Yes, Price::from_cents(53), 40);
        let update = h.touch_rx.recv().await.unwrap();
        assert_eq!(update.best_bid, Price::from_cents(53));

        let view = h.registry.view(&ticker()).unwrap();
        assert_eq!(view.best_bid().unwrap().count, 40);

        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_sequence_gap_triggers_resync() {
        let mut h = spawn_worker().await;
        h.touch_rx.recv().await.unwrap();

        // Skip ahead in sequence; the worker must resync from REST and
        // adopt the snapshot (the sim book still has the original levels).
        h.sim.push_raw_book_event(BookEvent {
            ticker: ticker(),
            side: ContractSide::Yes,
            seq: 99,
            kind: BookEventKind::Delta {
                price: Price::from_cents(10),
                delta: 5,
            },
        });

        // Give the worker a moment to resync.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let view = h.registry.view(&ticker()).unwrap();
        // The out-of-sequence delta was discarded.
        assert!(!view.yes_bids.iter().any(|l| l.price == Price::from_cents(10)));
        assert_eq!(view.best_bid().unwrap().price, Price::from_cents(50));

        h.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unknown_ticker_dropped() {
        let mut h = spawn_worker().await;
        h.touch_rx.recv().await.unwrap();

        h.sim.push_raw_book_event(BookEvent {
            ticker: Ticker::from("UNTRACKED"),
            side: ContractSide::Yes,
            seq: 1,
            kind: BookEventKind::Snapshot(vec![]),
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Still only the tracked book.
        assert_eq!(h.registry.len(), 1);

        h.shutdown.cancel();
    }
}
