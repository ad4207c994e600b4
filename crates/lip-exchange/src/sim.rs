//! In-memory simulated exchange.
//!
//! Doubles as the injected test fake and as the `paper` run mode's venue.
//! Books, candles, and the market universe are scripted; REST failures can
//! be queued per call path to exercise the error policy end to end.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use lip_core::{ContractSide, Ticker, TimeInForce};

use crate::client::ExchangeClient;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{
    BookEvent, BookEventKind, BookLevel, BookSnapshot, Candle, FillEvent, MarketInfo, OrderId,
    OrderRequest,
};

const STREAM_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct SimMarket {
    info: MarketInfo,
    book: BookSnapshot,
    candles: Vec<Candle>,
}

#[derive(Default)]
struct SimState {
    markets: HashMap<Ticker, SimMarket>,
    open_orders: HashMap<OrderId, OrderRequest>,
    placed: Vec<(OrderId, OrderRequest)>,
    canceled: Vec<OrderId>,
    queued_place_errors: VecDeque<ExchangeError>,
    queued_cancel_errors: VecDeque<ExchangeError>,
    /// Next sequence number per (ticker, side) book channel.
    seqs: HashMap<(Ticker, ContractSide), u64>,
}

/// Scriptable in-memory exchange.
pub struct SimExchange {
    state: Mutex<SimState>,
    book_subs: Mutex<Vec<mpsc::Sender<BookEvent>>>,
    fill_subs: Mutex<Vec<mpsc::Sender<FillEvent>>>,
}

impl SimExchange {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
            book_subs: Mutex::new(Vec::new()),
            fill_subs: Mutex::new(Vec::new()),
        }
    }

    /// Register a market with its starting book.
    pub fn add_market(&self, info: MarketInfo, book: BookSnapshot) {
        let ticker = info.ticker.clone();
        self.state.lock().markets.insert(
            ticker,
            SimMarket {
                info,
                book,
                candles: Vec::new(),
            },
        );
    }

    /// Replace a market's book wholesale (snapshot-level change).
    pub fn set_book(&self, ticker: &Ticker, book: BookSnapshot) {
        if let Some(m) = self.state.lock().markets.get_mut(ticker) {
            m.book = book;
        }
    }

    pub fn set_candles(&self, ticker: &Ticker, candles: Vec<Candle>) {
        if let Some(m) = self.state.lock().markets.get_mut(ticker) {
            m.candles = candles;
        }
    }

    /// Queue an error for the next `place_order` call.
    pub fn fail_next_place(&self, err: ExchangeError) {
        self.state.lock().queued_place_errors.push_back(err);
    }

    /// Queue an error for the next `cancel_order` call.
    pub fn fail_next_cancel(&self, err: ExchangeError) {
        self.state.lock().queued_cancel_errors.push_back(err);
    }

    /// All orders ever accepted, in submission order.
    pub fn placed_orders(&self) -> Vec<(OrderId, OrderRequest)> {
        self.state.lock().placed.clone()
    }

    /// All order ids canceled so far.
    pub fn canceled_orders(&self) -> Vec<OrderId> {
        self.state.lock().canceled.clone()
    }

    /// Currently resting orders.
    pub fn open_orders(&self) -> Vec<(OrderId, OrderRequest)> {
        self.state
            .lock()
            .open_orders
            .iter()
            .map(|(id, req)| (id.clone(), req.clone()))
            .collect()
    }

    /// Broadcast a raw book event without touching internal state.
    ///
    /// Used by tests that need out-of-sequence or malformed streams.
    pub fn push_raw_book_event(&self, event: BookEvent) {
        for tx in self.book_subs.lock().iter() {
            let _ = tx.try_send(event.clone());
        }
    }

    /// Apply a delta to the internal book and broadcast it in sequence.
    pub fn push_delta(&self, ticker: &Ticker, side: ContractSide, price: lip_core::Price, delta: i64) {
        let event = {
            let mut state = self.state.lock();
            if let Some(m) = state.markets.get_mut(ticker) {
                let levels = match side {
                    ContractSide::Yes => &mut m.book.yes_bids,
                    ContractSide::No => &mut m.book.no_bids,
                };
                apply_level_delta(levels, price, delta);
            }
            let seq = state
                .seqs
                .entry((ticker.clone(), side))
                .and_modify(|s| *s += 1)
                .or_insert(1);
            BookEvent {
                ticker: ticker.clone(),
                side,
                seq: *seq,
                kind: BookEventKind::Delta { price, delta },
            }
        };
        self.push_raw_book_event(event);
    }

    /// Broadcast a fill and reduce the matching resting order.
    pub fn push_fill(&self, event: FillEvent) {
        {
            let mut state = self.state.lock();
            let fully_filled = match state.open_orders.get_mut(&event.order_id) {
                Some(req) => {
                    req.count = req.count.saturating_sub(event.count);
                    req.count == 0
                }
                None => false,
            };
            if fully_filled {
                state.open_orders.remove(&event.order_id);
            }
        }
        for tx in self.fill_subs.lock().iter() {
            let _ = tx.try_send(event.clone());
        }
    }

    fn snapshot_events(&self, tickers: &[Ticker]) -> Vec<BookEvent> {
        let mut state = self.state.lock();
        let mut events = Vec::new();
        for ticker in tickers {
            let Some(m) = state.markets.get(ticker) else {
                continue;
            };
            let book = m.book.clone();
            for (side, levels) in [
                (ContractSide::Yes, book.yes_bids),
                (ContractSide::No, book.no_bids),
            ] {
                let seq = state
                    .seqs
                    .entry((ticker.clone(), side))
                    .and_modify(|s| *s += 1)
                    .or_insert(1);
                events.push(BookEvent {
                    ticker: ticker.clone(),
                    side,
                    seq: *seq,
                    kind: BookEventKind::Snapshot(levels),
                });
            }
        }
        events
    }
}

impl Default for SimExchange {
    fn default() -> Self {
        Self::new()
    }
}

fn apply_level_delta(levels: &mut Vec<BookLevel>, price: lip_core::Price, delta: i64) {
    if let Some(idx) = levels.iter().position(|l| l.price == price) {
        let next = levels[idx].count as i64 + delta;
        if next <= 0 {
            levels.remove(idx);
        } else {
            levels[idx].count = next as u32;
        }
    } else if delta > 0 {
        levels.push(BookLevel {
            price,
            count: delta as u32,
        });
    }
}

#[async_trait]
impl ExchangeClient for SimExchange {
    async fn place_order(&self, req: OrderRequest) -> ExchangeResult<OrderId> {
        let mut state = self.state.lock();
        if let Some(err) = state.queued_place_errors.pop_front() {
            return Err(err);
        }
        let id = OrderId(format!("sim-{}", Uuid::new_v4()));
        debug!(ticker = %req.ticker, side = %req.side, price = %req.price, count = req.count, "sim order accepted");
        state.placed.push((id.clone(), req.clone()));
        if req.tif == TimeInForce::Gtc {
            state.open_orders.insert(id.clone(), req);
        }
        Ok(id)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> ExchangeResult<()> {
        let mut state = self.state.lock();
        if let Some(err) = state.queued_cancel_errors.pop_front() {
            return Err(err);
        }
        state.canceled.push(order_id.clone());
        match state.open_orders.remove(order_id) {
            Some(_) => Ok(()),
            None => Err(ExchangeError::NotFound),
        }
    }

    async fn get_orderbook(&self, ticker: &Ticker) -> ExchangeResult<BookSnapshot> {
        self.state
            .lock()
            .markets
            .get(ticker)
            .map(|m| m.book.clone())
            .ok_or(ExchangeError::NotFound)
    }

    async fn get_candles(
        &self,
        ticker: &Ticker,
        start_ts: i64,
        end_ts: i64,
        _period_minutes: u32,
    ) -> ExchangeResult<Vec<Candle>> {
        let state = self.state.lock();
        let m = state.markets.get(ticker).ok_or(ExchangeError::NotFound)?;
        Ok(m.candles
            .iter()
            .filter(|c| c.ts >= start_ts && c.ts <= end_ts)
            .copied()
            .collect())
    }

    async fn get_valid_markets(&self) -> ExchangeResult<Vec<MarketInfo>> {
        Ok(self
            .state
            .lock()
            .markets
            .values()
            .map(|m| m.info.clone())
            .collect())
    }

    async fn get_lip_target(&self, ticker: &Ticker) -> ExchangeResult<u32> {
        self.state
            .lock()
            .markets
            .get(ticker)
            .map(|m| m.info.lip_target)
            .ok_or(ExchangeError::NotFound)
    }

    async fn subscribe_orderbook(
        &self,
        tickers: &[Ticker],
    ) -> ExchangeResult<mpsc::Receiver<BookEvent>> {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        // New subscriptions start with a snapshot of every requested book.
        for event in self.snapshot_events(tickers) {
            let _ = tx.try_send(event);
        }
        self.book_subs.lock().push(tx);
        Ok(rx)
    }

    async fn subscribe_fills(
        &self,
        _tickers: &[Ticker],
    ) -> ExchangeResult<mpsc::Receiver<FillEvent>> {
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        self.fill_subs.lock().push(tx);
        Ok(rx)
    }
}
