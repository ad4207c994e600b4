//! Main scheduler and application wiring.
//!
//! The scheduler is the authoritative mutator of live orders and market
//! state. Streams update books and feed fills through bounded queues; the
//! scheduler drains them at tick boundaries and executes the state
//! machines' actions against the exchange, gated by the circuit breaker.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lip_core::{Price, Ticker, TimeInForce};
use lip_exchange::{
    with_rate_limit_retry, ExchangeClient, ExchangeError, FillEvent, OrderRequest,
};
use lip_feed::{BookRegistry, BookStreamWorker, FillStreamWorker, StreamCommand, TouchUpdate};
use lip_mm::{desired_quote, detect, Action, InventoryBook, MarketPhase, MarketState, ResolutionCheck};
use lip_risk::{CircuitBreaker, RiskScorer, VolatilityCache, VolatilityEngine};

use crate::config::AppConfig;
use crate::discovery::{CandidateQueue, DiscoveryWorker};
use crate::error::{AppError, AppResult};

/// Cadence of the PnL / inventory-imbalance safety sweep.
const SAFETY_CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// The trading agent.
pub struct Application {
    config: AppConfig,
    client: Arc<dyn ExchangeClient>,
    registry: Arc<BookRegistry>,
    /// Tracked tickers, shared with the book stream and discovery workers.
    tracked: Arc<RwLock<Vec<Ticker>>>,
    markets: HashMap<Ticker, MarketState>,
    inventory: InventoryBook,
    vol_engine: Arc<VolatilityEngine>,
    vol_cache: Arc<VolatilityCache>,
    scorer: RiskScorer,
    breaker: Arc<CircuitBreaker>,
    queue: Arc<CandidateQueue>,
    fill_tx: mpsc::Sender<FillEvent>,
    fill_rx: mpsc::Receiver<FillEvent>,
    touch_tx: mpsc::Sender<TouchUpdate>,
    touch_rx: Option<mpsc::Receiver<TouchUpdate>>,
    book_cmd_tx: mpsc::Sender<StreamCommand>,
    book_cmd_rx: Option<mpsc::Receiver<StreamCommand>>,
    shutdown: CancellationToken,
    last_safety_check: Option<Instant>,
    halt_cancel_issued: bool,
}

impl Application {
    pub fn new(config: AppConfig, client: Arc<dyn ExchangeClient>) -> Self {
        let registry = Arc::new(BookRegistry::new());
        let tracked = Arc::new(RwLock::new(Vec::new()));
        let vol_cache = Arc::new(VolatilityCache::new());
        let vol_engine = Arc::new(VolatilityEngine::new(
            client.clone(),
            vol_cache.clone(),
            config.risk.vol_config(),
        ));
        let scorer = RiskScorer::new(vol_cache.clone(), config.risk.risk_params());
        let breaker = Arc::new(CircuitBreaker::new(config.breaker_config()));
        let queue = Arc::new(CandidateQueue::new());

        let (fill_tx, fill_rx) = mpsc::channel(1024);
        let (touch_tx, touch_rx) = mpsc::channel(256);
        let (book_cmd_tx, book_cmd_rx) = mpsc::channel(16);

        Self {
            config,
            client,
            registry,
            tracked,
            markets: HashMap::new(),
            inventory: InventoryBook::new(),
            vol_engine,
            vol_cache,
            scorer,
            breaker,
            queue,
            fill_tx,
            fill_rx,
            touch_tx,
            touch_rx: Some(touch_rx),
            book_cmd_tx,
            book_cmd_rx: Some(book_cmd_rx),
            shutdown: CancellationToken::new(),
            last_safety_check: None,
            halt_cancel_issued: false,
        }
    }

    // --- accessors (also used by the scenario tests) ---

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn vol_cache(&self) -> Arc<VolatilityCache> {
        self.vol_cache.clone()
    }

    pub fn registry(&self) -> Arc<BookRegistry> {
        self.registry.clone()
    }

    pub fn candidate_queue(&self) -> Arc<CandidateQueue> {
        self.queue.clone()
    }

    /// Sender feeding the scheduler's fill queue.
    pub fn fill_sender(&self) -> mpsc::Sender<FillEvent> {
        self.fill_tx.clone()
    }

    pub fn position(&self, ticker: &Ticker) -> i64 {
        self.inventory.position(ticker)
    }

    pub fn is_tracked(&self, ticker: &Ticker) -> bool {
        self.markets.contains_key(ticker)
    }

    pub fn market_phase(&self, ticker: &Ticker) -> Option<MarketPhase> {
        self.markets.get(ticker).map(|m| m.phase())
    }

    // --- lifecycle ---

    /// Admit a market into the tracked set.
    pub fn track_market(&mut self, ticker: Ticker, close_ts: i64, lip_target: u32) {
        if self.markets.contains_key(&ticker) {
            return;
        }
        info!(ticker = %ticker, close_ts, lip_target, "Tracking market");
        self.registry.track(ticker.clone());
        self.tracked.write().push(ticker.clone());
        self.markets
            .insert(ticker.clone(), MarketState::new(ticker, close_ts, lip_target));
        let _ = self.book_cmd_tx.try_send(StreamCommand::Resubscribe);
    }

    fn untrack_market(&mut self, ticker: &Ticker) {
        info!(ticker = %ticker, "Untracking market");
        self.markets.remove(ticker);
        self.registry.untrack(ticker);
        self.tracked.write().retain(|t| t != ticker);
        let _ = self.book_cmd_tx.try_send(StreamCommand::Resubscribe);
    }

    fn spawn_workers(&mut self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if let Some(cmd_rx) = self.book_cmd_rx.take() {
            let worker = BookStreamWorker::new(
                self.client.clone(),
                self.registry.clone(),
                self.tracked.clone(),
                self.touch_tx.clone(),
                cmd_rx,
                self.shutdown.clone(),
            );
            handles.push(tokio::spawn(worker.run()));
        }

        let fills = FillStreamWorker::new(
            self.client.clone(),
            self.fill_tx.clone(),
            self.shutdown.clone(),
        );
        handles.push(tokio::spawn(fills.run()));

        let discovery = DiscoveryWorker::new(
            self.client.clone(),
            self.queue.clone(),
            self.tracked.clone(),
            Duration::from_secs(self.config.discovery_interval_seconds),
            self.shutdown.clone(),
        );
        handles.push(tokio::spawn(discovery.run()));

        handles
    }

    /// Run the agent until a shutdown signal.
    pub async fn run(mut self) -> AppResult<()> {
        let Some(mut touch_rx) = self.touch_rx.take() else {
            return Err(AppError::Config("application already running".to_string()));
        };
        let mut handles = self.spawn_workers();

        let mut interval = tokio::time::interval(self.config.tick_period());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(mode = ?self.config.mode, dt = self.config.dt, "Agent started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now().timestamp()).await;
                }
                Some(update) = touch_rx.recv() => {
                    self.on_touch_update(update).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.shutdown_sequence().await;

        for handle in handles.iter_mut() {
            if tokio::time::timeout(Duration::from_secs(5), &mut *handle)
                .await
                .is_err()
            {
                warn!("Worker did not stop within 5 s, aborting");
                handle.abort();
            }
        }

        Ok(())
    }

    /// One scheduler tick.
    pub async fn tick(&mut self, now_ts: i64) {
        // Tripped breaker: withdraw quotes once, then idle until restart.
        if self.breaker.is_tripped() {
            if !self.halt_cancel_issued {
                warn!(reason = ?self.breaker.reason(), "Breaker tripped, cancelling all resting orders");
                self.cancel_all_live().await;
                self.halt_cancel_issued = true;
            }
            return;
        }

        // Fills first so decisions see current inventory.
        self.drain_fills();

        self.admit_candidates(now_ts);

        // Volatility refresh runs on a worker; the next tick sees the
        // updated cache. The engine gates its own cadence.
        let universe = self.tracked.read().clone();
        if !universe.is_empty() {
            let engine = self.vol_engine.clone();
            tokio::spawn(async move { engine.refresh(&universe, now_ts).await });
        }

        let tickers: Vec<Ticker> = self.markets.keys().cloned().collect();
        for ticker in tickers {
            self.drive_market(&ticker, now_ts).await;
        }

        let due = self
            .last_safety_check
            .map(|t| t.elapsed() >= SAFETY_CHECK_INTERVAL)
            .unwrap_or(true);
        if due {
            self.refresh_lip_targets().await;
            self.safety_checks();
            self.last_safety_check = Some(Instant::now());
        }
    }

    /// Pull current LIP target sizes for the tracked set.
    async fn refresh_lip_targets(&mut self) {
        let tickers: Vec<Ticker> = self.markets.keys().cloned().collect();
        for ticker in tickers {
            match self.client.get_lip_target(&ticker).await {
                Ok(target) => {
                    if let Some(market) = self.markets.get_mut(&ticker) {
                        if market.lip_target() != target {
                            info!(ticker = %ticker, target, "LIP target updated");
                            market.set_lip_target(target);
                        }
                    }
                }
                Err(e) => debug!(ticker = %ticker, error = %e, "LIP target refresh failed"),
            }
        }
    }

    /// Reactive ask path: a book update moved the best bid.
    pub async fn on_touch_update(&mut self, update: TouchUpdate) {
        if self.breaker.is_tripped() {
            return;
        }
        let inventory = self.inventory.position(&update.ticker);
        let now_ms = Utc::now().timestamp_millis();
        let actions = match self.markets.get_mut(&update.ticker) {
            Some(market) => market.reactive_ask(
                update.best_bid,
                inventory,
                now_ms,
                self.config.orderbook_update_cooldown_ms,
            ),
            None => return,
        };
        if !actions.is_empty() {
            let ticker = update.ticker.clone();
            self.execute(&ticker, actions, Utc::now().timestamp()).await;
        }
    }

    fn drain_fills(&mut self) {
        while let Ok(fill) = self.fill_rx.try_recv() {
            if let Some(change) = self.inventory.apply_fill(&fill) {
                info!(
                    ticker = %change.ticker,
                    old = change.old_position,
                    new = change.new_position,
                    realized_pnl = %change.realized_pnl,
                    "inventory_change"
                );
            }
            if let Some(market) = self.markets.get_mut(&fill.ticker) {
                market.on_fill(&fill);
            }
        }
    }

    fn admit_candidates(&mut self, now_ts: i64) {
        let room = self
            .config
            .max_markets_with_orders
            .saturating_sub(self.markets.len());
        if room == 0 {
            return;
        }
        for candidate in self.queue.drain(room) {
            if self.markets.contains_key(&candidate.ticker) {
                continue;
            }
            // Risk-gated admission against the current (possibly stale)
            // volatility cache.
            if self.config.maker.lip_enabled {
                let score = self
                    .scorer
                    .score(&candidate.ticker, candidate.close_ts, now_ts);
                if score.value > self.config.maker.lip_risk_threshold {
                    debug!(
                        ticker = %candidate.ticker,
                        risk = %format!("{:.3}", score.value),
                        "Candidate rejected by risk gate"
                    );
                    continue;
                }
            }
            self.track_market(candidate.ticker, candidate.close_ts, candidate.lip_target);
        }
    }

    async fn drive_market(&mut self, ticker: &Ticker, now_ts: i64) {
        let Some(view) = self.registry.view(ticker) else {
            // No book yet: the stream has not delivered a snapshot.
            return;
        };
        let inventory = self.inventory.position(ticker);
        let touch = view.touch();

        let actions = {
            let Some(market) = self.markets.get_mut(ticker) else {
                return;
            };
            match detect(&view) {
                ResolutionCheck::Conflicting => {
                    warn!(ticker = %ticker, "Inconsistent book, not trading this tick");
                    Vec::new()
                }
                ResolutionCheck::Resolved(side) => {
                    debug!(ticker = %ticker, side = %side, "Market resolved");
                    market.on_resolution(inventory, touch.as_ref())
                }
                ResolutionCheck::Unresolved => {
                    let score = self.scorer.score(ticker, market.close_ts(), now_ts);
                    let desired = desired_quote(
                        &view,
                        score.value,
                        inventory,
                        market.lip_target(),
                        &self.config.maker,
                    );
                    if let Some(reason) = desired.skip {
                        debug!(
                            ticker = %ticker,
                            reason = %reason,
                            risk = %format!("{:.3}", score.value),
                            "Quote skipped"
                        );
                    } else {
                        debug!(
                            ticker = %ticker,
                            risk = %format!("{:.3}", score.value),
                            lip_intensity = %format!("{:.2}", desired.lip_intensity),
                            "Quote computed"
                        );
                    }
                    market.on_tick(&desired, inventory, touch.as_ref(), now_ts, &self.config.maker)
                }
            }
        };

        self.execute(ticker, actions, now_ts).await;
    }

    /// Execute a market's actions in order. The cancel of a cancel/place
    /// pair is awaited (and acknowledged) before the place is issued.
    async fn execute(&mut self, ticker: &Ticker, actions: Vec<Action>, now_ts: i64) {
        let client = self.client.clone();
        for action in actions {
            match action {
                Action::Cancel { side, order_id } => {
                    match client.cancel_order(&order_id).await {
                        Ok(()) => {
                            self.breaker.record_success();
                            if let Some(m) = self.markets.get_mut(ticker) {
                                m.record_cancelled(side);
                            }
                            debug!(ticker = %ticker, side = %side, order_id = %order_id, "Order cancelled");
                        }
                        // A gone order is a successful cancel.
                        Err(ExchangeError::NotFound) => {
                            if let Some(m) = self.markets.get_mut(ticker) {
                                m.record_cancelled(side);
                            }
                        }
                        Err(e) => {
                            warn!(ticker = %ticker, order_id = %order_id, error = %e, "Cancel failed");
                            self.breaker.record_error(&e);
                        }
                    }
                }
                Action::Place { side, price, size } => {
                    // Once tripped, no placement is ever issued.
                    if self.breaker.is_tripped() {
                        continue;
                    }
                    let req = OrderRequest {
                        ticker: ticker.clone(),
                        side,
                        price,
                        count: size,
                        tif: TimeInForce::Gtc,
                    };
                    let attempt = || {
                        let client = client.clone();
                        let req = req.clone();
                        async move { client.place_order(req).await }
                    };
                    match with_rate_limit_retry(attempt).await {
                        Ok(order_id) => {
                            self.breaker.record_success();
                            info!(ticker = %ticker, side = %side, price = %price, size, "Quote placed");
                            if let Some(m) = self.markets.get_mut(ticker) {
                                m.record_placed(side, order_id, price, size, now_ts);
                            }
                        }
                        Err(ExchangeError::OrderRejected { reason }) => {
                            // Rejection leaves no phantom live order and does
                            // not count toward the breaker.
                            warn!(ticker = %ticker, side = %side, price = %price, reason = %reason, "Order rejected");
                        }
                        Err(e) => {
                            warn!(ticker = %ticker, side = %side, error = %e, "Place failed");
                            self.breaker.record_error(&e);
                        }
                    }
                }
                Action::CashOut { side, price, size } => {
                    if self.breaker.is_tripped() {
                        continue;
                    }
                    let req = OrderRequest {
                        ticker: ticker.clone(),
                        side,
                        price,
                        count: size,
                        tif: TimeInForce::Ioc,
                    };
                    let attempt = || {
                        let client = client.clone();
                        let req = req.clone();
                        async move { client.place_order(req).await }
                    };
                    match with_rate_limit_retry(attempt).await {
                        Ok(order_id) => {
                            self.breaker.record_success();
                            info!(
                                ticker = %ticker,
                                side = %side,
                                price = %price,
                                size,
                                order_id = %order_id,
                                "Cash-out submitted"
                            );
                        }
                        Err(e) => {
                            warn!(ticker = %ticker, error = %e, "Cash-out failed");
                            self.breaker.record_error(&e);
                        }
                    }
                }
                Action::Untrack => {
                    self.untrack_market(ticker);
                }
            }
        }
    }

    /// Withdraw every resting order (tripped breaker or shutdown).
    async fn cancel_all_live(&mut self) {
        let pending: Vec<(Ticker, Vec<Action>)> = self
            .markets
            .iter()
            .map(|(t, m)| (t.clone(), m.cancel_all()))
            .filter(|(_, a)| !a.is_empty())
            .collect();
        for (ticker, actions) in pending {
            self.execute(&ticker, actions, Utc::now().timestamp()).await;
        }
    }

    /// Minute-cadence PnL and inventory-imbalance checks, excluding
    /// resolved markets.
    fn safety_checks(&mut self) {
        let registry = self.registry.clone();
        let unrealized = self
            .inventory
            .total_unrealized_pnl(|t| registry.touch(t).map(|x| Price::midpoint(x.bid, x.ask)));
        let total = self.inventory.total_realized_pnl() + unrealized;
        let total_f = total.to_f64().unwrap_or(0.0);
        debug!(total_pnl = %format!("{total_f:.2}"), "Safety sweep");
        self.breaker.check_pnl(total_f);

        for ticker in self.markets.keys() {
            if let Some(view) = self.registry.view(ticker) {
                if matches!(detect(&view), ResolutionCheck::Resolved(_)) {
                    continue;
                }
            }
            self.breaker
                .check_imbalance(self.inventory.position(ticker), self.config.maker.max_position);
        }
    }

    async fn shutdown_sequence(&mut self) {
        info!("Shutting down: cancelling resting orders");
        // Best effort; failures are logged and must not block exit.
        self.cancel_all_live().await;
        self.breaker.persist();
        self.shutdown.cancel();
    }
}
