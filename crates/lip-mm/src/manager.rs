//! Per-market state machine.
//!
//! Reconciles the desired quote against live exchange orders and emits a
//! vector of [`Action`]s per tick for the scheduler to execute. The
//! scheduler executes actions synchronously within the tick and reports
//! outcomes back through `record_placed` / `record_cancelled`, so at most
//! one live buy and one live sell exist per market at any time.
//!
//! Phases: `tracked → quoting ⇄ blocked → exiting → closed`.

use tracing::{debug, info};

use lip_core::{OrderSide, Price, Ticker};
use lip_exchange::{FillEvent, OrderId};
use lip_feed::Touch;

use crate::config::MakerConfig;
use crate::quote::{DesiredQuote, SkipReason};
use crate::resolution::cashout;

/// Hours to expiry below which a remaining position is force-flattened.
const FORCE_FLATTEN_HOURS: f64 = 1.0;

/// Lifecycle phase of a tracked market.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketPhase {
    /// Admitted; no quotes resting yet.
    Tracked,
    /// Actively maintaining quotes.
    Quoting,
    /// Degenerate prices; parked until the touch changes.
    Blocked,
    /// Only the offsetting side is worked until flat.
    Exiting,
    /// Terminal; the scheduler untracks the market.
    Closed,
}

/// A resting order owned by this market's state machine.
#[derive(Debug, Clone)]
pub struct LiveOrder {
    pub order_id: OrderId,
    pub side: OrderSide,
    pub price: Price,
    pub remaining: u32,
    pub submitted_ts: i64,
}

/// One step of reconciliation, executed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Rest a GTC quote.
    Place {
        side: OrderSide,
        price: Price,
        size: u32,
    },
    /// Cancel a live order.
    Cancel { side: OrderSide, order_id: OrderId },
    /// Terminal IOC order flattening a resolved or expiring position.
    CashOut {
        side: OrderSide,
        price: Price,
        size: u32,
    },
    /// Remove the market from the tracked set.
    Untrack,
}

/// State machine for one market.
#[derive(Debug)]
pub struct MarketState {
    ticker: Ticker,
    close_ts: i64,
    lip_target: u32,
    phase: MarketPhase,
    live_buy: Option<LiveOrder>,
    live_sell: Option<LiveOrder>,
    last_touch: Option<(Price, Price)>,
    improved_on_touch: bool,
    last_improvement_ts: i64,
    last_reactive_ms: i64,
}

impl MarketState {
    pub fn new(ticker: Ticker, close_ts: i64, lip_target: u32) -> Self {
        Self {
            ticker,
            close_ts,
            lip_target,
            phase: MarketPhase::Tracked,
            live_buy: None,
            live_sell: None,
            last_touch: None,
            improved_on_touch: false,
            last_improvement_ts: 0,
            last_reactive_ms: 0,
        }
    }

    pub fn close_ts(&self) -> i64 {
        self.close_ts
    }

    pub fn lip_target(&self) -> u32 {
        self.lip_target
    }

    /// LIP targets are refreshed from the exchange periodically.
    pub fn set_lip_target(&mut self, target: u32) {
        self.lip_target = target;
    }

    pub fn phase(&self) -> MarketPhase {
        self.phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase == MarketPhase::Closed
    }

    pub fn live(&self, side: OrderSide) -> Option<&LiveOrder> {
        match side {
            OrderSide::Buy => self.live_buy.as_ref(),
            OrderSide::Sell => self.live_sell.as_ref(),
        }
    }

    fn live_mut(&mut self, side: OrderSide) -> &mut Option<LiveOrder> {
        match side {
            OrderSide::Buy => &mut self.live_buy,
            OrderSide::Sell => &mut self.live_sell,
        }
    }

    /// The scheduler confirms a placement.
    pub fn record_placed(
        &mut self,
        side: OrderSide,
        order_id: OrderId,
        price: Price,
        size: u32,
        now_ts: i64,
    ) {
        *self.live_mut(side) = Some(LiveOrder {
            order_id,
            side,
            price,
            remaining: size,
            submitted_ts: now_ts,
        });
    }

    /// The scheduler confirms a cancel (`NotFound` counts as success).
    pub fn record_cancelled(&mut self, side: OrderSide) {
        *self.live_mut(side) = None;
    }

    /// Route a confirmed fill to the matching live order.
    pub fn on_fill(&mut self, fill: &FillEvent) {
        for slot in [&mut self.live_buy, &mut self.live_sell] {
            if let Some(order) = slot {
                if order.order_id == fill.order_id {
                    order.remaining = order.remaining.saturating_sub(fill.count);
                    if order.remaining == 0 {
                        *slot = None;
                    }
                    return;
                }
            }
        }
    }

    /// Track external touch changes: re-arms the one-improvement-per-touch
    /// gate and unparks a blocked market.
    fn observe_touch(&mut self, touch: Option<&Touch>) {
        let current = touch.map(|t| (t.bid, t.ask));
        if current != self.last_touch {
            self.improved_on_touch = false;
            if self.phase == MarketPhase::Blocked {
                self.phase = MarketPhase::Tracked;
            }
            self.last_touch = current;
        }
    }

    /// Cancel actions for every live order of this market.
    pub fn cancel_all(&self) -> Vec<Action> {
        let mut actions = Vec::new();
        for order in [&self.live_buy, &self.live_sell].into_iter().flatten() {
            actions.push(Action::Cancel {
                side: order.side,
                order_id: order.order_id.clone(),
            });
        }
        actions
    }

    fn close(&mut self) -> Vec<Action> {
        let mut actions = self.cancel_all();
        self.phase = MarketPhase::Closed;
        actions.push(Action::Untrack);
        actions
    }

    /// Resolved-market shortcut: cancel everything and flatten with one
    /// IOC order at the touch.
    pub fn on_resolution(&mut self, inventory: i64, touch: Option<&Touch>) -> Vec<Action> {
        if self.phase == MarketPhase::Closed {
            return Vec::new();
        }
        if inventory == 0 {
            info!(ticker = %self.ticker, "Resolved flat, untracking");
            return self.close();
        }

        let mut actions = self.cancel_all();
        if let Some(c) = touch.and_then(|t| cashout(inventory, t)) {
            info!(
                ticker = %self.ticker,
                side = %c.side,
                price = %c.price,
                size = c.size,
                "Resolved market cash-out"
            );
            actions.push(Action::CashOut {
                side: c.side,
                price: c.price,
                size: c.size,
            });
        }
        self.phase = MarketPhase::Exiting;
        actions
    }

    /// Regular per-tick reconciliation.
    pub fn on_tick(
        &mut self,
        desired: &DesiredQuote,
        inventory: i64,
        touch: Option<&Touch>,
        now_ts: i64,
        cfg: &MakerConfig,
    ) -> Vec<Action> {
        if self.phase == MarketPhase::Closed {
            return Vec::new();
        }

        self.observe_touch(touch);

        // Expiry reached: no further quotes.
        if now_ts >= self.close_ts {
            info!(ticker = %self.ticker, "Close time passed, untracking");
            return self.close();
        }

        // Near expiry with a position: cross the spread instead of waiting
        // to be lifted.
        let hours_to_expiry = (self.close_ts - now_ts) as f64 / 3600.0;
        if hours_to_expiry <= FORCE_FLATTEN_HOURS && inventory != 0 {
            if let Some(c) = touch.and_then(|t| cashout(inventory, t)) {
                info!(
                    ticker = %self.ticker,
                    hours = %format!("{hours_to_expiry:.1}"),
                    size = c.size,
                    "Force-flatten near expiry"
                );
                let mut actions = self.cancel_all();
                actions.push(Action::CashOut {
                    side: c.side,
                    price: c.price,
                    size: c.size,
                });
                self.phase = MarketPhase::Exiting;
                return actions;
            }
        }

        if self.phase == MarketPhase::Exiting {
            return self.exit_tick(desired, inventory, touch, now_ts, cfg);
        }

        match desired.skip {
            Some(reason @ (SkipReason::Risk | SkipReason::LipTargetMet)) => {
                if inventory == 0 {
                    debug!(ticker = %self.ticker, reason = %reason, "Skip while flat, untracking");
                    self.close()
                } else {
                    debug!(ticker = %self.ticker, reason = %reason, "Skip with inventory, exiting");
                    self.phase = MarketPhase::Exiting;
                    self.exit_tick(desired, inventory, touch, now_ts, cfg)
                }
            }
            Some(SkipReason::ExtremePrice) => {
                debug!(ticker = %self.ticker, "Degenerate quote, blocked until touch changes");
                self.phase = MarketPhase::Blocked;
                Vec::new()
            }
            Some(SkipReason::ThinBook) | Some(SkipReason::Disabled) => Vec::new(),
            None => {
                self.phase = MarketPhase::Quoting;
                self.reconcile(desired, inventory, now_ts, cfg)
            }
        }
    }

    /// Exiting: only the offsetting side is worked; the opposing side's
    /// live order is canceled.
    fn exit_tick(
        &mut self,
        desired: &DesiredQuote,
        inventory: i64,
        touch: Option<&Touch>,
        now_ts: i64,
        cfg: &MakerConfig,
    ) -> Vec<Action> {
        if inventory == 0 {
            info!(ticker = %self.ticker, "Flat after exit, untracking");
            return self.close();
        }

        let exit_side = if inventory > 0 {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        };
        let mut actions = Vec::new();

        // Cancel the exposure-increasing side.
        if let Some(order) = self.live(exit_side.opposite()) {
            actions.push(Action::Cancel {
                side: exit_side.opposite(),
                order_id: order.order_id.clone(),
            });
        }

        // Exit quote: the risk-adjusted level when available, otherwise
        // join the touch on the offsetting side.
        let price = match exit_side {
            OrderSide::Sell => desired.ask.map(|l| l.price).or(touch.map(|t| t.ask)),
            OrderSide::Buy => desired.bid.map(|l| l.price).or(touch.map(|t| t.bid)),
        };
        if let Some(price) = price {
            let size = inventory.unsigned_abs().min(u32::MAX as u64) as u32;
            actions.extend(self.reconcile_side(exit_side, Some((price, size)), now_ts, cfg));
        }

        actions
    }

    /// Two-sided reconciliation while quoting.
    fn reconcile(
        &mut self,
        desired: &DesiredQuote,
        inventory: i64,
        now_ts: i64,
        cfg: &MakerConfig,
    ) -> Vec<Action> {
        let mut bid = desired.bid.map(|l| (l.price, l.size));
        let mut ask = desired.ask.map(|l| (l.price, l.size));

        // Inventory cap: suppress the side that would increase exposure.
        if inventory.unsigned_abs() >= cfg.max_position as u64 {
            if inventory > 0 {
                bid = None;
            } else {
                ask = None;
            }
        }

        let mut actions = self.reconcile_side(OrderSide::Buy, bid, now_ts, cfg);
        actions.extend(self.reconcile_side(OrderSide::Sell, ask, now_ts, cfg));
        actions
    }

    /// Reconcile one side against its desired level.
    fn reconcile_side(
        &mut self,
        side: OrderSide,
        desired: Option<(Price, u32)>,
        now_ts: i64,
        cfg: &MakerConfig,
    ) -> Vec<Action> {
        let cooldown_ok = cfg.improve_cooldown_seconds <= 0
            || now_ts - self.last_improvement_ts >= cfg.improve_cooldown_seconds;

        match (self.live(side).cloned(), desired) {
            (None, Some((price, size))) => {
                if !cooldown_ok {
                    return Vec::new();
                }
                vec![Action::Place { side, price, size }]
            }
            (Some(order), Some((price, size))) => {
                if order.price == price {
                    return Vec::new();
                }
                let improving = match side {
                    OrderSide::Buy => price > order.price,
                    OrderSide::Sell => price < order.price,
                };
                if improving {
                    if cfg.improve_once_per_touch && self.improved_on_touch {
                        return Vec::new();
                    }
                    if !cooldown_ok {
                        return Vec::new();
                    }
                    self.improved_on_touch = true;
                    self.last_improvement_ts = now_ts;
                }
                // Cancel is acknowledged before the place is issued.
                vec![
                    Action::Cancel {
                        side,
                        order_id: order.order_id.clone(),
                    },
                    Action::Place { side, price, size },
                ]
            }
            (Some(order), None) => vec![Action::Cancel {
                side,
                order_id: order.order_id.clone(),
            }],
            (None, None) => Vec::new(),
        }
    }

    /// Reactive ask path, triggered by a book update rather than the tick.
    ///
    /// When the best bid (the sell reference) moves and we hold inventory,
    /// lift the live sell to the new reference, throttled per market. Buy
    /// orders wait for the next tick.
    pub fn reactive_ask(
        &mut self,
        new_best_bid: Price,
        inventory: i64,
        now_ms: i64,
        cooldown_ms: u64,
    ) -> Vec<Action> {
        if inventory <= 0 {
            return Vec::new();
        }
        if !matches!(self.phase, MarketPhase::Quoting | MarketPhase::Exiting) {
            return Vec::new();
        }
        let Some(order) = self.live_sell.clone() else {
            return Vec::new();
        };
        if order.price == new_best_bid {
            return Vec::new();
        }
        if now_ms - self.last_reactive_ms < cooldown_ms as i64 {
            debug!(ticker = %self.ticker, "Reactive ask inside cooldown, skipped");
            return Vec::new();
        }
        self.last_reactive_ms = now_ms;

        let size = inventory.unsigned_abs().min(u32::MAX as u64) as u32;
        vec![
            Action::Cancel {
                side: OrderSide::Sell,
                order_id: order.order_id,
            },
            Action::Place {
                side: OrderSide::Sell,
                price: new_best_bid,
                size,
            },
        ]
    }
}
