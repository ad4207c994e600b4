//! Inventory ledger.
//!
//! Tracks signed contracts per market (positive = net long YES) and
//! realized PnL against the weighted-average entry price. Fills are
//! delivered at-least-once; the per-order fill index makes application
//! idempotent.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::debug;

use lip_core::{OrderSide, Price, Ticker};
use lip_exchange::{FillEvent, OrderId};

/// Per-market position state.
#[derive(Debug, Clone, Default)]
struct PositionState {
    position: i64,
    avg_price: Decimal,
    realized_pnl: Decimal,
    /// Highest fill index seen per order, for retry deduplication.
    last_fill_index: HashMap<OrderId, u64>,
}

/// Emitted after every applied fill.
#[derive(Debug, Clone)]
pub struct InventoryChange {
    pub ticker: Ticker,
    pub old_position: i64,
    pub new_position: i64,
    pub realized_pnl: Decimal,
}

/// All per-market positions. Mutated only on confirmed fills, by the
/// scheduler draining the fill queue.
#[derive(Debug, Default)]
pub struct InventoryBook {
    positions: HashMap<Ticker, PositionState>,
}

impl InventoryBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a fill. Returns `None` when the `(order_id, fill_index)` pair
    /// was already applied.
    pub fn apply_fill(&mut self, fill: &FillEvent) -> Option<InventoryChange> {
        let state = self.positions.entry(fill.ticker.clone()).or_default();

        let seen = state
            .last_fill_index
            .get(&fill.order_id)
            .copied()
            .unwrap_or(0);
        if fill.fill_index <= seen {
            debug!(
                ticker = %fill.ticker,
                order_id = %fill.order_id,
                fill_index = fill.fill_index,
                "Duplicate fill dropped"
            );
            return None;
        }
        state
            .last_fill_index
            .insert(fill.order_id.clone(), fill.fill_index);

        let qty = fill.count as i64;
        let signed = match fill.side {
            OrderSide::Buy => qty,
            OrderSide::Sell => -qty,
        };
        let price = fill.price.inner();

        let old = state.position;
        let new = old + signed;

        if old != 0 && old.signum() != signed.signum() {
            // Reducing (or flipping): realize PnL on the closed portion.
            let closed = signed.abs().min(old.abs());
            let pnl = if old > 0 {
                (price - state.avg_price) * Decimal::from(closed)
            } else {
                (state.avg_price - price) * Decimal::from(closed)
            };
            state.realized_pnl += pnl;

            if new == 0 {
                state.avg_price = Decimal::ZERO;
            } else if new.signum() != old.signum() {
                // Flipped: the residual opened entirely at this fill.
                state.avg_price = price;
            }
            // Plain reduction keeps the remaining chunk's entry price.
        } else {
            // Opening or adding: weighted-average entry.
            let old_notional = Decimal::from(old.abs()) * state.avg_price;
            let add_notional = Decimal::from(qty) * price;
            if new != 0 {
                state.avg_price = (old_notional + add_notional) / Decimal::from(new.abs());
            }
        }

        state.position = new;

        Some(InventoryChange {
            ticker: fill.ticker.clone(),
            old_position: old,
            new_position: new,
            realized_pnl: state.realized_pnl,
        })
    }

    /// Signed position for a market.
    pub fn position(&self, ticker: &Ticker) -> i64 {
        self.positions.get(ticker).map(|s| s.position).unwrap_or(0)
    }

    pub fn avg_price(&self, ticker: &Ticker) -> Decimal {
        self.positions
            .get(ticker)
            .map(|s| s.avg_price)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn realized_pnl(&self, ticker: &Ticker) -> Decimal {
        self.positions
            .get(ticker)
            .map(|s| s.realized_pnl)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn total_realized_pnl(&self) -> Decimal {
        self.positions.values().map(|s| s.realized_pnl).sum()
    }

    /// Unrealized PnL across open positions, marked at the supplied mid.
    pub fn total_unrealized_pnl<F>(&self, mark: F) -> Decimal
    where
        F: Fn(&Ticker) -> Option<Price>,
    {
        self.positions
            .iter()
            .filter(|(_, s)| s.position != 0)
            .filter_map(|(ticker, s)| {
                let m = mark(ticker)?.inner();
                Some(if s.position > 0 {
                    (m - s.avg_price) * Decimal::from(s.position)
                } else {
                    (s.avg_price - m) * Decimal::from(s.position.abs())
                })
            })
            .sum()
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn fill(order: &str, side: OrderSide, cents: i64, count: u32, index: u64) -> FillEvent {
        FillEvent {
            ticker: Ticker::from("INV-1"),
            order_id: OrderId(order.to_string()),
            side,
            price: Price::from_cents(cents),
            count,
            ts: index as i64,
            fill_index: index,
        }
    }

    fn ticker() -> Ticker {
        Ticker::from("INV-1")
    }

    #[test]
    fn test_buy_then_sell_realizes_pnl() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        assert_eq!(book.position(&ticker()), 10);
        assert_eq!(book.avg_price(&ticker()), dec!(0.40));

        book.apply_fill(&fill("b", OrderSide::Sell, 45, 10, 1)).unwrap();
        assert_eq!(book.position(&ticker()), 0);
        // (0.45 - 0.40) * 10 = 0.50
        assert_eq!(book.realized_pnl(&ticker()), dec!(0.50));
        assert_eq!(book.avg_price(&ticker()), Decimal::ZERO);
    }

    #[test]
    fn test_short_then_cover() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Sell, 60, 20, 1)).unwrap();
        assert_eq!(book.position(&ticker()), -20);

        book.apply_fill(&fill("b", OrderSide::Buy, 55, 20, 1)).unwrap();
        // (0.60 - 0.55) * 20 = 1.00
        assert_eq!(book.realized_pnl(&ticker()), dec!(1.00));
    }

    #[test]
    fn test_weighted_average_entry() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        book.apply_fill(&fill("b", OrderSide::Buy, 50, 10, 1)).unwrap();
        assert_eq!(book.avg_price(&ticker()), dec!(0.45));
        assert_eq!(book.position(&ticker()), 20);
    }

    #[test]
    fn test_partial_reduction_keeps_entry() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        book.apply_fill(&fill("b", OrderSide::Sell, 44, 4, 1)).unwrap();
        assert_eq!(book.position(&ticker()), 6);
        assert_eq!(book.avg_price(&ticker()), dec!(0.40));
        assert_eq!(book.realized_pnl(&ticker()), dec!(0.16));
    }

    #[test]
    fn test_flip_resets_entry_to_fill_price() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        book.apply_fill(&fill("b", OrderSide::Sell, 45, 15, 1)).unwrap();
        assert_eq!(book.position(&ticker()), -5);
        assert_eq!(book.avg_price(&ticker()), dec!(0.45));
        assert_eq!(book.realized_pnl(&ticker()), dec!(0.50));
    }

    #[test]
    fn test_duplicate_fill_is_idempotent() {
        let mut book = InventoryBook::new();
        let f = fill("a", OrderSide::Buy, 40, 10, 1);
        assert!(book.apply_fill(&f).is_some());
        assert!(book.apply_fill(&f).is_none());
        assert_eq!(book.position(&ticker()), 10);

        // An older index replayed later is also dropped.
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 5, 2)).unwrap();
        assert!(book.apply_fill(&fill("a", OrderSide::Buy, 40, 5, 1)).is_none());
        assert_eq!(book.position(&ticker()), 15);
    }

    #[test]
    fn test_fill_indices_per_order() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        // Same index on a different order applies fine.
        book.apply_fill(&fill("b", OrderSide::Buy, 41, 10, 1)).unwrap();
        assert_eq!(book.position(&ticker()), 20);
    }

    #[test]
    fn test_unrealized_pnl_marked() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        let unrealized = book.total_unrealized_pnl(|_| Some(Price::from_cents(46)));
        assert_eq!(unrealized, dec!(0.60));

        // No mark available: excluded.
        assert_eq!(book.total_unrealized_pnl(|_| None), Decimal::ZERO);
    }

    #[test]
    fn test_inventory_change_reports_running_pnl() {
        let mut book = InventoryBook::new();
        book.apply_fill(&fill("a", OrderSide::Buy, 40, 10, 1)).unwrap();
        let change = book
            .apply_fill(&fill("b", OrderSide::Sell, 45, 10, 1))
            .unwrap();
        assert_eq!(change.old_position, 10);
        assert_eq!(change.new_position, 0);
        assert_eq!(change.realized_pnl, dec!(0.50));
    }
}
