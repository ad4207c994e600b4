//! Resolved-market detection and cash-out.
//!
//! A market whose prices have converged to within `EDGE_LOW`/`EDGE_HIGH`
//! of an outcome is treated as terminal: cancel everything and flatten the
//! position with a single IOC order at the touch.

use rust_decimal::Decimal;
use tracing::warn;

use lip_core::{OrderSide, Price};
use lip_feed::{BookView, Touch};

/// A contract trading at or above this bid has effectively won.
pub const EDGE_HIGH: Decimal = Decimal::from_parts(985, 0, 0, false, 3);
/// A contract offered at or below this ask is effectively worthless.
pub const EDGE_LOW: Decimal = Decimal::from_parts(15, 0, 0, false, 3);

/// Which outcome the book has converged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Yes,
    No,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "yes"),
            Self::No => write!(f, "no"),
        }
    }
}

/// Outcome of the per-tick resolution check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionCheck {
    Unresolved,
    Resolved(Resolution),
    /// Both contracts signal a win: the book is inconsistent, do not trade
    /// this tick.
    Conflicting,
}

/// Detect an effectively-settled market from the book.
///
/// YES has won when `yes_bid ≥ EDGE_HIGH` or, equivalently, the NO ask
/// (`1 − yes_bid`) is at or below `EDGE_LOW`. NO has won when the best NO
/// bid is at the high edge, i.e. the synthesized YES ask is at or below
/// `EDGE_LOW`.
pub fn detect(view: &BookView) -> ResolutionCheck {
    let yes_bid = view.best_bid().map(|l| l.price);
    let yes_ask = view.best_ask().map(|l| l.price);

    let yes_won = yes_bid.is_some_and(|p| p.inner() >= EDGE_HIGH);
    let no_won = yes_ask.is_some_and(|p| p.inner() <= EDGE_LOW);

    match (yes_won, no_won) {
        (false, false) => ResolutionCheck::Unresolved,
        (true, false) => ResolutionCheck::Resolved(Resolution::Yes),
        (false, true) => ResolutionCheck::Resolved(Resolution::No),
        (true, true) => {
            warn!(
                yes_bid = %yes_bid.map(|p| p.to_string()).unwrap_or_default(),
                yes_ask = %yes_ask.map(|p| p.to_string()).unwrap_or_default(),
                "Contradictory resolution signals, skipping tick"
            );
            ResolutionCheck::Conflicting
        }
    }
}

/// The terminal IOC order that flattens a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CashOut {
    pub side: OrderSide,
    pub price: Price,
    pub size: u32,
}

/// Cash-out action for a resolved market.
///
/// Long inventory sells at the best YES bid; short inventory buys back at
/// the best YES ask. The winning side only changes whether the flatten is
/// a win or a loss, not the action.
pub fn cashout(inventory: i64, touch: &Touch) -> Option<CashOut> {
    if inventory == 0 {
        return None;
    }
    let size = inventory.unsigned_abs().min(u32::MAX as u64) as u32;
    Some(if inventory > 0 {
        CashOut {
            side: OrderSide::Sell,
            price: touch.bid,
            size,
        }
    } else {
        CashOut {
            side: OrderSide::Buy,
            price: touch.ask,
            size,
        }
    })
}
