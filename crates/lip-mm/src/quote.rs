//! Quote-level policy.
//!
//! Given the book, the risk score, and current inventory, decide whether to
//! quote, how many ticks behind the best price to sit, and at what size.
//! The policy never improves the touch: a bid rests at or below the best
//! bid, an ask at or above the best ask.

use rust_decimal::Decimal;

use lip_core::Price;
use lip_feed::BookView;

use crate::band::{build_qualifying_band, lip_intensity};
use crate::config::MakerConfig;

/// Why a market is not quoted this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// LIP quoting disabled or no target size.
    Disabled,
    /// Risk score above the skip threshold.
    Risk,
    /// Resting size at best already meets the LIP target.
    LipTargetMet,
    /// Chosen prices are degenerate (outside [0.02, 0.98] or crossed).
    ExtremePrice,
    /// Book cannot cover the target on both sides.
    ThinBook,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "disabled"),
            Self::Risk => write!(f, "risk"),
            Self::LipTargetMet => write!(f, "lip_target_met"),
            Self::ExtremePrice => write!(f, "extreme_price"),
            Self::ThinBook => write!(f, "thin_book"),
        }
    }
}

/// A chosen quote level for one side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteLevel {
    pub price: Price,
    pub size: u32,
    pub ticks_from_best: u32,
    pub multiplier: f64,
}

/// Desired quotes for one market, derived fresh each tick.
#[derive(Debug, Clone)]
pub struct DesiredQuote {
    pub bid: Option<QuoteLevel>,
    pub ask: Option<QuoteLevel>,
    pub skip: Option<SkipReason>,
    /// `size_at_best / target`, for logging.
    pub lip_intensity: f64,
}

impl DesiredQuote {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            bid: None,
            ask: None,
            skip: Some(reason),
            lip_intensity: 0.0,
        }
    }

}

/// Discrete risk bucket: 0 ticks (join), 1 tick back, or skip.
fn bucket_ticks(risk_score: f64, cfg: &MakerConfig) -> Option<u32> {
    if risk_score < cfg.lip_medium_risk_threshold {
        Some(0)
    } else if risk_score < cfg.lip_high_risk_threshold {
        Some(1)
    } else {
        None
    }
}

/// Extra ticks away from the exposed side once inventory is inside the
/// position-limit buffer zone.
fn skew_ticks(inventory: i64, cfg: &MakerConfig) -> u32 {
    if inventory.unsigned_abs() < cfg.skew_floor() as u64 {
        return 0;
    }
    let ratio = inventory.unsigned_abs() as f64 / cfg.max_position.max(1) as f64;
    (cfg.inventory_skew_factor * ratio * 3.0).floor() as u32
}

/// Compute the desired quote for one market.
pub fn desired_quote(
    view: &BookView,
    risk_score: f64,
    inventory: i64,
    target: u32,
    cfg: &MakerConfig,
) -> DesiredQuote {
    if !cfg.lip_enabled || target == 0 {
        return DesiredQuote::skipped(SkipReason::Disabled);
    }
    if risk_score > cfg.lip_risk_threshold {
        return DesiredQuote::skipped(SkipReason::Risk);
    }

    // The rebate target is already met at the touch: nothing to add.
    if let Some(best_bid) = view.best_bid() {
        if best_bid.count >= target {
            let mut q = DesiredQuote::skipped(SkipReason::LipTargetMet);
            q.lip_intensity = lip_intensity(&view.yes_bids, target);
            return q;
        }
    }

    let Some(touch) = view.touch() else {
        return DesiredQuote::skipped(SkipReason::ThinBook);
    };
    let d = cfg.lip_discount_factor;
    let (Some(bid_band), Some(ask_band)) = (
        build_qualifying_band(&view.yes_bids, target, d),
        build_qualifying_band(&view.yes_asks, target, d),
    ) else {
        return DesiredQuote::skipped(SkipReason::ThinBook);
    };

    let Some(base_ticks) = bucket_ticks(risk_score, cfg) else {
        return DesiredQuote::skipped(SkipReason::Risk);
    };

    let skew = skew_ticks(inventory, cfg);
    let bid_ticks = (base_ticks + if inventory > 0 { skew } else { 0 }).min(bid_band.max_ticks());
    let ask_ticks = (base_ticks + if inventory < 0 { skew } else { 0 }).min(ask_band.max_ticks());

    let mut bid_price = touch.bid.minus_ticks(bid_ticks);
    let mut ask_price = touch.ask.plus_ticks(ask_ticks);

    // Width floor: widen both sides symmetrically around the midpoint.
    let want_width = Decimal::new(cfg.min_quote_width_cents as i64, 2);
    if !want_width.is_zero() && (ask_price - bid_price) < want_width {
        let mid = (bid_price.inner() + ask_price.inner()) / Decimal::TWO;
        let half = want_width / Decimal::TWO;
        bid_price = Price::to_tick(mid - half);
        ask_price = Price::to_tick(mid + half);
    }

    // A zero-or-crossed pair with no width floor is degenerate.
    if ask_price <= bid_price {
        return DesiredQuote::skipped(SkipReason::ExtremePrice);
    }

    let bid = (!bid_price.is_extreme_quote()).then_some(QuoteLevel {
        price: bid_price,
        size: target,
        ticks_from_best: bid_ticks,
        multiplier: d.powi(bid_ticks as i32),
    });
    let ask = (!ask_price.is_extreme_quote()).then_some(QuoteLevel {
        price: ask_price,
        size: target,
        ticks_from_best: ask_ticks,
        multiplier: d.powi(ask_ticks as i32),
    });

    if bid.is_none() && ask.is_none() {
        return DesiredQuote::skipped(SkipReason::ExtremePrice);
    }

    DesiredQuote {
        bid,
        ask,
        skip: None,
        lip_intensity: lip_intensity(&view.yes_bids, target),
    }
}
