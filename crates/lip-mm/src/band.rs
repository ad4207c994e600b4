//! Qualifying band construction.
//!
//! The qualifying band is the contiguous run of price levels from best
//! inward that together meet the LIP target. Each level carries the rebate
//! multiplier `d^ticks` for its distance from best. A book too thin to
//! cover the target yields no band and the market is skipped this tick.

use lip_core::Price;
use lip_exchange::BookLevel;

/// One level of a qualifying band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandLevel {
    pub price: Price,
    pub size: u32,
    pub ticks_from_best: u32,
    pub multiplier: f64,
}

/// Contiguous levels from best inward covering the target size.
#[derive(Debug, Clone)]
pub struct QualifyingBand {
    pub levels: Vec<BandLevel>,
}

impl QualifyingBand {
    /// Deepest distance from best within the band.
    pub fn max_ticks(&self) -> u32 {
        self.levels.last().map(|l| l.ticks_from_best).unwrap_or(0)
    }
}

/// Build the qualifying band from side levels sorted best-first.
///
/// Returns `None` when the side cannot cover `target` (book too thin) or
/// when there is nothing to qualify against.
pub fn build_qualifying_band(
    levels: &[BookLevel],
    target: u32,
    discount: f64,
) -> Option<QualifyingBand> {
    if target == 0 || levels.is_empty() {
        return None;
    }

    let best = levels[0].price;
    let mut band = Vec::new();
    let mut accumulated: u64 = 0;

    for level in levels {
        let ticks = level.price.ticks_from(best);
        band.push(BandLevel {
            price: level.price,
            size: level.count,
            ticks_from_best: ticks,
            multiplier: discount.powi(ticks as i32),
        });
        accumulated += level.count as u64;
        if accumulated >= target as u64 {
            return Some(QualifyingBand { levels: band });
        }
    }

    None
}

/// LIP intensity: resting size at best relative to the target.
pub fn lip_intensity(levels: &[BookLevel], target: u32) -> f64 {
    if target == 0 {
        return 0.0;
    }
    let at_best = levels.first().map(|l| l.count).unwrap_or(0);
    at_best as f64 / target as f64
}
