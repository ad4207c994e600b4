//! Cent-grid prices.
//!
//! Binary contracts trade on the discrete grid {0.01, ..., 0.99} with a
//! fixed tick of one cent. `Price` wraps `rust_decimal::Decimal` so cent
//! arithmetic is exact; any value entering the system goes through
//! [`Price::to_tick`], which rounds half-up to cents and clamps to the grid.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Sub;
use std::str::FromStr;

use crate::error::CoreError;

/// A price on the cent grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Lowest valid price: one cent.
    pub const MIN: Self = Self(Decimal::from_parts(1, 0, 0, false, 2));
    /// Highest valid price: ninety-nine cents.
    pub const MAX: Self = Self(Decimal::from_parts(99, 0, 0, false, 2));
    /// One tick: one cent.
    pub const TICK: Self = Self(Decimal::from_parts(1, 0, 0, false, 2));

    /// Round to the nearest cent (half-up) and clamp to [0.01, 0.99].
    pub fn to_tick(value: Decimal) -> Self {
        let rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self(rounded.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// Construct from whole cents, clamped to the grid.
    pub fn from_cents(cents: i64) -> Self {
        let clamped = cents.clamp(1, 99);
        Self(Decimal::new(clamped, 2))
    }

    /// Price in whole cents (1..=99).
    pub fn cents(&self) -> i64 {
        (self.0 * Decimal::ONE_HUNDRED)
            .round()
            .try_into()
            .unwrap_or(1)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Price as f64 dollars, for logit-space math.
    pub fn to_f64(&self) -> f64 {
        // Grid prices are exact 2-dp decimals; cents/100 is lossless here.
        self.cents() as f64 / 100.0
    }

    /// Complementary price of the opposite contract: `1 − p`.
    ///
    /// The complement of a grid price is always a grid price.
    pub fn complement(&self) -> Self {
        Self(Decimal::ONE - self.0)
    }

    /// Whole ticks between this price and another.
    pub fn ticks_from(&self, other: Price) -> u32 {
        let diff = (self.0 - other.0).abs();
        ((diff / Self::TICK.0).round())
            .try_into()
            .unwrap_or(u32::MAX)
    }

    /// Move down by `n` ticks, clamped to the grid floor.
    pub fn minus_ticks(&self, n: u32) -> Self {
        let moved = self.0 - Self::TICK.0 * Decimal::from(n);
        Self(moved.max(Self::MIN.0))
    }

    /// Move up by `n` ticks, clamped to the grid ceiling.
    pub fn plus_ticks(&self, n: u32) -> Self {
        let moved = self.0 + Self::TICK.0 * Decimal::from(n);
        Self(moved.min(Self::MAX.0))
    }

    /// True when strictly inside the grid: logit is defined here.
    pub fn is_interior(&self) -> bool {
        *self > Self::MIN && *self < Self::MAX
    }

    /// True when a resting quote at this price would be degenerate
    /// (outside [0.02, 0.98]).
    pub fn is_extreme_quote(&self) -> bool {
        self.cents() < 2 || self.cents() > 98
    }

    /// Midpoint of two prices, snapped to the grid.
    pub fn midpoint(a: Price, b: Price) -> Self {
        Self::to_tick((a.0 + b.0) / Decimal::TWO)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Price {
    type Err = CoreError;

    /// Strict parse for external input: values off the grid range are an
    /// error rather than silently clamped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Decimal = s.parse()?;
        if value < Self::MIN.0 || value > Self::MAX.0 {
            return Err(CoreError::InvalidPrice(s.to_string()));
        }
        Ok(Self::to_tick(value))
    }
}

impl Sub for Price {
    type Output = Decimal;

    fn sub(self, rhs: Self) -> Decimal {
        self.0 - rhs.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_tick_rounds_half_up() {
        assert_eq!(Price::to_tick(dec!(0.234)), Price::from_cents(23));
        assert_eq!(Price::to_tick(dec!(0.235)), Price::from_cents(24));
        assert_eq!(Price::to_tick(dec!(0.455)), Price::from_cents(46));
    }

    #[test]
    fn test_to_tick_clamps() {
        assert_eq!(Price::to_tick(dec!(0.004)), Price::MIN);
        assert_eq!(Price::to_tick(dec!(0.0)), Price::MIN);
        assert_eq!(Price::to_tick(dec!(0.995)), Price::MAX);
        assert_eq!(Price::to_tick(dec!(1.50)), Price::MAX);
        assert_eq!(Price::to_tick(dec!(-0.10)), Price::MIN);
    }

    #[test]
    fn test_to_tick_idempotent() {
        for cents in 1..=99 {
            let p = Price::from_cents(cents);
            assert_eq!(Price::to_tick(p.inner()), p);
        }
    }

    #[test]
    fn test_cents_round_trip() {
        assert_eq!(Price::to_tick(dec!(0.234)).cents(), 23);
        assert_eq!(Price::to_tick(dec!(0.235)).cents(), 24);
        assert_eq!(Price::to_tick(dec!(0.999)).cents(), 99);
        assert_eq!(Price::to_tick(dec!(0.0001)).cents(), 1);
    }

    #[test]
    fn test_complement_stays_on_grid() {
        let p = Price::from_cents(55);
        assert_eq!(p.complement(), Price::from_cents(45));
        assert_eq!(Price::MIN.complement(), Price::MAX);
        assert_eq!(Price::MAX.complement(), Price::MIN);
    }

    #[test]
    fn test_ticks_from() {
        let a = Price::from_cents(45);
        let b = Price::from_cents(43);
        assert_eq!(a.ticks_from(b), 2);
        assert_eq!(b.ticks_from(a), 2);
        assert_eq!(a.ticks_from(a), 0);
    }

    #[test]
    fn test_tick_moves_clamp() {
        assert_eq!(Price::from_cents(3).minus_ticks(5), Price::MIN);
        assert_eq!(Price::from_cents(97).plus_ticks(5), Price::MAX);
        assert_eq!(Price::from_cents(50).minus_ticks(2), Price::from_cents(48));
        assert_eq!(Price::from_cents(50).plus_ticks(3), Price::from_cents(53));
    }

    #[test]
    fn test_extreme_quote_bounds() {
        assert!(Price::from_cents(1).is_extreme_quote());
        assert!(Price::from_cents(99).is_extreme_quote());
        assert!(!Price::from_cents(2).is_extreme_quote());
        assert!(!Price::from_cents(98).is_extreme_quote());
    }

    #[test]
    fn test_interior() {
        assert!(!Price::MIN.is_interior());
        assert!(!Price::MAX.is_interior());
        assert!(Price::from_cents(2).is_interior());
        assert!(Price::from_cents(50).is_interior());
    }

    #[test]
    fn test_midpoint_snaps() {
        let mid = Price::midpoint(Price::from_cents(45), Price::from_cents(46));
        // 0.455 rounds half-up to 0.46
        assert_eq!(mid, Price::from_cents(46));
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(5).to_string(), "0.05");
        assert_eq!(Price::from_cents(50).to_string(), "0.50");
    }

    #[test]
    fn test_parse_strict_range() {
        assert_eq!("0.45".parse::<Price>().unwrap(), Price::from_cents(45));
        assert_eq!("0.455".parse::<Price>().unwrap(), Price::from_cents(46));
        assert!("1.05".parse::<Price>().is_err());
        assert!("0.001".parse::<Price>().is_err());
        assert!("not-a-price".parse::<Price>().is_err());
    }
}
