//! Risk infrastructure for the LIP market-making agent.
//!
//! - [`VolatilityEngine`]: realized-σ from historical candles with a
//!   cross-sectional percentile cache, refreshed on a coarse cadence
//! - [`RiskScorer`]: combines time-to-expiry and volatility percentile
//!   into a scalar risk score
//! - [`CircuitBreaker`]: latching safety gate checked before every order

pub mod breaker;
pub mod scorer;
pub mod volatility;

pub use breaker::{BreakerConfig, BreakerStatus, CircuitBreaker, TripReason};
pub use scorer::{RiskParams, RiskScore, RiskScorer};
pub use volatility::{VolConfig, VolEntry, VolSnapshot, VolatilityCache, VolatilityEngine};
