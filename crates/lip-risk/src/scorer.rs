//! Scalar risk score per market.
//!
//! `risk = exp(−k · hours_to_expiry) · (1 + γ · vol_score)` where
//! `vol_score` is the cached cross-sectional percentile, falling back to
//! scaled raw σ, then to zero.

use std::sync::Arc;

use lip_core::Ticker;

use crate::volatility::VolatilityCache;

/// Scoring parameters.
#[derive(Debug, Clone, Copy)]
pub struct RiskParams {
    /// Time decay constant `k`.
    pub time_risk_k: f64,
    /// Volatility weight `γ`.
    pub vol_gamma: f64,
    /// Denominator for the raw-σ fallback: `min(1, σ / scale)`.
    pub fallback_sigma_scale: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        Self {
            time_risk_k: 0.15,
            vol_gamma: 2.0,
            fallback_sigma_scale: 0.5,
        }
    }
}

/// A computed risk score with its components.
#[derive(Debug, Clone, Copy)]
pub struct RiskScore {
    pub value: f64,
    pub time_risk: f64,
    pub vol_score: f64,
}

/// Risk scorer over the shared volatility cache.
pub struct RiskScorer {
    cache: Arc<VolatilityCache>,
    params: RiskParams,
}

impl RiskScorer {
    pub fn new(cache: Arc<VolatilityCache>, params: RiskParams) -> Self {
        Self { cache, params }
    }

    /// Score a market at `now_ts`.
    ///
    /// The cache reference is read exactly once per call; a refresh landing
    /// mid-tick is either fully seen or not seen at all.
    pub fn score(&self, ticker: &Ticker, close_ts: i64, now_ts: i64) -> RiskScore {
        let snapshot = self.cache.read();

        let hours_to_expiry = ((close_ts - now_ts) as f64 / 3600.0).max(0.0);
        let time_risk = (-self.params.time_risk_k * hours_to_expiry).exp();

        let vol_score = match snapshot.entries.get(ticker) {
            Some(entry) => match entry.percentile {
                Some(p) => p,
                None => (entry.sigma / self.params.fallback_sigma_scale).min(1.0),
            },
            None => 0.0,
        };

        RiskScore {
            value: time_risk * (1.0 + self.params.vol_gamma * vol_score),
            time_risk,
            vol_score,
        }
    }
}
