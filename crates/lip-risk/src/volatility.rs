//! Realized volatility in logit space with cross-sectional percentiles.
//!
//! σ for a market is the EWMA of absolute one-step logit returns over the
//! last 48 hours of 5-minute midpoint candles. Percentiles are computed
//! cross-sectionally over the tracked universe each refresh and the whole
//! cache is swapped by reference, never partially updated.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use lip_core::{ewma, logit, Ticker};
use lip_exchange::{Candle, ExchangeClient};

/// Volatility engine configuration.
#[derive(Debug, Clone)]
pub struct VolConfig {
    /// Candle lookback window in hours.
    pub lookback_hours: i64,
    /// Candle period in minutes.
    pub candle_period_minutes: u32,
    /// EWMA smoothing for absolute logit returns.
    pub ewma_alpha: f64,
    /// Minimum valid returns; below this σ is the 0 sentinel.
    pub min_returns: usize,
    /// Refresh gate.
    pub refresh_interval: Duration,
    /// Concurrency bound for candle fetches.
    pub max_workers: usize,
}

impl Default for VolConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 48,
            candle_period_minutes: 5,
            ewma_alpha: 0.3,
            min_returns: 8,
            refresh_interval: Duration::from_secs(300),
            max_workers: 5,
        }
    }
}

/// Cached per-ticker volatility.
#[derive(Debug, Clone, Copy)]
pub struct VolEntry {
    /// Raw σ; 0.0 is the insufficient-data sentinel.
    pub sigma: f64,
    /// Cross-sectional percentile in [0, 1]; `None` when excluded from the
    /// distribution (sentinel σ).
    pub percentile: Option<f64>,
}

/// One atomically-swapped generation of the cache.
#[derive(Debug, Default)]
pub struct VolSnapshot {
    pub entries: HashMap<Ticker, VolEntry>,
}

/// Process-wide volatility cache. Readers clone the current `Arc` and never
/// observe a partial update.
#[derive(Default)]
pub struct VolatilityCache {
    snapshot: RwLock<Arc<VolSnapshot>>,
}

impl VolatilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot reference.
    pub fn read(&self) -> Arc<VolSnapshot> {
        self.snapshot.read().clone()
    }

    /// Swap in a new generation.
    pub fn swap(&self, next: Arc<VolSnapshot>) {
        *self.snapshot.write() = next;
    }
}

/// Compute σ from a candle history.
///
/// Closes are taken to logit space; samples pinned at the grid extremes are
/// dropped. Fewer than `min_returns` valid returns yields the 0 sentinel.
pub fn sigma_from_candles(candles: &[Candle], alpha: f64, min_returns: usize) -> f64 {
    let logits: Vec<f64> = candles
        .iter()
        .filter(|c| c.close.is_interior())
        .filter_map(|c| logit(c.close.to_f64()))
        .collect();

    if logits.len() < 2 {
        return 0.0;
    }

    let abs_returns: Vec<f64> = logits.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    if abs_returns.len() < min_returns {
        return 0.0;
    }

    ewma(&abs_returns, alpha).unwrap_or(0.0)
}

/// Rank sigmas cross-sectionally: percentile = rank / (N − 1), ties taking
/// the first index; a single ticker gets 0.
fn percentiles(sigmas: &[(Ticker, f64)]) -> HashMap<Ticker, f64> {
    let mut sorted: Vec<f64> = sigmas.iter().map(|(_, s)| *s).collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let n = sorted.len();
    sigmas
        .iter()
        .map(|(ticker, sigma)| {
            let pct = if n < 2 {
                0.0
            } else {
                let rank = sorted
                    .iter()
                    .position(|s| s == sigma)
                    .unwrap_or(0);
                rank as f64 / (n - 1) as f64
            };
            (ticker.clone(), pct)
        })
        .collect()
}

/// Volatility engine: fetches candles, computes σ, ranks, swaps the cache.
pub struct VolatilityEngine {
    client: Arc<dyn ExchangeClient>,
    cache: Arc<VolatilityCache>,
    config: VolConfig,
    last_refresh: Mutex<Option<Instant>>,
}

impl VolatilityEngine {
    pub fn new(client: Arc<dyn ExchangeClient>, cache: Arc<VolatilityCache>, config: VolConfig) -> Self {
        Self {
            client,
            cache,
            config,
            last_refresh: Mutex::new(None),
        }
    }

    /// Refresh σ and percentiles over `tickers`.
    ///
    /// Returns immediately if the refresh interval has not elapsed. One
    /// ticker's fetch failure excludes it from the distribution without
    /// aborting the batch.
    pub async fn refresh(&self, tickers: &[Ticker], now_ts: i64) {
        {
            let mut last = self.last_refresh.lock();
            if let Some(at) = *last {
                if at.elapsed() < self.config.refresh_interval {
                    return;
                }
            }
            *last = Some(Instant::now());
        }

        if tickers.is_empty() {
            self.cache.swap(Arc::new(VolSnapshot::default()));
            return;
        }

        let start_ts = now_ts - self.config.lookback_hours * 3600;
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut set: JoinSet<(Ticker, Option<f64>)> = JoinSet::new();

        for ticker in tickers.iter().cloned() {
            let client = self.client.clone();
            let semaphore = semaphore.clone();
            let period = self.config.candle_period_minutes;
            let alpha = self.config.ewma_alpha;
            let min_returns = self.config.min_returns;
            set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (ticker, None),
                };
                match client.get_candles(&ticker, start_ts, now_ts, period).await {
                    Ok(candles) => {
                        let sigma = sigma_from_candles(&candles, alpha, min_returns);
                        (ticker, Some(sigma))
                    }
                    Err(e) => {
                        warn!(ticker = %ticker, error = %e, "Candle fetch failed, excluding from ranking");
                        (ticker, None)
                    }
                }
            });
        }

        let mut sigmas: Vec<(Ticker, f64)> = Vec::with_capacity(tickers.len());
        let mut sentinels: Vec<Ticker> = Vec::new();
        while let Some(result) = set.join_next().await {
            match result {
                Ok((ticker, Some(sigma))) if sigma > 0.0 => sigmas.push((ticker, sigma)),
                Ok((ticker, Some(_))) => sentinels.push(ticker),
                Ok((_, None)) => {}
                Err(e) => warn!(error = %e, "Volatility worker panicked"),
            }
        }

        let ranks = percentiles(&sigmas);
        let mut entries: HashMap<Ticker, VolEntry> = HashMap::with_capacity(tickers.len());
        for (ticker, sigma) in &sigmas {
            entries.insert(
                ticker.clone(),
                VolEntry {
                    sigma: *sigma,
                    percentile: ranks.get(ticker).copied(),
                },
            );
        }
        for ticker in sentinels {
            entries.insert(
                ticker,
                VolEntry {
                    sigma: 0.0,
                    percentile: None,
                },
            );
        }

        self.log_summary(&sigmas);
        self.cache.swap(Arc::new(VolSnapshot { entries }));
    }

    fn log_summary(&self, sigmas: &[(Ticker, f64)]) {
        if sigmas.is_empty() {
            debug!("Volatility refresh: no ranked markets");
            return;
        }
        let mut by_sigma: Vec<(Ticker, f64)> = sigmas.to_vec();
        by_sigma.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let values: Vec<f64> = by_sigma.iter().map(|(_, s)| *s).collect();
        let max = values.first().copied().unwrap_or(0.0);
        let min = values.last().copied().unwrap_or(0.0);
        let median = values[values.len() / 2];
        let top: Vec<String> = by_sigma
            .iter()
            .take(5)
            .map(|(t, s)| format!("{t}={s:.4}"))
            .collect();

        info!(
            markets = sigmas.len(),
            min = %format!("{min:.4}"),
            median = %format!("{median:.4}"),
            max = %format!("{max:.4}"),
            top5 = ?top,
            "Volatility refreshed"
        );
    }
}
