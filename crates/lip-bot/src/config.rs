//! Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lip_mm::MakerConfig;
use lip_risk::{BreakerConfig, RiskParams, VolConfig};

use crate::error::{AppError, AppResult};

/// Run mode: which exchange client backs the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Simulated in-memory venue.
    #[default]
    Paper,
    /// Real exchange transport, wired by the embedding deployment.
    Live,
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: RunMode,
    /// Main loop period, seconds.
    pub dt: f64,
    /// Concurrency cap on tracked markets.
    pub max_markets_with_orders: usize,
    /// Discovery cadence, seconds.
    pub discovery_interval_seconds: u64,
    /// Per-market reactive-ask throttle, milliseconds.
    pub orderbook_update_cooldown_ms: u64,
    /// Circuit-breaker status file.
    pub status_path: PathBuf,
    pub maker: MakerConfig,
    pub risk: RiskConfig,
    pub circuit: CircuitConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Paper,
            dt: 1.0,
            max_markets_with_orders: 20,
            discovery_interval_seconds: 10,
            orderbook_update_cooldown_ms: 500,
            status_path: PathBuf::from("circuit_breaker_status.json"),
            maker: MakerConfig::default(),
            risk: RiskConfig::default(),
            circuit: CircuitConfig::default(),
        }
    }
}

/// Risk scoring and volatility refresh parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Time decay constant `k`.
    pub lip_time_risk_k: f64,
    /// Volatility weight `γ`.
    pub lip_vol_gamma: f64,
    /// Volatility refresh cadence, seconds.
    pub lip_vol_refresh_interval: u64,
    /// Candle lookback, hours.
    pub vol_lookback_hours: i64,
    /// EWMA smoothing for absolute logit returns.
    pub vol_ewma_alpha: f64,
    /// Worker-pool bound for candle fetches.
    pub vol_max_workers: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            lip_time_risk_k: 0.15,
            lip_vol_gamma: 2.0,
            lip_vol_refresh_interval: 300,
            vol_lookback_hours: 48,
            vol_ewma_alpha: 0.3,
            vol_max_workers: 5,
        }
    }
}

impl RiskConfig {
    pub fn risk_params(&self) -> RiskParams {
        RiskParams {
            time_risk_k: self.lip_time_risk_k,
            vol_gamma: self.lip_vol_gamma,
            ..Default::default()
        }
    }

    pub fn vol_config(&self) -> VolConfig {
        VolConfig {
            lookback_hours: self.vol_lookback_hours,
            ewma_alpha: self.vol_ewma_alpha,
            refresh_interval: Duration::from_secs(self.lip_vol_refresh_interval),
            max_workers: self.vol_max_workers,
            ..Default::default()
        }
    }
}

/// Circuit-breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitConfig {
    pub max_consecutive_errors: u32,
    pub pnl_threshold: f64,
    pub max_inventory_imbalance: f64,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 10,
            pnl_threshold: -100.0,
            max_inventory_imbalance: 0.9,
        }
    }
}

impl AppConfig {
    /// Load configuration: `LIP_CONFIG` env var or `config/default.toml`,
    /// falling back to defaults when no file exists.
    pub fn load() -> AppResult<Self> {
        let path =
            std::env::var("LIP_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;
        toml::from_str(&content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Breaker config with the status file attached.
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            max_consecutive_errors: self.circuit.max_consecutive_errors,
            pnl_threshold: self.circuit.pnl_threshold,
            max_inventory_imbalance: self.circuit.max_inventory_imbalance,
            status_path: Some(self.status_path.clone()),
        }
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.dt.max(0.01))
    }
}
