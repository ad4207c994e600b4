//! Circuit breaker.
//!
//! A latch that, once tripped, forbids new order placements until an
//! external reset (restart). Cancels remain permitted so the agent can
//! withdraw its resting quotes. Status is persisted as a single JSON
//! object on every state change.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use lip_exchange::ExchangeError;

/// Reason the breaker tripped.
#[derive(Debug, Clone, PartialEq)]
pub enum TripReason {
    /// Consecutive transient API errors reached the limit.
    ConsecutiveErrors { count: u32 },
    /// Total PnL fell below the configured floor.
    PnlBelowThreshold { pnl: f64 },
    /// A market's inventory imbalance exceeded the limit.
    InventoryImbalance { ratio: f64 },
    /// A fatal exchange error (auth, balance, internal).
    Fatal { error: String },
}

impl std::fmt::Display for TripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConsecutiveErrors { count } => write!(f, "consecutive errors: {count}"),
            Self::PnlBelowThreshold { pnl } => write!(f, "pnl below threshold: {pnl:.2}"),
            Self::InventoryImbalance { ratio } => {
                write!(f, "inventory imbalance: {:.0}%", ratio * 100.0)
            }
            Self::Fatal { error } => write!(f, "fatal: {error}"),
        }
    }
}

/// Breaker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub max_consecutive_errors: u32,
    pub pnl_threshold: f64,
    pub max_inventory_imbalance: f64,
    /// Where to persist status; `None` disables persistence (tests).
    #[serde(default)]
    pub status_path: Option<PathBuf>,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_errors: 10,
            pnl_threshold: -100.0,
            max_inventory_imbalance: 0.9,
            status_path: None,
        }
    }
}

/// Persisted breaker status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub is_open: bool,
    pub trip_reason: Option<String>,
    pub trip_ts: Option<i64>,
}

/// Latching safety gate.
///
/// Thread-safe; shared as `Arc<CircuitBreaker>`. All components check
/// [`CircuitBreaker::is_tripped`] before initiating a placement.
pub struct CircuitBreaker {
    config: BreakerConfig,
    tripped: AtomicBool,
    tripped_at: AtomicI64,
    consecutive_errors: AtomicU32,
    reason: RwLock<Option<TripReason>>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            tripped: AtomicBool::new(false),
            tripped_at: AtomicI64::new(0),
            consecutive_errors: AtomicU32::new(0),
            reason: RwLock::new(None),
        }
    }

    /// True once tripped; no placements may be issued.
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<TripReason> {
        if self.is_tripped() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::SeqCst)
    }

    /// A successful API call resets the consecutive-error counter.
    pub fn record_success(&self) {
        self.consecutive_errors.store(0, Ordering::SeqCst);
    }

    /// Classify and record an API error.
    ///
    /// Fatal errors trip immediately. Transient transport errors count
    /// toward the consecutive limit. Rejections and not-found leave the
    /// counter untouched.
    pub fn record_error(&self, err: &ExchangeError) {
        if err.is_fatal() {
            self.trip(TripReason::Fatal {
                error: err.to_string(),
            });
            return;
        }
        if !err.is_transient() {
            return;
        }
        let count = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= self.config.max_consecutive_errors {
            self.trip(TripReason::ConsecutiveErrors { count });
        }
    }

    /// Trip if total PnL fell below the floor.
    pub fn check_pnl(&self, pnl: f64) {
        if pnl < self.config.pnl_threshold {
            self.trip(TripReason::PnlBelowThreshold { pnl });
        }
    }

    /// Trip if a market's `|inventory| / max_position` exceeds the limit.
    pub fn check_imbalance(&self, inventory: i64, max_position: u32) {
        if max_position == 0 {
            return;
        }
        let ratio = inventory.unsigned_abs() as f64 / max_position as f64;
        if ratio > self.config.max_inventory_imbalance {
            self.trip(TripReason::InventoryImbalance { ratio });
        }
    }

    /// Trip the breaker. Idempotent: the first reason wins.
    pub fn trip(&self, reason: TripReason) {
        if self
            .tripped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let now = chrono::Utc::now().timestamp();
            self.tripped_at.store(now, Ordering::SeqCst);
            *self.reason.write() = Some(reason.clone());
            error!(reason = %reason, "CIRCUIT BREAKER TRIPPED");
            self.persist();
        } else {
            warn!(new_reason = %reason, "Breaker already tripped, keeping original reason");
        }
    }

    /// Manual reset. Never called on a timer; restart-scale intervention.
    pub fn reset(&self) {
        if self.tripped.swap(false, Ordering::SeqCst) {
            let previous = self.reason.write().take();
            self.tripped_at.store(0, Ordering::SeqCst);
            self.consecutive_errors.store(0, Ordering::SeqCst);
            info!(previous_reason = ?previous, "Circuit breaker manually reset");
            self.persist();
        }
    }

    /// Current status object.
    pub fn status(&self) -> BreakerStatus {
        let tripped = self.is_tripped();
        BreakerStatus {
            is_open: tripped,
            trip_reason: self.reason().map(|r| r.to_string()),
            trip_ts: if tripped {
                Some(self.tripped_at.load(Ordering::SeqCst))
            } else {
                None
            },
        }
    }

    /// Write status to disk. Best effort: a failed write must never take
    /// the trading loop down.
    pub fn persist(&self) {
        let Some(path) = self.config.status_path.as_ref() else {
            return;
        };
        match serde_json::to_vec_pretty(&self.status()) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(path, bytes) {
                    warn!(path = %path.display(), error = %e, "Failed to persist breaker status");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize breaker status"),
        }
    }
}
