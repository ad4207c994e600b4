//! Maker configuration.

use serde::{Deserialize, Serialize};

/// Quote policy and state machine parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MakerConfig {
    /// Absolute inventory cap per market, in contracts.
    pub max_position: u32,
    /// Fraction of the cap at which inventory skew begins.
    pub position_limit_buffer: f64,
    /// Scaling of the inventory skew.
    pub inventory_skew_factor: f64,
    /// Throttle price improvements to one per external touch change.
    pub improve_once_per_touch: bool,
    /// Minimum gap between improvements, seconds.
    pub improve_cooldown_seconds: i64,
    /// Floor for `ask − bid`, in cents.
    pub min_quote_width_cents: u32,
    /// Master switch for risk-based LIP quoting.
    pub lip_enabled: bool,
    /// Band multiplier base per tick away from best.
    pub lip_discount_factor: f64,
    /// Skip markets whose risk score exceeds this.
    pub lip_risk_threshold: f64,
    /// Reserved: coefficient of the superseded continuous tick policy.
    pub lip_risk_alpha: f64,
    /// Join the touch below this risk score.
    pub lip_medium_risk_threshold: f64,
    /// Sit one tick back below this risk score; skip above it.
    pub lip_high_risk_threshold: f64,
}

impl Default for MakerConfig {
    fn default() -> Self {
        Self {
            max_position: 100,
            position_limit_buffer: 0.2,
            inventory_skew_factor: 0.01,
            improve_once_per_touch: true,
            improve_cooldown_seconds: 0,
            min_quote_width_cents: 0,
            lip_enabled: true,
            lip_discount_factor: 0.95,
            lip_risk_threshold: 3.0,
            lip_risk_alpha: 1.0,
            lip_medium_risk_threshold: 1.5,
            lip_high_risk_threshold: 2.5,
        }
    }
}

impl MakerConfig {
    /// Inventory level at which skew begins: the buffer zone is the top
    /// `position_limit_buffer` fraction of the cap.
    pub fn skew_floor(&self) -> u32 {
        ((1.0 - self.position_limit_buffer) * self.max_position as f64).floor() as u32
    }
}
