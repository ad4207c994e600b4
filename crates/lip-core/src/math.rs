//! Logit transform and EWMA.
//!
//! Bounded (0, 1) prices are unbounded in logit space, which is the working
//! coordinate for realized-volatility estimation.

/// Log-odds of a probability-price: `ln(p / (1 − p))`.
///
/// Defined only on the open interval (0, 1); returns `None` outside it.
/// Callers filter grid extremes (0.01 / 0.99) before calling: a pinned
/// market carries no volatility information.
pub fn logit(p: f64) -> Option<f64> {
    if p <= 0.0 || p >= 1.0 || !p.is_finite() {
        return None;
    }
    Some((p / (1.0 - p)).ln())
}

/// Exponentially weighted moving average of a finite sequence.
///
/// `y_0 = x_0`, `y_t = alpha * x_t + (1 - alpha) * y_{t-1}`; the result is
/// the last `y`. Returns `None` on an empty sequence or alpha outside (0, 1].
pub fn ewma(xs: &[f64], alpha: f64) -> Option<f64> {
    if xs.is_empty() || alpha <= 0.0 || alpha > 1.0 {
        return None;
    }
    let mut y = xs[0];
    for &x in &xs[1..] {
        y = alpha * x + (1.0 - alpha) * y;
    }
    Some(y)
}
