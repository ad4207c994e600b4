//! Exchange error taxonomy.

use thiserror::Error;

/// Errors surfaced by the exchange client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("transport timeout")]
    TransportTimeout,

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("authentication expired")]
    AuthExpired,

    #[error("order rejected: {reason}")]
    OrderRejected { reason: String },

    #[error("not found")]
    NotFound,

    #[error("rate limited")]
    RateLimited,

    #[error("stream gap: {0}")]
    StreamGap(String),

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("internal exchange error: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Transient transport failures: count toward the breaker's consecutive
    /// error counter and are retried next tick.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout | Self::TransportUnavailable(_) | Self::RateLimited
        )
    }

    /// Failures that trip the breaker immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthExpired | Self::InsufficientBalance | Self::Internal(_)
        )
    }
}

/// Result alias for exchange operations.
pub type ExchangeResult<T> = Result<T, ExchangeError>;
