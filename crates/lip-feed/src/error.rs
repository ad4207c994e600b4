//! Error types for lip-feed.

use lip_core::{Price, Ticker};
use thiserror::Error;

/// Feed error types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    /// A delta arrived out of exchange sequence; the book must be resynced.
    #[error("sequence gap: expected {expected}, got {got}")]
    SequenceGap { expected: u64, got: u64 },

    /// A delta arrived before any snapshot established the side.
    #[error("delta before snapshot")]
    NoSnapshot,

    /// A delta would take a level's resting count negative.
    #[error("negative depth at {price}: have {have}, delta {delta}")]
    NegativeDepth { price: Price, have: u32, delta: i64 },

    /// Event for a ticker with no tracked book.
    #[error("unknown ticker: {0}")]
    UnknownTicker(Ticker),
}

/// Result type alias for feed operations.
pub type FeedResult<T> = Result<T, FeedError>;
