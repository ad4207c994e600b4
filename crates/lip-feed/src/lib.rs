//! Order-book state and streaming workers.
//!
//! - [`OrderBook`]: per-market book, mutated only by stream events in
//!   exchange sequence order
//! - [`BookRegistry`]: per-ticker books behind per-ticker locks
//! - [`BookStreamWorker`]: applies snapshot/delta events, resyncs on gaps,
//!   reconnects with backoff, and notifies the scheduler of touch changes
//! - [`FillStreamWorker`]: forwards fill notifications into the scheduler's
//!   queue with identical reconnect semantics

pub mod book;
pub mod book_stream;
pub mod error;
pub mod fill_stream;
pub mod registry;

pub use book::{BookView, OrderBook, Touch};
pub use book_stream::{BookStreamWorker, StreamCommand, TouchUpdate};
pub use error::{FeedError, FeedResult};
pub use fill_stream::FillStreamWorker;
pub use registry::BookRegistry;

/// Reconnect backoff floor: 1 s.
pub const BACKOFF_BASE_MS: u64 = 1_000;
/// Reconnect backoff cap: 30 s.
pub const BACKOFF_MAX_MS: u64 = 30_000;
