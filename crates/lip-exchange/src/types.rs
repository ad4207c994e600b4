//! Wire types shared with the exchange.

use lip_core::{ContractSide, OrderSide, Price, Ticker, TimeInForce};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-assigned order identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A market from the liquidity-program universe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketInfo {
    pub ticker: Ticker,
    /// YES close time, unix seconds.
    pub close_ts: i64,
    /// Contracts that must rest at best to qualify for the rebate.
    pub lip_target: u32,
    /// Best YES bid if the side is quoted.
    pub yes_bid: Option<Price>,
    /// Best NO bid if the side is quoted.
    pub no_bid: Option<Price>,
    /// Historical-toxicity flag from the universe endpoint.
    #[serde(default)]
    pub toxic: bool,
}

/// Midpoint candle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Candle {
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    /// Candle open time, unix seconds.
    pub ts: i64,
}

/// One resting level of a book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub count: u32,
}

/// Full book snapshot: bid ladders of both contracts.
///
/// Asks are not quoted directly; the YES ask is synthesized from the best
/// NO bid as `1 − no_bid`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub yes_bids: Vec<BookLevel>,
    pub no_bids: Vec<BookLevel>,
}

/// Streamed order-book message.
#[derive(Debug, Clone)]
pub struct BookEvent {
    pub ticker: Ticker,
    pub side: ContractSide,
    /// Exchange-provided sequence number, monotonic per (ticker, side).
    pub seq: u64,
    pub kind: BookEventKind,
}

/// Payload of a book message.
#[derive(Debug, Clone)]
pub enum BookEventKind {
    /// Replace the entire side.
    Snapshot(Vec<BookLevel>),
    /// Signed adjustment at one price.
    Delta { price: Price, delta: i64 },
}

/// Streamed fill notification.
///
/// Delivery is at-least-once; `(order_id, fill_index)` deduplicates retries.
#[derive(Debug, Clone)]
pub struct FillEvent {
    pub ticker: Ticker,
    pub order_id: OrderId,
    pub side: OrderSide,
    pub price: Price,
    pub count: u32,
    /// Fill time, unix seconds.
    pub ts: i64,
    /// Monotonically-increasing index within the order.
    pub fill_index: u64,
}

/// Order submission request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub ticker: Ticker,
    pub side: OrderSide,
    pub price: Price,
    pub count: u32,
    pub tif: TimeInForce,
}
