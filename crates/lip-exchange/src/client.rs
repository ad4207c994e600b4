//! The abstract exchange client.

use async_trait::async_trait;
use lip_core::Ticker;
use tokio::sync::mpsc;

use crate::error::ExchangeResult;
use crate::types::{BookEvent, BookSnapshot, Candle, FillEvent, MarketInfo, OrderId, OrderRequest};

/// Exchange contract: REST-style calls plus streaming subscriptions.
///
/// Implementations own authentication and transport. All calls must apply
/// their own timeouts (10 s default) and surface a timeout as
/// [`crate::ExchangeError::TransportTimeout`].
///
/// Subscriptions hand back a bounded receiver; a closed receiver means the
/// underlying stream disconnected and the consumer should resubscribe with
/// backoff.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Submit a limit order. Returns the exchange order id.
    async fn place_order(&self, req: OrderRequest) -> ExchangeResult<OrderId>;

    /// Cancel a resting order. `NotFound` means the order is already gone.
    async fn cancel_order(&self, order_id: &OrderId) -> ExchangeResult<()>;

    /// Fetch a full book snapshot.
    async fn get_orderbook(&self, ticker: &Ticker) -> ExchangeResult<BookSnapshot>;

    /// Fetch midpoint candles over `[start_ts, end_ts]` at `period_minutes`.
    async fn get_candles(
        &self,
        ticker: &Ticker,
        start_ts: i64,
        end_ts: i64,
        period_minutes: u32,
    ) -> ExchangeResult<Vec<Candle>>;

    /// Fetch the universe of open liquidity-program markets.
    async fn get_valid_markets(&self) -> ExchangeResult<Vec<MarketInfo>>;

    /// Fetch the current LIP target size for one market.
    async fn get_lip_target(&self, ticker: &Ticker) -> ExchangeResult<u32>;

    /// Subscribe to the orderbook channel for the given tickers.
    async fn subscribe_orderbook(
        &self,
        tickers: &[Ticker],
    ) -> ExchangeResult<mpsc::Receiver<BookEvent>>;

    /// Subscribe to fill notifications for the given tickers.
    async fn subscribe_fills(
        &self,
        tickers: &[Ticker],
    ) -> ExchangeResult<mpsc::Receiver<FillEvent>>;
}
