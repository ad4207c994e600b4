//! Exchange client contract for the LIP market-making agent.
//!
//! The exchange is an abstract collaborator: authentication and raw
//! transport live behind [`ExchangeClient`]. Production wires a real
//! transport; tests and paper mode inject [`SimExchange`].

pub mod client;
pub mod error;
pub mod retry;
pub mod sim;
pub mod types;

pub use client::ExchangeClient;
pub use error::{ExchangeError, ExchangeResult};
pub use retry::with_rate_limit_retry;
pub use sim::SimExchange;
pub use types::{
    BookEvent, BookEventKind, BookLevel, BookSnapshot, Candle, FillEvent, MarketInfo, OrderId,
    OrderRequest,
};
