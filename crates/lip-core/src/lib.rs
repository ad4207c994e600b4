//! Core domain types for the LIP market-making agent.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Price`: cent-grid decimal price in [0.01, 0.99]
//! - `Ticker`: market identifier
//! - `OrderSide`, `ContractSide`, `TimeInForce`: trading enums
//! - logit/EWMA math used by the volatility engine

pub mod error;
pub mod math;
pub mod price;
pub mod types;

pub use error::{CoreError, Result};
pub use math::{ewma, logit};
pub use price::Price;
pub use types::{ContractSide, OrderSide, Ticker, TimeInForce};
