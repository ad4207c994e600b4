//! Market-making strategy for the LIP agent.
//!
//! Decisions in, actions out: every per-market step is a pure function of
//! the book view, risk score, and inventory, and the state machine emits a
//! vector of [`Action`]s per tick that the scheduler executes. Nothing in
//! this crate performs I/O.
//!
//! ```text
//! BookView ─┬─ resolution::detect ── CashOut shortcut
//!           └─ quote::desired_quote ── MarketState::on_tick ── Vec<Action>
//! ```

pub mod band;
pub mod config;
pub mod inventory;
pub mod manager;
pub mod quote;
pub mod resolution;

pub use band::{build_qualifying_band, lip_intensity, BandLevel, QualifyingBand};
pub use config::MakerConfig;
pub use inventory::{InventoryBook, InventoryChange};
pub use manager::{Action, LiveOrder, MarketPhase, MarketState};
pub use quote::{desired_quote, DesiredQuote, QuoteLevel, SkipReason};
pub use resolution::{cashout, detect, CashOut, Resolution, ResolutionCheck};
