//! In-memory order book for one binary market.
//!
//! Both contracts quote as bid ladders; asks are synthesized from the
//! complementary side (`yes_ask = 1 − no_bid`). Each side carries its own
//! exchange sequence number: a snapshot establishes the baseline, deltas
//! must arrive in strict `seq + 1` order, anything else is discarded and
//! the owner resyncs from a fresh snapshot.

use std::collections::BTreeMap;

use lip_core::{ContractSide, Price};
use lip_exchange::{BookLevel, BookSnapshot};
use rust_decimal::Decimal;

use crate::error::{FeedError, FeedResult};

/// Best bid / best ask pair with resting sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Touch {
    pub bid: Price,
    pub bid_size: u32,
    pub ask: Price,
    pub ask_size: u32,
}

impl Touch {
    /// `best_ask − best_bid`; zero or negative books occur near resolution.
    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}

/// Read-side copy of a book taken under the lock and then released.
///
/// Levels are best-first: bids descending, asks ascending.
#[derive(Debug, Clone, Default)]
pub struct BookView {
    pub yes_bids: Vec<BookLevel>,
    pub yes_asks: Vec<BookLevel>,
}

impl BookView {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.yes_bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.yes_asks.first().copied()
    }

    pub fn touch(&self) -> Option<Touch> {
        let bid = self.best_bid()?;
        let ask = self.best_ask()?;
        Some(Touch {
            bid: bid.price,
            bid_size: bid.count,
            ask: ask.price,
            ask_size: ask.count,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.yes_bids.is_empty() && self.yes_asks.is_empty()
    }
}

#[derive(Debug, Default)]
struct BookSide {
    levels: BTreeMap<Price, u32>,
    /// Last applied exchange sequence; `None` until the first snapshot.
    seq: Option<u64>,
}

impl BookSide {
    fn replace(&mut self, levels: &[BookLevel], seq: u64) {
        self.levels.clear();
        for level in levels {
            if level.count > 0 {
                *self.levels.entry(level.price).or_insert(0) += level.count;
            }
        }
        self.seq = Some(seq);
    }

    fn apply_delta(&mut self, price: Price, delta: i64, seq: u64) -> FeedResult<()> {
        let expected = match self.seq {
            Some(last) => last + 1,
            None => return Err(FeedError::NoSnapshot),
        };
        if seq != expected {
            return Err(FeedError::SequenceGap { expected, got: seq });
        }

        let have = self.levels.get(&price).copied().unwrap_or(0);
        let next = have as i64 + delta;
        if next < 0 {
            return Err(FeedError::NegativeDepth { price, have, delta });
        }
        if next == 0 {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, next as u32);
        }
        self.seq = Some(seq);
        Ok(())
    }

    /// Highest-priced level with resting count.
    fn best(&self) -> Option<(Price, u32)> {
        self.levels.iter().next_back().map(|(p, c)| (*p, *c))
    }
}

/// Order book for one market.
#[derive(Debug, Default)]
pub struct OrderBook {
    yes: BookSide,
    no: BookSide,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn side_mut(&mut self, side: ContractSide) -> &mut BookSide {
        match side {
            ContractSide::Yes => &mut self.yes,
            ContractSide::No => &mut self.no,
        }
    }

    /// Replace an entire side from a stream snapshot.
    pub fn apply_snapshot(&mut self, side: ContractSide, levels: &[BookLevel], seq: u64) {
        self.side_mut(side).replace(levels, seq);
    }

    /// Apply a signed adjustment at one price, in sequence.
    pub fn apply_delta(
        &mut self,
        side: ContractSide,
        price: Price,
        delta: i64,
        seq: u64,
    ) -> FeedResult<()> {
        self.side_mut(side).apply_delta(price, delta, seq)
    }

    /// Rebuild both sides from a REST snapshot after a gap.
    ///
    /// `baseline_seq` adopts the offending event's sequence so the stream's
    /// subsequent deltas resume cleanly; the offending event itself is
    /// superseded by the snapshot.
    pub fn resync(&mut self, snapshot: &BookSnapshot, side: ContractSide, baseline_seq: u64) {
        match side {
            ContractSide::Yes => self.yes.replace(&snapshot.yes_bids, baseline_seq),
            ContractSide::No => self.no.replace(&snapshot.no_bids, baseline_seq),
        }
    }

    /// Best YES bid (max price with resting count).
    pub fn best_yes_bid(&self) -> Option<(Price, u32)> {
        self.yes.best()
    }

    /// Best NO bid.
    pub fn best_no_bid(&self) -> Option<(Price, u32)> {
        self.no.best()
    }

    /// Best YES ask, synthesized as `1 − best_no_bid`.
    pub fn best_yes_ask(&self) -> Option<(Price, u32)> {
        self.no.best().map(|(p, c)| (p.complement(), c))
    }

    /// Current touch, if both sides are quoted.
    pub fn touch(&self) -> Option<Touch> {
        let (bid, bid_size) = self.best_yes_bid()?;
        let (ask, ask_size) = self.best_yes_ask()?;
        Some(Touch {
            bid,
            bid_size,
            ask,
            ask_size,
        })
    }

    /// Snapshot copy for readers: YES bids best-first, synthesized YES asks
    /// best-first.
    pub fn view(&self) -> BookView {
        let yes_bids = self
            .yes
            .levels
            .iter()
            .rev()
            .map(|(p, c)| BookLevel {
                price: *p,
                count: *c,
            })
            .collect();
        // NO bids descending map to YES asks ascending.
        let yes_asks = self
            .no
            .levels
            .iter()
            .rev()
            .map(|(p, c)| BookLevel {
                price: p.complement(),
                count: *c,
            })
            .collect();
        BookView { yes_bids, yes_asks }
    }
}
