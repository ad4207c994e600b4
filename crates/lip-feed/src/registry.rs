//! Per-ticker book registry.
//!
//! Books live behind per-ticker mutexes: the stream worker writes, the
//! scheduler reads by taking a [`BookView`] snapshot under the lock and
//! releasing immediately.

use std::sync::Arc;

use dashmap::DashMap;
use lip_core::Ticker;
use parking_lot::Mutex;

use crate::book::{BookView, OrderBook, Touch};

type BookHandle = Arc<Mutex<OrderBook>>;

/// Tracked books, one lock per ticker.
#[derive(Default)]
pub struct BookRegistry {
    books: DashMap<Ticker, BookHandle>,
}

impl BookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty book for a newly tracked ticker.
    pub fn track(&self, ticker: Ticker) {
        self.books
            .entry(ticker)
            .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new())));
    }

    /// Drop the book for an untracked ticker.
    pub fn untrack(&self, ticker: &Ticker) {
        self.books.remove(ticker);
    }

    pub fn contains(&self, ticker: &Ticker) -> bool {
        self.books.contains_key(ticker)
    }

    pub fn get(&self, ticker: &Ticker) -> Option<BookHandle> {
        self.books.get(ticker).map(|entry| entry.clone())
    }

    /// Snapshot copy of a book for decision code.
    pub fn view(&self, ticker: &Ticker) -> Option<BookView> {
        self.get(ticker).map(|book| book.lock().view())
    }

    /// Current touch for a ticker.
    pub fn touch(&self, ticker: &Ticker) -> Option<Touch> {
        self.get(ticker).and_then(|book| book.lock().touch())
    }

    pub fn tickers(&self) -> Vec<Ticker> {
        self.books.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.books.len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lip_core::{ContractSide, Price};
    use lip_exchange::BookLevel;

    #[test]
    fn test_track_view_untrack() {
        let registry = BookRegistry::new();
        let ticker = Ticker::from("MKT-A");

        registry.track(ticker.clone());
        assert!(registry.contains(&ticker));
        assert!(registry.view(&ticker).unwrap().is_empty());

        registry.get(&ticker).unwrap().lock().apply_snapshot(
            ContractSide::Yes,
            &[BookLevel {
                price: Price::from_cents(40),
                count: 10,
            }],
            1,
        );
        assert_eq!(
            registry.view(&ticker).unwrap().best_bid().unwrap().price,
            Price::from_cents(40)
        );

        registry.untrack(&ticker);
        assert!(registry.view(&ticker).is_none());
    }

    #[test]
    fn test_track_is_idempotent() {
        let registry = BookRegistry::new();
        let ticker = Ticker::from("MKT-A");
        registry.track(ticker.clone());
        registry.get(&ticker).unwrap().lock().apply_snapshot(
            ContractSide::Yes,
            &[BookLevel {
                price: Price::from_cents(40),
                count: 10,
            }],
            1,
        );
        // Re-tracking must not wipe the existing book.
        registry.track(ticker.clone());
        assert!(registry.view(&ticker).unwrap().best_bid().is_some());
    }
}
