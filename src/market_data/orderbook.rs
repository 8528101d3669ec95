// =============================================================================
// Book Store — event-sourced orderbooks for both venues
// =============================================================================
//
// Per (platform, market) the store keeps the latest full book. Updates carry a
// monotonic `seq`: an update with seq <= the applied one is discarded, a gap
// (seq > applied + 1) marks the book for resync, and the next snapshot clears
// the flag. Books go stale on venue disconnect and stay stale until the first
// post-reconnect snapshot.
// =============================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::types::{MarketKey, OutcomeSide, Platform};

// ---------------------------------------------------------------------------
// Book model
// ---------------------------------------------------------------------------

/// One price level: `(price, size)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub size: f64,
}

/// One side of the book: bids sorted descending, asks ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookSide {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl BookSide {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    /// Total size across the top `depth` levels of each side:
    /// `(bid_volume, ask_volume)`.
    pub fn top_volumes(&self, depth: usize) -> (f64, f64) {
        let bid: f64 = self.bids.iter().take(depth).map(|l| l.size).sum();
        let ask: f64 = self.asks.iter().take(depth).map(|l| l.size).sum();
        (bid, ask)
    }

    /// Sort bids descending and asks ascending in place.
    pub fn normalize(&mut self) {
        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    }
}

/// Full two-sided book for a binary market.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub market: MarketKey,
    pub yes: BookSide,
    pub no: BookSide,
    /// Venue sequence number; strictly increasing per market.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}

impl OrderBook {
    pub fn side(&self, side: OutcomeSide) -> &BookSide {
        match side {
            OutcomeSide::Yes => &self.yes,
            OutcomeSide::No => &self.no,
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BookEntry {
    book: OrderBook,
    stale: bool,
    needs_resync: bool,
}

/// Outcome of applying one update to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// Update applied; the book moved forward.
    Applied,
    /// Stale or duplicate `seq`; dropped.
    OutOfOrder,
    /// Sequence gap; book flagged for snapshot resync and the delta dropped.
    GapDetected,
}

/// Thread-safe store of the latest book per market.
pub struct BookStore {
    books: RwLock<HashMap<MarketKey, BookEntry>>,
}

impl BookStore {
    pub fn new() -> Self {
        Self {
            books: RwLock::new(HashMap::new()),
        }
    }

    /// Apply a full snapshot. Snapshots always win: they reset the sequence,
    /// clear staleness, and clear any pending resync flag.
    pub fn apply_snapshot(&self, book: OrderBook) {
        let mut books = self.books.write();
        debug!(market = %book.market, seq = book.seq, "book snapshot applied");
        books.insert(
            book.market.clone(),
            BookEntry {
                book,
                stale: false,
                needs_resync: false,
            },
        );
    }

    /// Apply an incremental update (a full replacement book at a new `seq`).
    ///
    /// Ordering contract: per market, applied `seq` values are strictly
    /// increasing; out-of-order updates are discarded and a gap flags the
    /// market for resync.
    pub fn apply_update(&self, book: OrderBook) -> ApplyResult {
        let mut books = self.books.write();

        let entry = match books.get_mut(&book.market) {
            Some(entry) => entry,
            None => {
                // First sight of this market: treat as snapshot.
                books.insert(
                    book.market.clone(),
                    BookEntry {
                        book,
                        stale: false,
                        needs_resync: false,
                    },
                );
                return ApplyResult::Applied;
            }
        };

        if book.seq <= entry.book.seq {
            debug!(
                market = %book.market,
                incoming = book.seq,
                applied = entry.book.seq,
                "out-of-order book update dropped"
            );
            return ApplyResult::OutOfOrder;
        }

        if book.seq > entry.book.seq + 1 {
            warn!(
                market = %book.market,
                incoming = book.seq,
                applied = entry.book.seq,
                "book sequence gap — resync required"
            );
            entry.needs_resync = true;
            return ApplyResult::GapDetected;
        }

        entry.book = book;
        entry.stale = false;
        ApplyResult::Applied
    }

    /// Latest book for a market, if fresh: not disconnect-stale and not past
    /// the top-of-book cache TTL.
    pub fn get(&self, market: &MarketKey) -> Option<OrderBook> {
        let books = self.books.read();
        books
            .get(market)
            .filter(|e| !e.stale)
            .filter(|e| {
                let age_ms = Utc::now()
                    .signed_duration_since(e.book.timestamp)
                    .num_milliseconds();
                age_ms <= crate::types::PRICE_CACHE_TTL_MS as i64
            })
            .map(|e| e.book.clone())
    }

    /// Latest book regardless of staleness.
    pub fn get_any(&self, market: &MarketKey) -> Option<OrderBook> {
        self.books.read().get(market).map(|e| e.book.clone())
    }

    /// Markets flagged for snapshot resync.
    pub fn pending_resyncs(&self) -> Vec<MarketKey> {
        self.books
            .read()
            .iter()
            .filter(|(_, e)| e.needs_resync)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Mark every book on `platform` stale. Called on venue disconnect; the
    /// first snapshot after reconnect un-stales each book.
    pub fn mark_platform_stale(&self, platform: Platform) {
        let mut books = self.books.write();
        let mut count = 0usize;
        for (key, entry) in books.iter_mut() {
            if key.platform == platform {
                entry.stale = true;
                count += 1;
            }
        }
        if count > 0 {
            warn!(%platform, count, "books marked stale after disconnect");
        }
    }

    pub fn len(&self) -> usize {
        self.books.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.books.read().is_empty()
    }
}

impl Default for BookStore {
    fn default() -> Self {
        Self::new()
    }
}
