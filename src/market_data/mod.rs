pub mod orderbook;
pub mod price_history;

pub use orderbook::{BookLevel, BookSide, BookStore, OrderBook};
pub use price_history::{PriceHistoryTracker, PricePoint, PriceStats, SignificantMove};
