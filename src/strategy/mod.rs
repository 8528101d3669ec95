// =============================================================================
// Signal strategies
// =============================================================================
//
// Each strategy looks at one market per call and may emit a Signal. Strategies
// marked "book-only" (probability-sum, endgame) work straight off the market's
// top of book; the rest need tracker stats or a full orderbook. Signals are
// ephemeral: they expire on their TTL or when the emitting strategy clears
// them after execution.
// =============================================================================

pub mod endgame;
pub mod imbalance;
pub mod manager;
pub mod mean_reversion;
pub mod momentum;
pub mod probability_sum;
pub mod spread_hunter;
pub mod volatility_capture;

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use uuid::Uuid;

use crate::market_data::{OrderBook, PriceStats};
use crate::types::{NormalizedMarket, OrderSide};

pub use endgame::EndgameStrategy;
pub use imbalance::OrderbookImbalanceStrategy;
pub use manager::StrategyManager;
pub use mean_reversion::MeanReversionStrategy;
pub use momentum::MomentumStrategy;
pub use probability_sum::ProbabilitySumStrategy;
pub use spread_hunter::SpreadHunterStrategy;
pub use volatility_capture::VolatilityCaptureStrategy;

/// Default signal lifetime.
pub const SIGNAL_TTL_MS: u64 = 30_000;

// ---------------------------------------------------------------------------
// Signal
// ---------------------------------------------------------------------------

/// A trade recommendation emitted by one strategy for one market.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub id: String,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    /// Strategy conviction in [0, 1].
    pub confidence: f64,
    /// Emitting strategy tag.
    pub strategy: &'static str,
    /// Operator-readable rationale.
    pub reason: String,
    /// Engine-clock timestamps (ms).
    pub created_at_ms: u64,
    pub expires_at_ms: u64,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        market_id: &str,
        outcome_id: &str,
        side: OrderSide,
        price: f64,
        size: f64,
        confidence: f64,
        strategy: &'static str,
        reason: String,
        now_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            market_id: market_id.to_string(),
            outcome_id: outcome_id.to_string(),
            side,
            price,
            size,
            confidence: confidence.clamp(0.0, 1.0),
            strategy,
            reason,
            created_at_ms: now_ms,
            expires_at_ms: now_ms + SIGNAL_TTL_MS,
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at_ms
    }
}

// ---------------------------------------------------------------------------
// Strategy contract
// ---------------------------------------------------------------------------

/// One signal generator.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether `analyze` needs tracker statistics to do anything.
    fn needs_stats(&self) -> bool {
        true
    }

    /// Look at one market and maybe emit a signal.
    fn analyze(
        &self,
        market: &NormalizedMarket,
        stats: Option<&PriceStats>,
        book: Option<&OrderBook>,
        now_ms: u64,
    ) -> Option<Signal>;

    /// Drop the active signal for a market (after execution or expiry).
    fn clear_signal(&self, market_id: &str);

    /// Signals currently held by this strategy.
    fn active_signals(&self) -> Vec<Signal>;
}

// ---------------------------------------------------------------------------
// Shared signal bookkeeping
// ---------------------------------------------------------------------------

/// Per-strategy active-signal index, shared by every strategy impl.
#[derive(Default)]
pub struct SignalBook {
    active: RwLock<HashMap<String, Signal>>,
}

impl SignalBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store and return the signal.
    pub fn put(&self, signal: Signal) -> Signal {
        self.active
            .write()
            .insert(signal.market_id.clone(), signal.clone());
        signal
    }

    pub fn clear(&self, market_id: &str) {
        self.active.write().remove(market_id);
    }

    pub fn all(&self) -> Vec<Signal> {
        self.active.read().values().cloned().collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_confidence_is_clamped() {
        let s = Signal::new(
            "m", "yes", OrderSide::Buy, 0.5, 10.0, 1.7, "test", "r".into(), 0,
        );
        assert_eq!(s.confidence, 1.0);
        let s = Signal::new(
            "m", "yes", OrderSide::Buy, 0.5, 10.0, -0.2, "test", "r".into(), 0,
        );
        assert_eq!(s.confidence, 0.0);
    }

    #[test]
    fn signal_expiry_follows_ttl() {
        let s = Signal::new(
            "m", "yes", OrderSide::Buy, 0.5, 10.0, 0.5, "test", "r".into(), 1_000,
        );
        assert!(!s.is_expired(1_000));
        assert!(!s.is_expired(1_000 + SIGNAL_TTL_MS - 1));
        assert!(s.is_expired(1_000 + SIGNAL_TTL_MS));
    }

    #[test]
    fn signal_book_put_clear() {
        let book = SignalBook::new();
        let s = Signal::new(
            "m", "yes", OrderSide::Buy, 0.5, 10.0, 0.5, "test", "r".into(), 0,
        );
        book.put(s);
        assert_eq!(book.all().len(), 1);
        book.clear("m");
        assert!(book.all().is_empty());
    }
}
