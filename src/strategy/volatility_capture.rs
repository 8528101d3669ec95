// =============================================================================
// Volatility-Capture Strategy — fade sharp drops inside an event window
// =============================================================================
//
// Fed significant-move events by the strategy manager. For two minutes after
// a sharp drop, the dropped outcome tends to overshoot; this strategy buys it
// expecting reversion. Upward spikes are ignored — chasing them is momentum's
// job.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::market_data::{OrderBook, PriceStats, SignificantMove};
use crate::strategy::{Signal, SignalBook, Strategy};
use crate::types::{NormalizedMarket, OrderSide};

/// How long after a significant move the entry stays valid.
const EVENT_WINDOW_MS: u64 = 120_000;

pub struct VolatilityCaptureStrategy {
    /// Latest qualifying move per market.
    moves: RwLock<HashMap<String, SignificantMove>>,
    signals: SignalBook,
}

impl VolatilityCaptureStrategy {
    pub fn new() -> Self {
        Self {
            moves: RwLock::new(HashMap::new()),
            signals: SignalBook::new(),
        }
    }

    /// Record a significant move pushed by the price tracker.
    pub fn note_move(&self, event: SignificantMove) {
        self.moves.write().insert(event.market_id.clone(), event);
    }

    /// Whether a market has a move still inside the event window. The
    /// strategy manager uses this to bypass the signal cooldown.
    pub fn has_fresh_move(&self, market_id: &str, now_ms: u64) -> bool {
        self.moves
            .read()
            .get(market_id)
            .map(|m| now_ms.saturating_sub(m.at_ms) <= EVENT_WINDOW_MS)
            .unwrap_or(false)
    }
}

impl Default for VolatilityCaptureStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for VolatilityCaptureStrategy {
    fn name(&self) -> &'static str {
        "volatility_capture"
    }

    fn needs_stats(&self) -> bool {
        false
    }

    fn analyze(
        &self,
        market: &NormalizedMarket,
        _stats: Option<&PriceStats>,
        _book: Option<&OrderBook>,
        now_ms: u64,
    ) -> Option<Signal> {
        if !market.is_active {
            return None;
        }

        let event = {
            let moves = self.moves.read();
            moves.get(&market.key.external_id).cloned()?
        };
        if now_ms.saturating_sub(event.at_ms) > EVENT_WINDOW_MS {
            self.moves.write().remove(&market.key.external_id);
            return None;
        }
        // Only fade drops.
        if event.change_pct >= 0.0 {
            return None;
        }

        let yes = market.yes()?;
        if yes.best_ask <= 0.0 || yes.ask_size <= 0.0 {
            return None;
        }

        // Harder drops revert harder; 10%+ is full conviction.
        let confidence = (event.change_pct.abs() / 10.0).clamp(0.3, 1.0);
        let signal = Signal::new(
            &market.key.external_id,
            &yes.external_id,
            OrderSide::Buy,
            yes.best_ask,
            yes.ask_size,
            confidence,
            self.name(),
            format!(
                "fading {:.1}% drop ({:.3} -> {:.3}) inside event window",
                event.change_pct, event.from_price, event.to_price
            ),
            now_ms,
        );
        Some(self.signals.put(signal))
    }

    fn clear_signal(&self, market_id: &str) {
        self.signals.clear(market_id);
    }

    fn active_signals(&self) -> Vec<Signal> {
        self.signals.all()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MarketKey, MarketStatus, Outcome, OutcomeSide, Platform};

    fn market() -> NormalizedMarket {
        NormalizedMarket {
            key: MarketKey::new(Platform::Polymarket, "m1"),
            title: "T".into(),
            description: String::new(),
            category: String::new(),
            status: MarketStatus::Active,
            end_date: None,
            is_active: true,
            volume_24h: 0.0,
            liquidity: 0.0,
            outcomes: vec![Outcome {
                external_id: "y".into(),
                name: "Yes".into(),
                side: OutcomeSide::Yes,
                probability: 0.45,
                best_bid: 0.44,
                best_ask: 0.46,
                bid_size: 100.0,
                ask_size: 150.0,
            }],
        }
    }

    fn drop_event(at_ms: u64) -> SignificantMove {
        SignificantMove {
            market_id: "m1".into(),
            from_price: 0.52,
            to_price: 0.46,
            change_pct: -11.5,
            at_ms,
        }
    }

    #[test]
    fn drop_inside_window_gets_bought() {
        let strategy = VolatilityCaptureStrategy::new();
        strategy.note_move(drop_event(1_000));
        let signal = strategy.analyze(&market(), None, None, 30_000).unwrap();
        assert_eq!(signal.side, OrderSide::Buy);
        assert_eq!(signal.confidence, 1.0); // 11.5% drop saturates
        assert!(strategy.has_fresh_move("m1", 30_000));
    }

    #[test]
    fn stale_event_is_dropped() {
        let strategy = VolatilityCaptureStrategy::new();
        strategy.note_move(drop_event(1_000));
        // Past the two-minute window.
        assert!(strategy
            .analyze(&market(), None, None, 1_000 + EVENT_WINDOW_MS + 1)
            .is_none());
        assert!(!strategy.has_fresh_move("m1", 1_000 + EVENT_WINDOW_MS + 1));
    }

    #[test]
    fn upward_spikes_are_ignored() {
        let strategy = VolatilityCaptureStrategy::new();
        let mut event = drop_event(1_000);
        event.change_pct = 8.0;
        strategy.note_move(event);
        assert!(strategy.analyze(&market(), None, None, 2_000).is_none());
    }

    #[test]
    fn no_event_means_no_signal() {
        let strategy = VolatilityCaptureStrategy::new();
        assert!(strategy.analyze(&market(), None, None, 0).is_none());
        assert!(!strategy.has_fresh_move("m1", 0));
    }
}
