// =============================================================================
// Probability-Sum Strategy — buy YES+NO when their asks sum below 1
// =============================================================================
//
// For a binary market the two contracts together pay out exactly 1. When
// ask_yes + ask_no < 1 - 2 * fee, buying both locks the difference in. The
// emitted signal represents the paired buy; size is bounded by the thinner
// ask.
// =============================================================================

use crate::market_data::{OrderBook, PriceStats};
use crate::strategy::{Signal, SignalBook, Strategy};
use crate::types::{NormalizedMarket, OrderSide};
use crate::venue::VenueFees;

/// Full confidence once the discount reaches 5 cents.
const FULL_CONFIDENCE_EDGE: f64 = 0.05;

pub struct ProbabilitySumStrategy {
    signals: SignalBook,
}

impl ProbabilitySumStrategy {
    pub fn new() -> Self {
        Self {
            signals: SignalBook::new(),
        }
    }
}

impl Default for ProbabilitySumStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for ProbabilitySumStrategy {
    fn name(&self) -> &'static str {
        "probability_sum"
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
        if !market.is_active || !market.is_binary() {
            return None;
        }
        let yes = market.yes()?;
        let no = market.no()?;
        if yes.best_ask <= 0.0 || no.best_ask <= 0.0 {
            return None;
        }

        let fee = VenueFees::for_platform(market.key.platform).taker_bps
            / crate::types::BPS_DIVISOR;
        let sum = yes.best_ask + no.best_ask;
        if sum >= 1.0 - 2.0 * fee {
            return None;
        }

        let edge = 1.0 - sum;
        let size = yes.ask_size.min(no.ask_size);
        if size <= 0.0 {
            return None;
        }

        let signal = Signal::new(
            &market.key.external_id,
            &yes.external_id,
            OrderSide::Buy,
            yes.best_ask,
            size,
            edge / FULL_CONFIDENCE_EDGE,
            self.name(),
            format!(
                "ask sum {:.3} < 1; buy YES@{:.3} + NO@{:.3} for {:.3} edge",
                sum, yes.best_ask, no.best_ask, edge
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

    fn market(yes_ask: f64, no_ask: f64, yes_size: f64, no_size: f64) -> NormalizedMarket {
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
            outcomes: vec![
                Outcome {
                    external_id: "y".into(),
                    name: "Yes".into(),
                    side: OutcomeSide::Yes,
                    probability: yes_ask,
                    best_bid: yes_ask - 0.02,
                    best_ask: yes_ask,
                    bid_size: 100.0,
                    ask_size: yes_size,
                },
                Outcome {
                    external_id: "n".into(),
                    name: "No".into(),
                    side: OutcomeSide::No,
                    probability: no_ask,
                    best_bid: no_ask - 0.02,
                    best_ask: no_ask,
                    bid_size: 100.0,
                    ask_size: no_size,
                },
            ],
        }
    }

    #[test]
    fn discounted_sum_emits_buy_both_signal() {
        // asks 0.47 + 0.50 = 0.97 on a zero-fee venue:
        // edge 0.03 => confidence 0.6, size = min depth.
        let strategy = ProbabilitySumStrategy::new();
        let m = market(0.47, 0.50, 1_000.0, 800.0);
        let signal = strategy.analyze(&m, None, None, 0).unwrap();
        assert_eq!(signal.side, OrderSide::Buy);
        assert!((signal.confidence - 0.6).abs() < 1e-9);
        assert_eq!(signal.size, 800.0);
        assert_eq!(signal.strategy, "probability_sum");
        assert_eq!(strategy.active_signals().len(), 1);
    }

    #[test]
    fn fair_sum_is_silent() {
        let strategy = ProbabilitySumStrategy::new();
        let m = market(0.50, 0.50, 100.0, 100.0);
        assert!(strategy.analyze(&m, None, None, 0).is_none());
        let m = market(0.52, 0.50, 100.0, 100.0);
        assert!(strategy.analyze(&m, None, None, 0).is_none());
    }

    #[test]
    fn sum_exactly_at_fee_boundary_is_silent() {
        // Kalshi taker fee is 100 bps per leg: boundary sum = 1 - 0.02.
        let strategy = ProbabilitySumStrategy::new();
        let mut m = market(0.49, 0.49, 100.0, 100.0);
        m.key = MarketKey::new(Platform::Kalshi, "T");
        assert!(strategy.analyze(&m, None, None, 0).is_none());
        // One tick better clears the fee hurdle.
        let mut m = market(0.49, 0.48, 100.0, 100.0);
        m.key = MarketKey::new(Platform::Kalshi, "T");
        assert!(strategy.analyze(&m, None, None, 0).is_some());
    }

    #[test]
    fn deep_discount_caps_confidence_at_one() {
        let strategy = ProbabilitySumStrategy::new();
        let m = market(0.40, 0.40, 100.0, 100.0);
        let signal = strategy.analyze(&m, None, None, 0).unwrap();
        assert_eq!(signal.confidence, 1.0);
    }

    #[test]
    fn inactive_or_empty_markets_are_skipped() {
        let strategy = ProbabilitySumStrategy::new();
        let mut m = market(0.40, 0.40, 100.0, 100.0);
        m.is_active = false;
        assert!(strategy.analyze(&m, None, None, 0).is_none());
        let m = market(0.40, 0.40, 0.0, 100.0);
        assert!(strategy.analyze(&m, None, None, 0).is_none());
    }
}
