// =============================================================================
// Spread-Hunter Strategy — work wide but liquid quotes
// =============================================================================
//
// Targets markets quoting a 2–15% spread with enough, but not excessive,
// top-of-book liquidity. Only runs when ask_yes + ask_no > 1: below 1 the
// probability-sum strategy owns the market.
// =============================================================================

use crate::market_data::{OrderBook, PriceStats};
use crate::strategy::{Signal, SignalBook, Strategy};
use crate::types::{NormalizedMarket, OrderSide};

#[derive(Debug, Clone, Copy)]
pub struct SpreadHunterParams {
    pub min_spread_pct: f64,
    pub max_spread_pct: f64,
    pub min_depth: f64,
    pub max_depth: f64,
}

impl Default for SpreadHunterParams {
    fn default() -> Self {
        Self {
            min_spread_pct: 2.0,
            max_spread_pct: 15.0,
            min_depth: 50.0,
            max_depth: 5_000.0,
        }
    }
}

pub struct SpreadHunterStrategy {
    params: SpreadHunterParams,
    signals: SignalBook,
}

impl SpreadHunterStrategy {
    pub fn new(params: SpreadHunterParams) -> Self {
        Self {
            params,
            signals: SignalBook::new(),
        }
    }
}

impl Default for SpreadHunterStrategy {
    fn default() -> Self {
        Self::new(SpreadHunterParams::default())
    }
}

impl Strategy for SpreadHunterStrategy {
    fn name(&self) -> &'static str {
        "spread_hunter"
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

        // Sums below 1 belong to the probability-sum strategy.
        if yes.best_ask + no.best_ask <= 1.0 {
            return None;
        }

        // The cheaper side carries the better expected entry.
        let target = if yes.best_ask <= no.best_ask { yes } else { no };
        if target.best_bid <= 0.0 || target.best_ask <= 0.0 {
            return None;
        }

        let mid = (target.best_bid + target.best_ask) / 2.0;
        let spread_pct = (target.best_ask - target.best_bid) / mid * 100.0;
        if spread_pct < self.params.min_spread_pct || spread_pct > self.params.max_spread_pct {
            return None;
        }

        let depth = target.bid_size.min(target.ask_size);
        if depth < self.params.min_depth || depth > self.params.max_depth {
            return None;
        }

        // Rest inside the spread, one tick above the bid.
        let entry = crate::math::round_to_tick(target.best_bid + 0.01, 0.01);
        let confidence = (spread_pct / self.params.max_spread_pct).clamp(0.2, 0.9);
        let signal = Signal::new(
            &market.key.external_id,
            &target.external_id,
            OrderSide::Buy,
            entry,
            depth,
            confidence,
            self.name(),
            format!(
                "{} spread {:.1}% ({:.3}/{:.3}), depth {:.0}",
                target.side, spread_pct, target.best_bid, target.best_ask, depth
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
