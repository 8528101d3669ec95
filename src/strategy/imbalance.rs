// =============================================================================
// Orderbook-Imbalance Strategy — lean with lopsided resting depth
// =============================================================================

use crate::market_data::{OrderBook, PriceStats};
use crate::math;
use crate::strategy::{Signal, SignalBook, Strategy};
use crate::types::{NormalizedMarket, OrderSide, OutcomeSide};

#[derive(Debug, Clone, Copy)]
pub struct ImbalanceParams {
    /// Levels per side that count toward the imbalance.
    pub depth: usize,
    /// bid/ask volume ratio that triggers a buy (inverse for sells).
    pub min_imbalance_ratio: f64,
    /// Minimum combined top-of-book volume.
    pub min_total_volume: f64,
    /// Maximum spread as a percent of mid.
    pub max_spread_pct: f64,
}

impl Default for ImbalanceParams {
    fn default() -> Self {
        Self {
            depth: 5,
            min_imbalance_ratio: 1.5,
            min_total_volume: 100.0,
            max_spread_pct: 5.0,
        }
    }
}

pub struct OrderbookImbalanceStrategy {
    params: ImbalanceParams,
    signals: SignalBook,
}

impl OrderbookImbalanceStrategy {
    pub fn new(params: ImbalanceParams) -> Self {
        Self {
            params,
            signals: SignalBook::new(),
        }
    }
}

impl Default for OrderbookImbalanceStrategy {
    fn default() -> Self {
        Self::new(ImbalanceParams::default())
    }
}

impl Strategy for OrderbookImbalanceStrategy {
    fn name(&self) -> &'static str {
        "orderbook_imbalance"
    }

    fn analyze(
        &self,
        market: &NormalizedMarket,
        _stats: Option<&PriceStats>,
        book: Option<&OrderBook>,
        now_ms: u64,
    ) -> Option<Signal> {
        if !market.is_active {
            return None;
        }
        let book = book?;
        let yes_side = book.side(OutcomeSide::Yes);
        let yes = market.yes()?;

        let (bid_vol, ask_vol) = yes_side.top_volumes(self.params.depth);
        let total = bid_vol + ask_vol;
        if total < self.params.min_total_volume || ask_vol <= 0.0 || bid_vol <= 0.0 {
            return None;
        }

        let best_bid = yes_side.best_bid()?;
        let best_ask = yes_side.best_ask()?;
        let mid = math::mid(best_bid.price, best_ask.price);
        if mid <= 0.0 {
            return None;
        }
        let spread_pct = (best_ask.price - best_bid.price) / mid * 100.0;
        if spread_pct > self.params.max_spread_pct {
            return None;
        }

        let ratio = bid_vol / ask_vol;
        let (side, entry, size) = if ratio >= self.params.min_imbalance_ratio {
            (OrderSide::Buy, best_ask.price, best_ask.size)
        } else if ratio <= 1.0 / self.params.min_imbalance_ratio {
            (OrderSide::Sell, best_bid.price, best_bid.size)
        } else {
            return None;
        };

        let strength = if side == OrderSide::Buy { ratio } else { 1.0 / ratio };
        let confidence =
            ((strength - self.params.min_imbalance_ratio) / self.params.min_imbalance_ratio)
                .clamp(0.2, 1.0);
        let signal = Signal::new(
            &market.key.external_id,
            &yes.external_id,
            side,
            entry,
            size,
            confidence,
            self.name(),
            format!(
                "{side} imbalance: bid/ask vol {:.0}/{:.0} (ratio {:.2}), spread {:.1}%",
                bid_vol, ask_vol, ratio, spread_pct
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
