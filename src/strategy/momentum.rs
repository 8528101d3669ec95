// =============================================================================
// Momentum Strategy — ride confirmed directional moves
// =============================================================================

use crate::market_data::{OrderBook, PriceStats};
use crate::strategy::{Signal, SignalBook, Strategy};
use crate::types::{NormalizedMarket, OrderSide};

#[derive(Debug, Clone, Copy)]
pub struct MomentumParams {
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Minimum window change, in percent, before momentum counts.
    pub min_change_pct: f64,
}

impl Default for MomentumParams {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            min_change_pct: 2.0,
        }
    }
}

pub struct MomentumStrategy {
    params: MomentumParams,
    signals: SignalBook,
}

impl MomentumStrategy {
    pub fn new(params: MomentumParams) -> Self {
        Self {
            params,
            signals: SignalBook::new(),
        }
    }
}

impl Default for MomentumStrategy {
    fn default() -> Self {
        Self::new(MomentumParams::default())
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn analyze(
        &self,
        market: &NormalizedMarket,
        stats: Option<&PriceStats>,
        _book: Option<&OrderBook>,
        now_ms: u64,
    ) -> Option<Signal> {
        if !market.is_active {
            return None;
        }
        let stats = stats?;
        let sma = stats.sma20?;
        let vwap = stats.vwap?;
        let rsi = stats.rsi14?;
        let yes = market.yes()?;
        let price = stats.current;

        // Upward momentum: price above both anchors, RSI confirming but not
        // yet overbought, and a real move behind it.
        let bullish = price > sma
            && price > vwap
            && rsi > self.params.rsi_oversold
            && rsi < self.params.rsi_overbought
            && stats.change_percent >= self.params.min_change_pct;

        let bearish = price < sma
            && price < vwap
            && rsi > self.params.rsi_oversold
            && rsi < self.params.rsi_overbought
            && stats.change_percent <= -self.params.min_change_pct;

        let (side, entry, size) = if bullish {
            (OrderSide::Buy, yes.best_ask, yes.ask_size)
        } else if bearish {
            (OrderSide::Sell, yes.best_bid, yes.bid_size)
        } else {
            return None;
        };
        if entry <= 0.0 || size <= 0.0 {
            return None;
        }

        let confidence = (stats.change_percent.abs() / (self.params.min_change_pct * 4.0))
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
                "{side} momentum: price {:.3} vs sma {:.3} / vwap {:.3}, rsi {:.0}, change {:+.1}%",
                price, sma, vwap, rsi, stats.change_percent
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
