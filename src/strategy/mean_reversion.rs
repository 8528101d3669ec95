// =============================================================================
// Mean-Reversion Strategy — fade stretched deviations from VWAP
// =============================================================================

use crate::market_data::{OrderBook, PriceStats};
use crate::strategy::{Signal, SignalBook, Strategy};
use crate::types::{NormalizedMarket, OrderSide};

#[derive(Debug, Clone, Copy)]
pub struct MeanReversionParams {
    /// Minimum |deviation| from VWAP, as a fraction, before fading.
    pub min_deviation: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
}

impl Default for MeanReversionParams {
    fn default() -> Self {
        Self {
            min_deviation: 0.05,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
        }
    }
}

pub struct MeanReversionStrategy {
    params: MeanReversionParams,
    signals: SignalBook,
}

impl MeanReversionStrategy {
    pub fn new(params: MeanReversionParams) -> Self {
        Self {
            params,
            signals: SignalBook::new(),
        }
    }
}

impl Default for MeanReversionStrategy {
    fn default() -> Self {
        Self::new(MeanReversionParams::default())
    }
}

impl Strategy for MeanReversionStrategy {
    fn name(&self) -> &'static str {
        "mean_reversion"
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
        let vwap = stats.vwap?;
        let sma = stats.sma20?;
        let rsi = stats.rsi14?;
        let yes = market.yes()?;
        let price = stats.current;
        if vwap <= 0.0 {
            return None;
        }

        let deviation = (price - vwap) / vwap;

        // Washed out: stretched below both anchors with an oversold RSI.
        let buy = deviation < -self.params.min_deviation
            && rsi < self.params.rsi_oversold
            && price < vwap
            && price < sma;

        // Overextended: symmetric on the upside.
        let sell = deviation > self.params.min_deviation
            && rsi > self.params.rsi_overbought
            && price > vwap
            && price > sma;

        let (side, entry, size) = if buy {
            (OrderSide::Buy, yes.best_ask, yes.ask_size)
        } else if sell {
            (OrderSide::Sell, yes.best_bid, yes.bid_size)
        } else {
            return None;
        };
        if entry <= 0.0 || size <= 0.0 {
            return None;
        }

        let confidence =
            (deviation.abs() / (self.params.min_deviation * 3.0)).clamp(0.2, 1.0);
        let signal = Signal::new(
            &market.key.external_id,
            &yes.external_id,
            side,
            entry,
            size,
            confidence,
            self.name(),
            format!(
                "{side} reversion: {:+.1}% off vwap {:.3}, rsi {:.0}",
                deviation * 100.0,
                vwap,
                rsi
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
