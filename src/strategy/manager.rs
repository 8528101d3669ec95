// =============================================================================
// Strategy Manager — fan-out, dedup, cooldown, ranking
// =============================================================================
//
// Runs the whole strategy portfolio over each scanned market. Duplicate
// signals for the same (market, side) collapse to the highest-confidence one,
// the result is ranked and truncated to top-K, and every emitting market
// enters a cooldown. Significant-move events bypass the cooldown for the
// volatility-capture strategy only.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::market_data::{BookStore, PriceHistoryTracker, SignificantMove};
use crate::strategy::{
    EndgameStrategy, MeanReversionStrategy, MomentumStrategy, OrderbookImbalanceStrategy,
    ProbabilitySumStrategy, Signal, SpreadHunterStrategy, Strategy, VolatilityCaptureStrategy,
};
use crate::types::{NormalizedMarket, OrderSide};

/// Stats window handed to strategies, in seconds.
const STATS_WINDOW_SECS: u64 = 300;

pub struct StrategyManager {
    strategies: Vec<Arc<dyn Strategy>>,
    vol_capture: Arc<VolatilityCaptureStrategy>,
    tracker: Arc<PriceHistoryTracker>,
    clock: SharedClock,
    cooldown_ms: u64,
    top_k: usize,
    /// market id -> cooldown expiry (engine clock ms).
    cooldowns: RwLock<HashMap<String, u64>>,
}

impl StrategyManager {
    /// Build the full default portfolio.
    pub fn new(
        tracker: Arc<PriceHistoryTracker>,
        clock: SharedClock,
        cooldown_ms: u64,
        top_k: usize,
    ) -> Self {
        let vol_capture = Arc::new(VolatilityCaptureStrategy::new());
        let strategies: Vec<Arc<dyn Strategy>> = vec![
            Arc::new(ProbabilitySumStrategy::new()),
            Arc::new(EndgameStrategy::default()),
            Arc::new(MomentumStrategy::default()),
            Arc::new(MeanReversionStrategy::default()),
            Arc::new(OrderbookImbalanceStrategy::default()),
            Arc::new(SpreadHunterStrategy::default()),
            vol_capture.clone(),
        ];
        info!(count = strategies.len(), cooldown_ms, top_k, "strategy manager initialised");
        Self {
            strategies,
            vol_capture,
            tracker,
            clock,
            cooldown_ms,
            top_k,
            cooldowns: RwLock::new(HashMap::new()),
        }
    }

    /// Test hook: replace the portfolio (volatility capture is always kept
    /// so cooldown-bypass behavior stays observable).
    #[cfg(test)]
    pub fn with_strategies(
        tracker: Arc<PriceHistoryTracker>,
        clock: SharedClock,
        cooldown_ms: u64,
        top_k: usize,
        mut strategies: Vec<Arc<dyn Strategy>>,
    ) -> Self {
        let vol_capture = Arc::new(VolatilityCaptureStrategy::new());
        strategies.push(vol_capture.clone());
        Self {
            strategies,
            vol_capture,
            tracker,
            clock,
            cooldown_ms,
            top_k,
            cooldowns: RwLock::new(HashMap::new()),
        }
    }

    /// Forward a significant-move event to the volatility-capture strategy.
    pub fn on_significant_move(&self, event: SignificantMove) {
        debug!(market_id = %event.market_id, change_pct = event.change_pct, "significant move noted");
        self.vol_capture.note_move(event);
    }

    // -------------------------------------------------------------------------
    // Scanning
    // -------------------------------------------------------------------------

    /// Run every strategy over `markets`, returning the top-K deduplicated
    /// signals ranked by confidence.
    pub fn scan_markets(
        &self,
        markets: &[NormalizedMarket],
        books: &BookStore,
    ) -> Vec<Signal> {
        let now = self.clock.now_ms();
        let mut collected: Vec<Signal> = Vec::new();

        for market in markets {
            if !market.is_active {
                continue;
            }
            let market_id = &market.key.external_id;
            let in_cooldown = {
                let cooldowns = self.cooldowns.read();
                cooldowns.get(market_id).is_some_and(|until| now < *until)
            };
            // Cooldown bypass applies to volatility capture only, and only
            // while its event window is fresh.
            let vol_bypass = in_cooldown && self.vol_capture.has_fresh_move(market_id, now);
            if in_cooldown && !vol_bypass {
                continue;
            }

            let stats = self.tracker.get_stats(market_id, STATS_WINDOW_SECS);
            let book = books.get(&market.key);

            for strategy in &self.strategies {
                if in_cooldown && strategy.name() != self.vol_capture.name() {
                    continue;
                }
                if strategy.needs_stats() && stats.is_none() {
                    continue;
                }
                if let Some(signal) =
                    strategy.analyze(market, stats.as_ref(), book.as_ref(), now)
                {
                    collected.push(signal);
                }
            }
        }

        let ranked = rank_signals(collected, self.top_k);

        // Emitting markets enter the cooldown window.
        if !ranked.is_empty() {
            let mut cooldowns = self.cooldowns.write();
            for signal in &ranked {
                cooldowns.insert(signal.market_id.clone(), now + self.cooldown_ms);
            }
        }

        debug!(count = ranked.len(), "scan produced signals");
        ranked
    }

    /// Drop a market's signal from every strategy (after execution).
    pub fn clear_signal(&self, market_id: &str) {
        for strategy in &self.strategies {
            strategy.clear_signal(market_id);
        }
    }

    /// Union of all strategies' active signals, expired ones dropped.
    pub fn active_signals(&self) -> Vec<Signal> {
        let now = self.clock.now_ms();
        self.strategies
            .iter()
            .flat_map(|s| s.active_signals())
            .filter(|s| !s.is_expired(now))
            .collect()
    }
}

impl std::fmt::Debug for StrategyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyManager")
            .field("strategies", &self.strategies.len())
            .field("top_k", &self.top_k)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Dedup by (market, side) keeping the highest confidence, rank descending,
/// truncate to `top_k`.
fn rank_signals(signals: Vec<Signal>, top_k: usize) -> Vec<Signal> {
    let mut best: HashMap<(String, OrderSide), Signal> = HashMap::new();
    for signal in signals {
        let key = (signal.market_id.clone(), signal.side);
        match best.get(&key) {
            Some(existing) if existing.confidence >= signal.confidence => {}
            _ => {
                best.insert(key, signal);
            }
        }
    }
    let mut ranked: Vec<Signal> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(top_k);
    ranked
}
