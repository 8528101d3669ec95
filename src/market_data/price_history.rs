// =============================================================================
// Price History Tracker — bounded per-market time series
// =============================================================================
//
// One ring of PricePoints per market id. Samples arriving sooner than
// `sample_interval` after the previous one are dropped; at capacity the
// oldest point is evicted. A move of 5% or more against the last recorded
// price within a 60 s window emits a SignificantMove event on the broadcast
// channel. All derived statistics are pure functions of the requested window.
// =============================================================================

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use parking_lot::RwLock;

use crate::clock::SharedClock;
use crate::math;

/// Default ring capacity per market.
const DEFAULT_CAPACITY: usize = 500;
/// Default minimum gap between recorded samples.
const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 1_000;
/// Relative move that counts as significant.
const SIGNIFICANT_MOVE_PCT: f64 = 0.05;
/// Window within which the move must occur.
const SIGNIFICANT_MOVE_WINDOW_MS: u64 = 60_000;
/// Minimum points inside a window before stats are produced.
const MIN_POINTS_FOR_STATS: usize = 10;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One recorded sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    /// Monotonic timestamp in ms (engine clock).
    pub timestamp_ms: u64,
    pub price: f64,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub bid_size: Option<f64>,
    #[serde(default)]
    pub ask_size: Option<f64>,
}

/// Derived statistics over a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceStats {
    pub current: f64,
    pub sma20: Option<f64>,
    pub vwap: Option<f64>,
    /// Stdev of log-returns across the window.
    pub volatility: Option<f64>,
    pub rsi14: Option<f64>,
    pub change_percent: f64,
    pub min: f64,
    pub max: f64,
    pub points: usize,
}

/// Emitted when a market moves 5%+ within the 60 s window.
#[derive(Debug, Clone, Serialize)]
pub struct SignificantMove {
    pub market_id: String,
    pub from_price: f64,
    pub to_price: f64,
    pub change_pct: f64,
    pub at_ms: u64,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Thread-safe bounded time-series store keyed by market id.
pub struct PriceHistoryTracker {
    series: RwLock<HashMap<String, VecDeque<PricePoint>>>,
    clock: SharedClock,
    capacity: usize,
    sample_interval_ms: u64,
    moves_tx: broadcast::Sender<SignificantMove>,
}

impl PriceHistoryTracker {
    pub fn new(clock: SharedClock) -> Self {
        Self::with_limits(clock, DEFAULT_CAPACITY, DEFAULT_SAMPLE_INTERVAL_MS)
    }

    pub fn with_limits(clock: SharedClock, capacity: usize, sample_interval_ms: u64) -> Self {
        let (moves_tx, _) = broadcast::channel(256);
        Self {
            series: RwLock::new(HashMap::new()),
            clock,
            capacity,
            sample_interval_ms,
            moves_tx,
        }
    }

    /// Subscribe to significant-move events.
    pub fn subscribe_moves(&self) -> broadcast::Receiver<SignificantMove> {
        self.moves_tx.subscribe()
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    /// Record a sample for `market_id`. O(1).
    ///
    /// Returns `true` when the sample was stored, `false` when it arrived
    /// inside the sample interval and was dropped.
    pub fn record(
        &self,
        market_id: &str,
        price: f64,
        volume: Option<f64>,
        bid_size: Option<f64>,
        ask_size: Option<f64>,
    ) -> bool {
        let now = self.clock.now_ms();
        let mut series = self.series.write();
        let ring = series.entry(market_id.to_string()).or_default();

        if let Some(last) = ring.back() {
            if now < last.timestamp_ms + self.sample_interval_ms {
                return false;
            }

            // Significant-move detection against the last recorded price,
            // bounded by the 60 s window.
            if last.price > 0.0 && now.saturating_sub(last.timestamp_ms) <= SIGNIFICANT_MOVE_WINDOW_MS
            {
                let change = (price - last.price) / last.price;
                if change.abs() >= SIGNIFICANT_MOVE_PCT {
                    let event = SignificantMove {
                        market_id: market_id.to_string(),
                        from_price: last.price,
                        to_price: price,
                        change_pct: change * 100.0,
                        at_ms: now,
                    };
                    debug!(
                        market_id,
                        from = last.price,
                        to = price,
                        change_pct = event.change_pct,
                        "significant move"
                    );
                    let _ = self.moves_tx.send(event);
                }
            }
        }

        ring.push_back(PricePoint {
            timestamp_ms: now,
            price,
            volume,
            bid_size,
            ask_size,
        });
        while ring.len() > self.capacity {
            ring.pop_front();
        }
        true
    }

    // -------------------------------------------------------------------------
    // Derived statistics
    // -------------------------------------------------------------------------

    /// Windowed stats for a market, or `None` below 10 points in the window.
    pub fn get_stats(&self, market_id: &str, window_seconds: u64) -> Option<PriceStats> {
        let series = self.series.read();
        let ring = series.get(market_id)?;

        let cutoff = self.clock.now_ms().saturating_sub(window_seconds * 1_000);
        let window: Vec<&PricePoint> =
            ring.iter().filter(|p| p.timestamp_ms >= cutoff).collect();

        if window.len() < MIN_POINTS_FOR_STATS {
            return None;
        }

        let prices: Vec<f64> = window.iter().map(|p| p.price).collect();
        let volumes: Vec<f64> = window.iter().map(|p| p.volume.unwrap_or(0.0)).collect();

        let current = *prices.last()?;
        let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
        let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(PriceStats {
            current,
            sma20: math::sma(&prices, 20),
            vwap: math::vwap(&prices, &volumes),
            volatility: math::log_return_volatility(&prices),
            rsi14: math::rsi(&prices, 14),
            change_percent: math::change_percent(&prices).unwrap_or(0.0),
            min,
            max,
            points: window.len(),
        })
    }

    /// Latest recorded price for a market.
    pub fn last_price(&self, market_id: &str) -> Option<f64> {
        self.series
            .read()
            .get(market_id)
            .and_then(|ring| ring.back().map(|p| p.price))
    }

    /// Number of stored points for a market.
    pub fn len(&self, market_id: &str) -> usize {
        self.series.read().get(market_id).map_or(0, VecDeque::len)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn tracker() -> (Arc<ManualClock>, PriceHistoryTracker) {
        let clock = Arc::new(ManualClock::new());
        let tracker = PriceHistoryTracker::new(clock.clone() as SharedClock);
        (clock, tracker)
    }

    #[test]
    fn samples_inside_interval_are_dropped() {
        let (clock, tracker) = tracker();
        assert!(tracker.record("m", 0.50, None, None, None));
        clock.advance_ms(500);
        assert!(!tracker.record("m", 0.51, None, None, None));
        clock.advance_ms(500);
        assert!(tracker.record("m", 0.51, None, None, None));
        assert_eq!(tracker.len("m"), 2);
    }

    #[test]
    fn capacity_evicts_oldest() {
        let clock = Arc::new(ManualClock::new());
        let tracker =
            PriceHistoryTracker::with_limits(clock.clone() as SharedClock, 5, 1_000);
        for i in 0..10 {
            tracker.record("m", 0.50 + i as f64 * 0.001, None, None, None);
            clock.advance_ms(1_000);
        }
        assert_eq!(tracker.len("m"), 5);
        // Oldest surviving point is the 6th recorded one.
        let stats_window = tracker.get_stats("m", 3600);
        assert!(stats_window.is_none()); // below 10 points
        assert!((tracker.last_price("m").unwrap() - 0.509).abs() < 1e-12);
    }

    #[test]
    fn stats_need_ten_points_in_window() {
        let (clock, tracker) = tracker();
        for i in 0..9 {
            tracker.record("m", 0.50 + i as f64 * 0.001, None, None, None);
            clock.advance_ms(1_000);
        }
        assert!(tracker.get_stats("m", 60).is_none());
        tracker.record("m", 0.52, None, None, None);
        assert!(tracker.get_stats("m", 60).is_some());
    }

    #[test]
    fn stats_values_are_window_pure() {
        let (clock, tracker) = tracker();
        let prices: Vec<f64> = (0..20).map(|i| 0.40 + i as f64 * 0.01).collect();
        for &p in &prices {
            tracker.record("m", p, Some(10.0), None, None);
            clock.advance_ms(1_000);
        }
        let stats = tracker.get_stats("m", 3600).unwrap();
        assert_eq!(stats.points, 20);
        assert!((stats.current - 0.59).abs() < 1e-12);
        assert!((stats.min - 0.40).abs() < 1e-12);
        assert!((stats.max - 0.59).abs() < 1e-12);
        assert!(stats.change_percent > 0.0);
        // Uniform volume => VWAP equals plain mean.
        let mean = prices.iter().sum::<f64>() / prices.len() as f64;
        assert!((stats.vwap.unwrap() - mean).abs() < 1e-9);
        assert!(stats.rsi14.unwrap() > 99.0); // strictly rising
    }

    #[test]
    fn replaying_identical_updates_yields_identical_stats() {
        // Identical input streams must produce identical stats.
        let run = || {
            let clock = Arc::new(ManualClock::new());
            let tracker = PriceHistoryTracker::new(clock.clone() as SharedClock);
            for i in 0..15 {
                let p = 0.50 + ((i * 7) % 5) as f64 * 0.004;
                tracker.record("m", p, Some(5.0), None, None);
                clock.advance_ms(1_000);
            }
            tracker.get_stats("m", 3600).unwrap()
        };
        let a = run();
        let b = run();
        assert_eq!(a.current, b.current);
        assert_eq!(a.sma20, b.sma20);
        assert_eq!(a.vwap, b.vwap);
        assert_eq!(a.rsi14, b.rsi14);
        assert_eq!(a.volatility, b.volatility);
    }

    #[test]
    fn significant_move_emits_event() {
        let (clock, tracker) = tracker();
        let mut rx = tracker.subscribe_moves();

        tracker.record("m", 0.50, None, None, None);
        clock.advance_ms(1_000);
        // 6% jump within the window.
        tracker.record("m", 0.53, None, None, None);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.market_id, "m");
        assert!((event.change_pct - 6.0).abs() < 1e-9);
    }

    #[test]
    fn small_moves_do_not_emit() {
        let (clock, tracker) = tracker();
        let mut rx = tracker.subscribe_moves();

        tracker.record("m", 0.50, None, None, None);
        clock.advance_ms(1_000);
        tracker.record("m", 0.51, None, None, None); // 2%
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn moves_outside_window_do_not_emit() {
        let (clock, tracker) = tracker();
        let mut rx = tracker.subscribe_moves();

        tracker.record("m", 0.50, None, None, None);
        clock.advance_ms(61_000); // past the 60 s window
        tracker.record("m", 0.60, None, None, None);
        assert!(rx.try_recv().is_err());
    }
}
