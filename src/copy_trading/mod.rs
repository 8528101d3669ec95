// =============================================================================
// Copy Trading — mirror tracked wallets under position-sizing rules
// =============================================================================

pub mod cache;
pub mod positions;
pub mod ranker;
pub mod simulator;
pub mod sizing;
pub mod tracker;

use serde::Serialize;

use crate::types::{OrderSide, Platform};

pub use cache::TraderCache;
pub use positions::{CopyPosition, CopyPositionBook, PositionChange};
pub use ranker::{RankedTrader, RankerPreset, TraderRanker, TraderStats};
pub use simulator::{CopySimulator, SimulationResult};
pub use sizing::{calculate_size, SizingCalculation};
pub use tracker::CopyTrader;

/// One observed trade by a tracked wallet, deduped by transaction hash.
#[derive(Debug, Clone, Serialize)]
pub struct DetectedTrade {
    pub id: String,
    pub wallet: String,
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub usd_value: f64,
    pub transaction_hash: String,
    pub detected_at_ms: u64,
}

/// A burst of detected trades collapsed into one synthetic order with a
/// size-weighted average price.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedTrade {
    pub wallet: String,
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub total_size: f64,
    pub avg_price: f64,
    pub usd_value: f64,
    pub trade_count: usize,
    pub window_start_ms: u64,
}

/// Event stream of the copy subsystem.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CopyEvent {
    TradeDetected(DetectedTrade),
    TradeCopied {
        wallet: String,
        market_id: String,
        order_id: String,
        size_usd: f64,
    },
    TradeSkipped {
        wallet: String,
        market_id: String,
        reason: String,
    },
    PositionOpened(CopyPosition),
    PositionUpdated(CopyPosition),
    PositionClosed(CopyPosition),
}
