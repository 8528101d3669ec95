// =============================================================================
// Arbitrage — detection and atomic two-leg execution
// =============================================================================

pub mod detector;
pub mod executor;

use serde::Serialize;
use uuid::Uuid;

use crate::types::{OrderSide, Platform, ARBITRAGE_OPPORTUNITY_TTL_MS};

pub use detector::ArbitrageDetector;
pub use executor::{ArbitrageExecutor, ExecutionOutcome};

/// Where the mispricing lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbType {
    SinglePlatform,
    CrossPlatform,
}

/// One leg of the pair.
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageLeg {
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
}

/// A detected mispricing, owned by the detector until handed to the executor.
#[derive(Debug, Clone, Serialize)]
pub struct ArbitrageOpportunity {
    pub id: String,
    pub arb_type: ArbType,
    pub legs: [ArbitrageLeg; 2],
    pub spread_bps: f64,
    /// Profit at `max_size`, fees already deducted.
    pub max_profit: f64,
    pub max_size: f64,
    pub confidence: f64,
    /// Engine-clock detection time (ms).
    pub detected_at_ms: u64,
    pub ttl_ms: u64,
}

impl ArbitrageOpportunity {
    pub fn new(
        arb_type: ArbType,
        legs: [ArbitrageLeg; 2],
        spread_bps: f64,
        max_profit: f64,
        max_size: f64,
        confidence: f64,
        detected_at_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            arb_type,
            legs,
            spread_bps,
            max_profit,
            max_size,
            confidence,
            detected_at_ms,
            ttl_ms: ARBITRAGE_OPPORTUNITY_TTL_MS,
        }
    }

    /// Expired opportunities are filtered even if still profitable.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.detected_at_ms) >= self.ttl_ms
    }
}
