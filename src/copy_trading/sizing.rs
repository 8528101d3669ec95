// =============================================================================
// Copy sizing — PERCENTAGE, FIXED, ADAPTIVE
// =============================================================================
//
// ADAPTIVE scales the copied percentage down as the tracked trader's ticket
// grows: whales get mirrored proportionally smaller so one conviction bet of
// theirs cannot dominate our book.
// =============================================================================

use serde::Serialize;

use crate::config::{SizingMode, TraderCopyConfig};

/// ADAPTIVE floor and ceiling percentages.
const ADAPTIVE_MIN_PCT: f64 = 0.5;
const ADAPTIVE_MAX_PCT: f64 = 5.0;
/// Percentage-point decay per USD of trader notional.
const ADAPTIVE_DECAY_PER_USD: f64 = 0.0004;

/// Outcome of a sizing computation.
#[derive(Debug, Clone, Serialize)]
pub enum SizingCalculation {
    /// Mirror with this many USD.
    Copy { size_usd: f64 },
    /// Stand aside with a reason.
    Skip { reason: String },
}

impl SizingCalculation {
    pub fn size_usd(&self) -> Option<f64> {
        match self {
            Self::Copy { size_usd } => Some(*size_usd),
            Self::Skip { .. } => None,
        }
    }
}

/// Compute the mirrored USD size for a detected trade of `trader_usd`
/// notional, bounded by `available_balance`.
pub fn calculate_size(
    config: &TraderCopyConfig,
    trader_usd: f64,
    available_balance: f64,
) -> SizingCalculation {
    if trader_usd <= 0.0 {
        return SizingCalculation::Skip {
            reason: "zero trader notional".into(),
        };
    }

    let size = match config.sizing {
        SizingMode::Percentage => {
            let raw = trader_usd * config.copy_percentage / 100.0;
            raw.max(config.min_trade_size).min(config.max_position_size)
        }
        SizingMode::Fixed => config
            .fixed_copy_amount
            .max(config.min_trade_size)
            .min(config.max_position_size),
        SizingMode::Adaptive => {
            let pct = (ADAPTIVE_MAX_PCT - ADAPTIVE_DECAY_PER_USD * trader_usd)
                .max(ADAPTIVE_MIN_PCT);
            let raw = (trader_usd * pct / 100.0).min(config.max_position_size);
            let capped = raw.min(available_balance);
            if capped < config.min_trade_size {
                return SizingCalculation::Skip {
                    reason: format!(
                        "adaptive size {capped:.2} below minimum {:.2}",
                        config.min_trade_size
                    ),
                };
            }
            capped
        }
    };

    let size = size.min(available_balance);
    if size <= 0.0 {
        return SizingCalculation::Skip {
            reason: "no available balance".into(),
        };
    }
    SizingCalculation::Copy { size_usd: size }
}
