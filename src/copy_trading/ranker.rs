// =============================================================================
// Trader Ranker — percentile-normalized composite scoring
// =============================================================================
//
// Each metric is percentile-ranked inside the candidate cohort so scales never
// mix (an ROI of 4.0 and a win rate of 0.6 both become cohort positions).
// Consistency blends Sharpe with inverse drawdown. Minimum-requirement
// filters run before scoring.
// =============================================================================

use serde::{Deserialize, Serialize};

/// Wallet-level performance metrics (as cached by `TraderCache`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderStats {
    pub address: String,
    /// Lifetime return on invested capital, as a fraction.
    pub roi: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub sharpe: f64,
    /// Worst peak-to-trough drawdown, as a fraction.
    pub max_drawdown: f64,
    pub trade_count: u64,
    pub total_volume_usd: f64,
}

/// Weighting presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankerPreset {
    Conservative,
    Aggressive,
    Balanced,
    HighVolume,
}

/// Metric weights plus minimum requirements.
#[derive(Debug, Clone, Copy)]
pub struct RankerConfig {
    pub weight_roi: f64,
    pub weight_win_rate: f64,
    pub weight_profit_factor: f64,
    pub weight_consistency: f64,
    pub min_trades: u64,
    pub min_volume_usd: f64,
    pub max_drawdown_limit: f64,
}

impl RankerConfig {
    pub fn preset(preset: RankerPreset) -> Self {
        match preset {
            RankerPreset::Conservative => Self {
                weight_roi: 0.15,
                weight_win_rate: 0.25,
                weight_profit_factor: 0.2,
                weight_consistency: 0.4,
                min_trades: 100,
                min_volume_usd: 25_000.0,
                max_drawdown_limit: 0.25,
            },
            RankerPreset::Aggressive => Self {
                weight_roi: 0.5,
                weight_win_rate: 0.15,
                weight_profit_factor: 0.25,
                weight_consistency: 0.1,
                min_trades: 25,
                min_volume_usd: 5_000.0,
                max_drawdown_limit: 0.6,
            },
            RankerPreset::Balanced => Self {
                weight_roi: 0.3,
                weight_win_rate: 0.25,
                weight_profit_factor: 0.25,
                weight_consistency: 0.2,
                min_trades: 50,
                min_volume_usd: 10_000.0,
                max_drawdown_limit: 0.4,
            },
            RankerPreset::HighVolume => Self {
                weight_roi: 0.25,
                weight_win_rate: 0.2,
                weight_profit_factor: 0.25,
                weight_consistency: 0.3,
                min_trades: 500,
                min_volume_usd: 250_000.0,
                max_drawdown_limit: 0.4,
            },
        }
    }
}

/// A scored candidate, highest composite first.
#[derive(Debug, Clone, Serialize)]
pub struct RankedTrader {
    pub address: String,
    pub score: f64,
    pub roi_percentile: f64,
    pub win_rate_percentile: f64,
    pub profit_factor_percentile: f64,
    pub consistency_percentile: f64,
}

pub struct TraderRanker {
    config: RankerConfig,
}

impl TraderRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn with_preset(preset: RankerPreset) -> Self {
        Self::new(RankerConfig::preset(preset))
    }

    /// Filter, percentile-normalize, score, and rank descending.
    pub fn rank(&self, candidates: &[TraderStats]) -> Vec<RankedTrader> {
        let eligible: Vec<&TraderStats> = candidates
            .iter()
            .filter(|t| t.trade_count >= self.config.min_trades)
            .filter(|t| t.total_volume_usd >= self.config.min_volume_usd)
            .filter(|t| t.max_drawdown <= self.config.max_drawdown_limit)
            .collect();
        if eligible.is_empty() {
            return Vec::new();
        }

        let roi: Vec<f64> = eligible.iter().map(|t| t.roi).collect();
        let win_rate: Vec<f64> = eligible.iter().map(|t| t.win_rate).collect();
        let profit_factor: Vec<f64> = eligible.iter().map(|t| t.profit_factor).collect();
        // Consistency: Sharpe plus inverse drawdown, averaged.
        let consistency: Vec<f64> = eligible
            .iter()
            .map(|t| t.sharpe + 1.0 / t.max_drawdown.max(0.01))
            .collect();

        let mut ranked: Vec<RankedTrader> = eligible
            .iter()
            .enumerate()
            .map(|(i, trader)| {
                let roi_pct = percentile_of(&roi, roi[i]);
                let win_pct = percentile_of(&win_rate, win_rate[i]);
                let pf_pct = percentile_of(&profit_factor, profit_factor[i]);
                let consistency_pct = percentile_of(&consistency, consistency[i]);
                let score = self.config.weight_roi * roi_pct
                    + self.config.weight_win_rate * win_pct
                    + self.config.weight_profit_factor * pf_pct
                    + self.config.weight_consistency * consistency_pct;
                RankedTrader {
                    address: trader.address.clone(),
                    score,
                    roi_percentile: roi_pct,
                    win_rate_percentile: win_pct,
                    profit_factor_percentile: pf_pct,
                    consistency_percentile: consistency_pct,
                }
            })
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Fraction of cohort values at or below `value`, in [0, 1].
fn percentile_of(values: &[f64], value: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let at_or_below = values.iter().filter(|&&v| v <= value).count() as f64;
    at_or_below / values.len() as f64
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn trader(address: &str, roi: f64, win_rate: f64, drawdown: f64) -> TraderStats {
        TraderStats {
            address: address.into(),
            roi,
            win_rate,
            profit_factor: 1.0 + roi,
            sharpe: roi * 2.0,
            max_drawdown: drawdown,
            trade_count: 100,
            total_volume_usd: 50_000.0,
        }
    }

    #[test]
    fn clearly_better_trader_ranks_first() {
        let ranker = TraderRanker::with_preset(RankerPreset::Balanced);
        let ranked = ranker.rank(&[
            trader("weak", 0.05, 0.45, 0.35),
            trader("strong", 0.80, 0.70, 0.10),
            trader("middle", 0.30, 0.55, 0.20),
        ]);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].address, "strong");
        assert_eq!(ranked[2].address, "weak");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn minimum_requirements_filter_before_scoring() {
        let ranker = TraderRanker::with_preset(RankerPreset::Balanced);
        let mut thin = trader("thin", 5.0, 0.9, 0.05);
        thin.trade_count = 3;
        let mut small = trader("small", 5.0, 0.9, 0.05);
        small.total_volume_usd = 100.0;
        let ranked = ranker.rank(&[thin, small, trader("ok", 0.2, 0.5, 0.2)]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, "ok");
    }

    #[test]
    fn drawdown_limit_excludes_blowup_risks() {
        let ranker = TraderRanker::with_preset(RankerPreset::Conservative);
        let ranked = ranker.rank(&[
            trader("steady", 0.2, 0.6, 0.1),
            trader("wild", 3.0, 0.6, 0.5), // past the 0.25 limit
        ]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, "steady");
    }

    #[test]
    fn high_volume_preset_demands_scale() {
        let ranker = TraderRanker::with_preset(RankerPreset::HighVolume);
        let mut whale = trader("whale", 0.3, 0.6, 0.15);
        whale.trade_count = 1_000;
        whale.total_volume_usd = 1_000_000.0;
        let ranked = ranker.rank(&[trader("retail", 0.3, 0.6, 0.15), whale]);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].address, "whale");
    }

    #[test]
    fn percentiles_are_cohort_relative() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_of(&values, 1.0), 0.25);
        assert_eq!(percentile_of(&values, 4.0), 1.0);
        assert_eq!(percentile_of(&[], 1.0), 0.0);
    }

    #[test]
    fn empty_cohort_ranks_empty() {
        let ranker = TraderRanker::with_preset(RankerPreset::Aggressive);
        assert!(ranker.rank(&[]).is_empty());
    }
}
