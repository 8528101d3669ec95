// =============================================================================
// Risk Engine — pre-trade gate protecting capital
// =============================================================================
//
// Limits checked before every order leaves the engine:
//   1. Position size   — per-position notional cap in USD.
//   2. Total exposure  — sum of open notional across both venues.
//   3. Daily loss      — realized + unrealized PnL floor for the day.
//   4. Max drawdown    — intra-day drawdown from peak equity.
//
// A rejected order is surfaced as RiskRejection and never retried. Daily
// statistics reset automatically when the UTC date rolls over.
// =============================================================================

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Configured limits, all in USD except the drawdown percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskLimits {
    pub max_position_size_usd: f64,
    pub max_total_exposure_usd: f64,
    pub max_daily_loss_usd: f64,
    pub max_drawdown_percent: f64,
}

/// Snapshot of one limit for the admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitInfo {
    pub name: String,
    pub current: f64,
    pub limit: f64,
    pub breached: bool,
}

/// Serialisable snapshot of the risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub daily_realized_pnl: f64,
    pub daily_unrealized_pnl: f64,
    pub peak_equity_today: f64,
    pub max_drawdown_today_pct: f64,
    pub limits: Vec<LimitInfo>,
    pub current_date: String,
}

// ---------------------------------------------------------------------------
// Internal mutable state
// ---------------------------------------------------------------------------

struct Inner {
    daily_realized_pnl: f64,
    daily_unrealized_pnl: f64,
    peak_equity_today: f64,
    max_drawdown_today_pct: f64,
    current_date: String,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Pre-trade risk gate. Exposure inputs come from the position book at check
/// time; the engine itself only owns the daily PnL and drawdown state.
pub struct RiskEngine {
    state: RwLock<Inner>,
    limits: RiskLimits,
    /// Session starting capital for drawdown percentages.
    capital: f64,
}

impl RiskEngine {
    pub fn new(capital: f64, limits: RiskLimits) -> Self {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        info!(
            capital,
            max_position_size_usd = limits.max_position_size_usd,
            max_total_exposure_usd = limits.max_total_exposure_usd,
            max_daily_loss_usd = limits.max_daily_loss_usd,
            max_drawdown_percent = limits.max_drawdown_percent,
            "RiskEngine initialised"
        );

        Self {
            state: RwLock::new(Inner {
                daily_realized_pnl: 0.0,
                daily_unrealized_pnl: 0.0,
                peak_equity_today: capital,
                max_drawdown_today_pct: 0.0,
                current_date: today,
            }),
            limits,
            capital,
        }
    }

    pub fn limits(&self) -> RiskLimits {
        self.limits
    }

    // -------------------------------------------------------------------------
    // Pre-trade gate
    // -------------------------------------------------------------------------

    /// Check an order about to be placed.
    ///
    /// * `order_notional`    — price × size of the new order.
    /// * `position_notional` — existing notional on the same
    ///   (platform, market, outcome) position.
    /// * `total_exposure`    — open notional across all positions.
    pub fn check_order(
        &self,
        order_notional: f64,
        position_notional: f64,
        total_exposure: f64,
    ) -> EngineResult<()> {
        self.maybe_reset_daily();
        let s = self.state.read();

        if position_notional + order_notional > self.limits.max_position_size_usd {
            let msg = format!(
                "position size {:.2} would exceed limit {:.2}",
                position_notional + order_notional,
                self.limits.max_position_size_usd
            );
            warn!("{}", msg);
            return Err(EngineError::RiskRejection(msg));
        }

        if total_exposure + order_notional > self.limits.max_total_exposure_usd {
            let msg = format!(
                "total exposure {:.2} would exceed limit {:.2}",
                total_exposure + order_notional,
                self.limits.max_total_exposure_usd
            );
            warn!("{}", msg);
            return Err(EngineError::RiskRejection(msg));
        }

        let daily_pnl = s.daily_realized_pnl + s.daily_unrealized_pnl;
        if daily_pnl <= -self.limits.max_daily_loss_usd {
            let msg = format!(
                "daily loss {:.2} at or beyond limit {:.2}",
                daily_pnl, self.limits.max_daily_loss_usd
            );
            warn!("{}", msg);
            return Err(EngineError::RiskRejection(msg));
        }

        if s.max_drawdown_today_pct >= self.limits.max_drawdown_percent {
            let msg = format!(
                "drawdown {:.2}% at or beyond limit {:.2}%",
                s.max_drawdown_today_pct, self.limits.max_drawdown_percent
            );
            warn!("{}", msg);
            return Err(EngineError::RiskRejection(msg));
        }

        Ok(())
    }

    /// True when the daily-loss limit is currently breached.
    pub fn daily_loss_breached(&self) -> bool {
        self.maybe_reset_daily();
        let s = self.state.read();
        s.daily_realized_pnl + s.daily_unrealized_pnl <= -self.limits.max_daily_loss_usd
    }

    /// True when the drawdown limit is currently breached.
    pub fn drawdown_breached(&self) -> bool {
        self.maybe_reset_daily();
        self.state.read().max_drawdown_today_pct >= self.limits.max_drawdown_percent
    }

    // -------------------------------------------------------------------------
    // PnL updates
    // -------------------------------------------------------------------------

    /// Record realized PnL from a closed or reduced position.
    pub fn record_realized(&self, pnl: f64) {
        self.maybe_reset_daily();
        let mut s = self.state.write();
        s.daily_realized_pnl += pnl;
        Self::update_drawdown(&mut s, self.capital);
        debug!(pnl, daily_realized = s.daily_realized_pnl, "realized PnL recorded");
    }

    /// Replace the unrealized PnL mark with a fresh valuation.
    pub fn mark_unrealized(&self, pnl: f64) {
        self.maybe_reset_daily();
        let mut s = self.state.write();
        s.daily_unrealized_pnl = pnl;
        Self::update_drawdown(&mut s, self.capital);
    }

    fn update_drawdown(s: &mut Inner, capital: f64) {
        let equity = capital + s.daily_realized_pnl + s.daily_unrealized_pnl;
        if equity > s.peak_equity_today {
            s.peak_equity_today = equity;
        }
        if s.peak_equity_today > 0.0 {
            let dd = (s.peak_equity_today - equity) / s.peak_equity_today * 100.0;
            if dd > s.max_drawdown_today_pct {
                s.max_drawdown_today_pct = dd;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Snapshot
    // -------------------------------------------------------------------------

    pub fn get_state(&self) -> RiskState {
        self.maybe_reset_daily();
        let s = self.state.read();
        let daily_pnl = s.daily_realized_pnl + s.daily_unrealized_pnl;

        let limits = vec![
            LimitInfo {
                name: "Daily Loss".to_string(),
                current: (-daily_pnl).max(0.0),
                limit: self.limits.max_daily_loss_usd,
                breached: daily_pnl <= -self.limits.max_daily_loss_usd,
            },
            LimitInfo {
                name: "Max Drawdown".to_string(),
                current: s.max_drawdown_today_pct,
                limit: self.limits.max_drawdown_percent,
                breached: s.max_drawdown_today_pct >= self.limits.max_drawdown_percent,
            },
        ];

        RiskState {
            daily_realized_pnl: s.daily_realized_pnl,
            daily_unrealized_pnl: s.daily_unrealized_pnl,
            peak_equity_today: s.peak_equity_today,
            max_drawdown_today_pct: s.max_drawdown_today_pct,
            limits,
            current_date: s.current_date.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Daily reset
    // -------------------------------------------------------------------------

    fn maybe_reset_daily(&self) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        {
            let s = self.state.read();
            if s.current_date == today {
                return;
            }
        }
        let mut s = self.state.write();
        // Double-check after acquiring the write lock.
        if s.current_date != today {
            info!(
                old_date = %s.current_date,
                new_date = %today,
                "date rolled — resetting daily risk counters"
            );
            s.daily_realized_pnl = 0.0;
            s.daily_unrealized_pnl = 0.0;
            s.peak_equity_today = self.capital;
            s.max_drawdown_today_pct = 0.0;
            s.current_date = today;
        }
    }
}

impl std::fmt::Debug for RiskEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RiskEngine")
            .field("capital", &self.capital)
            .field("limits", &self.limits)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_position_size_usd: 1_000.0,
            max_total_exposure_usd: 5_000.0,
            max_daily_loss_usd: 500.0,
            max_drawdown_percent: 10.0,
        }
    }

    #[test]
    fn order_inside_all_limits_passes() {
        let engine = RiskEngine::new(10_000.0, limits());
        assert!(engine.check_order(100.0, 200.0, 1_000.0).is_ok());
    }

    #[test]
    fn position_size_limit_rejects() {
        let engine = RiskEngine::new(10_000.0, limits());
        let err = engine.check_order(600.0, 500.0, 1_000.0).unwrap_err();
        assert_eq!(err.code(), "RISK_REJECTION");
        assert!(err.to_string().contains("position size"));
    }

    #[test]
    fn exposure_limit_rejects() {
        let engine = RiskEngine::new(10_000.0, limits());
        let err = engine.check_order(200.0, 0.0, 4_900.0).unwrap_err();
        assert!(err.to_string().contains("total exposure"));
    }

    #[test]
    fn daily_loss_limit_rejects_after_losses() {
        let engine = RiskEngine::new(10_000.0, limits());
        engine.record_realized(-300.0);
        engine.mark_unrealized(-250.0);
        let err = engine.check_order(10.0, 0.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("daily loss"));
        assert!(engine.daily_loss_breached());
    }

    #[test]
    fn drawdown_limit_rejects() {
        let engine = RiskEngine::new(10_000.0, limits());
        // Run equity up, then down: peak 11000, trough 9800 => ~10.9% dd.
        engine.record_realized(1_000.0);
        engine.record_realized(-1_200.0);
        assert!(engine.drawdown_breached());
        let err = engine.check_order(10.0, 0.0, 0.0).unwrap_err();
        assert!(err.to_string().contains("drawdown"));
    }

    #[test]
    fn boundary_order_exactly_at_limit_passes() {
        let engine = RiskEngine::new(10_000.0, limits());
        // position_notional + order_notional == limit exactly.
        assert!(engine.check_order(400.0, 600.0, 0.0).is_ok());
        assert!(engine.check_order(400.0, 601.0, 0.0).is_err());
    }

    #[test]
    fn unrealized_mark_is_replaced_not_accumulated() {
        let engine = RiskEngine::new(10_000.0, limits());
        engine.mark_unrealized(-400.0);
        engine.mark_unrealized(-100.0);
        // Only the latest mark counts: -100 is inside the limit.
        assert!(engine.check_order(10.0, 0.0, 0.0).is_ok());
    }

    #[test]
    fn snapshot_reports_limit_status() {
        let engine = RiskEngine::new(10_000.0, limits());
        engine.record_realized(-600.0);
        let state = engine.get_state();
        let daily = state.limits.iter().find(|l| l.name == "Daily Loss").unwrap();
        assert!(daily.breached);
        assert_eq!(daily.current, 600.0);
    }
}
