// =============================================================================
// Central Application State — Meridian Trading Engine
// =============================================================================
//
// Ties the subsystems together for the admin API. Subsystems own their state
// behind Arc; AppState provides the unified snapshot plus the version counter
// and error ring the dashboard polls.
//
// Thread safety:
//   - AtomicU64 for lock-free version tracking.
//   - parking_lot::RwLock for the error ring.
//   - Arc handles for subsystems with interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::copy_trading::CopyTrader;
use crate::engine::{EngineStats, TradingEngine};
use crate::health::{HealthMonitor, KillState};
use crate::orders::OrderManager;
use crate::risk::{RiskEngine, RiskState};
use crate::types::{Balance, Platform, Position};
use crate::venue::VenueClient;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded error event for the admin error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Shared across all API handlers via `Arc<AppState>`.
pub struct AppState {
    /// Incremented on every meaningful mutation.
    pub state_version: AtomicU64,
    pub engine: Arc<TradingEngine>,
    pub orders: Arc<OrderManager>,
    pub risk: Arc<RiskEngine>,
    pub health: Arc<HealthMonitor>,
    pub copy_trader: Arc<CopyTrader>,
    pub clients: Vec<(Platform, Arc<dyn VenueClient>)>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        engine: Arc<TradingEngine>,
        orders: Arc<OrderManager>,
        risk: Arc<RiskEngine>,
        health: Arc<HealthMonitor>,
        copy_trader: Arc<CopyTrader>,
        clients: Vec<(Platform, Arc<dyn VenueClient>)>,
    ) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            engine,
            orders,
            risk,
            health,
            copy_trader,
            clients,
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Record an error with an optional machine-readable code. The ring is
    /// capped at [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, message: String, code: Option<String>) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message,
            code,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);
        self.increment_version();
    }

    /// Trading status payload for `GET /trading/status`.
    pub fn trading_status(&self) -> TradingStatus {
        TradingStatus {
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            engine: self.engine.stats(),
            risk: self.risk.get_state(),
            kill_switch: self.health.kill_switch().state(),
            open_orders: self.orders.open_order_count(),
            open_positions: self.orders.positions().open_count(),
            copy_positions: self.copy_trader.positions().open_positions().len(),
            paper_trading: self.orders.is_paper(),
            server_time: Utc::now().timestamp_millis(),
        }
    }

    /// Positions across the engine book and the copy book.
    pub fn all_positions(&self) -> PositionsSnapshot {
        PositionsSnapshot {
            engine: self.orders.positions().open_positions(),
            copy: self.copy_trader.positions().open_positions(),
        }
    }

    /// Balance snapshot: the simulated balance in paper mode, venue balances
    /// otherwise.
    pub async fn balances(&self) -> Vec<BalanceEntry> {
        if let Some(paper) = self.orders.paper_engine() {
            return vec![BalanceEntry {
                source: "paper".into(),
                balance: Balance {
                    available: paper.balance(),
                    locked: 0.0,
                    total: paper.balance(),
                    currency: "USD".into(),
                },
            }];
        }
        let mut entries = Vec::new();
        for (platform, client) in &self.clients {
            if let Ok(balance) = client.get_balance().await {
                entries.push(BalanceEntry {
                    source: platform.to_string(),
                    balance,
                });
            }
        }
        entries
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TradingStatus {
    pub state_version: u64,
    pub uptime_secs: u64,
    pub engine: EngineStats,
    pub risk: RiskState,
    pub kill_switch: KillState,
    pub open_orders: usize,
    pub open_positions: usize,
    pub copy_positions: usize,
    pub paper_trading: bool,
    pub server_time: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionsSnapshot {
    pub engine: Vec<Position>,
    pub copy: Vec<crate::copy_trading::CopyPosition>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub source: String,
    pub balance: Balance,
}
