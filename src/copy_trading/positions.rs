// =============================================================================
// Copy positions — FIFO lots per (wallet, market, outcome)
// =============================================================================
//
// Buys append lots; sells consume them oldest-first, realizing PnL against
// each consumed lot's entry. The position closes when the last lot empties.
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;

/// One entry lot.
#[derive(Debug, Clone, Serialize)]
struct Lot {
    size: f64,
    price: f64,
}

/// Mirrored position for one tracked wallet and outcome.
#[derive(Debug, Clone, Serialize)]
pub struct CopyPosition {
    pub wallet: String,
    pub market_id: String,
    pub outcome_id: String,
    pub size: f64,
    pub avg_entry_price: f64,
    pub realized_pnl: f64,
    pub is_open: bool,
    pub opened_at_ms: u64,
}

/// What a book mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionChange {
    Opened,
    Updated,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    wallet: String,
    market_id: String,
    outcome_id: String,
}

struct Entry {
    lots: Vec<Lot>,
    realized_pnl: f64,
    opened_at_ms: u64,
}

/// Thread-safe copy-position index.
pub struct CopyPositionBook {
    entries: RwLock<HashMap<Key, Entry>>,
}

impl CopyPositionBook {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record a mirrored buy.
    pub fn record_buy(
        &self,
        wallet: &str,
        market_id: &str,
        outcome_id: &str,
        price: f64,
        size: f64,
        now_ms: u64,
    ) -> (PositionChange, CopyPosition) {
        let key = Key {
            wallet: wallet.into(),
            market_id: market_id.into(),
            outcome_id: outcome_id.into(),
        };
        let mut entries = self.entries.write();
        let entry = entries.entry(key.clone()).or_insert_with(|| Entry {
            lots: Vec::new(),
            realized_pnl: 0.0,
            opened_at_ms: now_ms,
        });

        // Re-opening after a full close keeps the realized history but
        // restarts the open timestamp.
        let was_flat = entry.lots.is_empty();
        if was_flat {
            entry.opened_at_ms = now_ms;
        }
        entry.lots.push(Lot { size, price });

        let change = if was_flat {
            PositionChange::Opened
        } else {
            PositionChange::Updated
        };
        let position = snapshot(&key, entry);
        (change, position)
    }

    /// Record a mirrored sell. Reduces FIFO against the stored lots and
    /// returns the realized PnL of the reduction. Sell size beyond the open
    /// lots is ignored (we never mirror short).
    pub fn record_sell(
        &self,
        wallet: &str,
        market_id: &str,
        outcome_id: &str,
        price: f64,
        size: f64,
    ) -> Option<(PositionChange, CopyPosition, f64)> {
        let key = Key {
            wallet: wallet.into(),
            market_id: market_id.into(),
            outcome_id: outcome_id.into(),
        };
        let mut entries = self.entries.write();
        let entry = entries.get_mut(&key)?;
        if entry.lots.is_empty() {
            return None;
        }

        let mut remaining = size;
        let mut realized = 0.0;
        while remaining > 0.0 && !entry.lots.is_empty() {
            let lot = &mut entry.lots[0];
            let take = remaining.min(lot.size);
            realized += (price - lot.price) * take;
            lot.size -= take;
            remaining -= take;
            if lot.size <= f64::EPSILON {
                entry.lots.remove(0);
            }
        }
        entry.realized_pnl += realized;

        let change = if entry.lots.is_empty() {
            PositionChange::Closed
        } else {
            PositionChange::Updated
        };
        let position = snapshot(&key, entry);
        Some((change, position, realized))
    }

    pub fn position(
        &self,
        wallet: &str,
        market_id: &str,
        outcome_id: &str,
    ) -> Option<CopyPosition> {
        let key = Key {
            wallet: wallet.into(),
            market_id: market_id.into(),
            outcome_id: outcome_id.into(),
        };
        let entries = self.entries.read();
        entries.get(&key).map(|e| snapshot(&key, e))
    }

    pub fn open_positions(&self) -> Vec<CopyPosition> {
        self.entries
            .read()
            .iter()
            .filter(|(_, e)| !e.lots.is_empty())
            .map(|(k, e)| snapshot(k, e))
            .collect()
    }

    pub fn total_realized_pnl(&self) -> f64 {
        self.entries.read().values().map(|e| e.realized_pnl).sum()
    }
}

impl Default for CopyPositionBook {
    fn default() -> Self {
        Self::new()
    }
}

fn snapshot(key: &Key, entry: &Entry) -> CopyPosition {
    let size: f64 = entry.lots.iter().map(|l| l.size).sum();
    let avg = if size > 0.0 {
        entry.lots.iter().map(|l| l.size * l.price).sum::<f64>() / size
    } else {
        0.0
    };
    CopyPosition {
        wallet: key.wallet.clone(),
        market_id: key.market_id.clone(),
        outcome_id: key.outcome_id.clone(),
        size,
        avg_entry_price: avg,
        realized_pnl: entry.realized_pnl,
        is_open: size > 0.0,
        opened_at_ms: entry.opened_at_ms,
    }
}
