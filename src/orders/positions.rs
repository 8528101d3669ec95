// =============================================================================
// Position Book — net positions per (platform, market, outcome, strategy)
// =============================================================================
//
// Average-cost accounting: same-direction fills move the average entry,
// opposite-direction fills realize PnL against it. A fill larger than the
// open size flips the position, realizing the closed portion and opening the
// remainder at the fill price. A position whose size returns to zero closes.
// =============================================================================

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::types::{OrderSide, Platform, Position, PositionSide, Trade};

/// Composite key for the index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PositionKey {
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub strategy_id: Option<String>,
}

impl PositionKey {
    fn from_trade(trade: &Trade) -> Self {
        Self {
            platform: trade.platform,
            market_id: trade.market_id.clone(),
            outcome_id: trade.outcome_id.clone(),
            strategy_id: trade.strategy_id.clone(),
        }
    }
}

/// Thread-safe position index.
pub struct PositionBook {
    open: RwLock<HashMap<PositionKey, Position>>,
    closed: RwLock<Vec<Position>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self {
            open: RwLock::new(HashMap::new()),
            closed: RwLock::new(Vec::new()),
        }
    }

    // -------------------------------------------------------------------------
    // Fills
    // -------------------------------------------------------------------------

    /// Apply a fill. Returns the realized PnL of the reducing portion (0.0
    /// for pure increases).
    pub fn apply_fill(&self, trade: &Trade) -> f64 {
        let key = PositionKey::from_trade(trade);
        let mut open = self.open.write();

        let fill_direction = match trade.side {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        };

        let position = open.entry(key.clone()).or_insert_with(|| Position {
            platform: trade.platform,
            market_id: trade.market_id.clone(),
            outcome_id: trade.outcome_id.clone(),
            strategy_id: trade.strategy_id.clone(),
            side: fill_direction,
            size: 0.0,
            avg_entry_price: 0.0,
            unrealized_pnl: 0.0,
            realized_pnl: 0.0,
            is_open: true,
            opened_at: trade.executed_at,
            closed_at: None,
        });

        let mut realized = 0.0;

        if position.size == 0.0 || position.side == fill_direction {
            // Increase: blend the average entry.
            let new_size = position.size + trade.size;
            position.avg_entry_price = if new_size > 0.0 {
                (position.size * position.avg_entry_price + trade.size * trade.price) / new_size
            } else {
                trade.price
            };
            position.side = fill_direction;
            position.size = new_size;
        } else {
            // Reduce (and possibly flip).
            let reduce = trade.size.min(position.size);
            realized = match position.side {
                PositionSide::Long => (trade.price - position.avg_entry_price) * reduce,
                PositionSide::Short => (position.avg_entry_price - trade.price) * reduce,
            };
            position.realized_pnl += realized;
            position.size -= reduce;

            let flip = trade.size - reduce;
            if flip > 0.0 {
                position.side = fill_direction;
                position.size = flip;
                position.avg_entry_price = trade.price;
            }
        }

        debug!(
            market_id = %trade.market_id,
            outcome_id = %trade.outcome_id,
            side = %trade.side,
            size = trade.size,
            price = trade.price,
            realized,
            position_size = position.size,
            "fill applied to position book"
        );

        if position.size <= f64::EPSILON {
            let mut closed = position.clone();
            closed.size = 0.0;
            closed.is_open = false;
            closed.closed_at = Some(Utc::now());
            closed.unrealized_pnl = 0.0;
            info!(
                market_id = %closed.market_id,
                outcome_id = %closed.outcome_id,
                realized_pnl = closed.realized_pnl,
                "position closed"
            );
            open.remove(&key);
            self.closed.write().push(closed);
        }

        realized
    }

    // -------------------------------------------------------------------------
    // Marks
    // -------------------------------------------------------------------------

    /// Revalue all open positions on a market against `price`, returning the
    /// total unrealized PnL across the book.
    pub fn mark_market(&self, platform: Platform, market_id: &str, price: f64) -> f64 {
        let mut open = self.open.write();
        for (key, pos) in open.iter_mut() {
            if key.platform == platform && key.market_id == market_id {
                pos.unrealized_pnl =
                    pos.side.sign() * (price - pos.avg_entry_price) * pos.size;
            }
        }
        open.values().map(|p| p.unrealized_pnl).sum()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Notional of the position a new order would add to, valued at entry.
    pub fn position_notional(
        &self,
        platform: Platform,
        market_id: &str,
        outcome_id: &str,
    ) -> f64 {
        self.open
            .read()
            .iter()
            .filter(|(k, _)| {
                k.platform == platform && k.market_id == market_id && k.outcome_id == outcome_id
            })
            .map(|(_, p)| p.notional())
            .sum()
    }

    /// Total open notional across both venues.
    pub fn total_exposure(&self) -> f64 {
        self.open.read().values().map(|p| p.notional()).sum()
    }

    /// Sum of realized PnL across open and closed positions.
    pub fn total_realized_pnl(&self) -> f64 {
        let open: f64 = self.open.read().values().map(|p| p.realized_pnl).sum();
        let closed: f64 = self.closed.read().iter().map(|p| p.realized_pnl).sum();
        open + closed
    }

    pub fn open_positions(&self) -> Vec<Position> {
        self.open.read().values().cloned().collect()
    }

    pub fn closed_positions(&self, count: usize) -> Vec<Position> {
        let closed = self.closed.read();
        closed.iter().rev().take(count).cloned().collect()
    }

    pub fn open_count(&self) -> usize {
        self.open.read().len()
    }
}

impl Default for PositionBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PositionBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionBook")
            .field("open", &self.open.read().len())
            .field("closed", &self.closed.read().len())
            .finish()
    }
}
