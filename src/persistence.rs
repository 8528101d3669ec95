// =============================================================================
// Repository — narrow persistence seam
// =============================================================================
//
// The engine never issues SQL. Everything durable flows through this trait;
// the bundled implementation is in-memory and the production deployment wires
// a relational store behind the same surface. Writes are fire-and-forget from
// the engine's perspective: a failed persist is logged and counted, never
// fatal.
// =============================================================================

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::arbitrage::ArbitrageOpportunity;
use crate::types::{MarketPair, NormalizedMarket, Order, Position, Trade};

/// Persistence surface for the engine's durable shapes.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Liveness probe for the health monitor.
    async fn ping(&self) -> bool;

    async fn save_markets(&self, markets: &[NormalizedMarket]);
    async fn save_pairs(&self, pairs: &[MarketPair]);
    async fn save_order(&self, order: &Order);
    async fn save_trade(&self, trade: &Trade);
    async fn save_position(&self, position: &Position);
    async fn save_opportunity(&self, opportunity: &ArbitrageOpportunity);

    async fn load_markets(&self) -> Vec<NormalizedMarket>;
    async fn load_trades(&self) -> Vec<Trade>;
}

/// In-memory repository. Also the test double.
#[derive(Default)]
pub struct MemoryRepository {
    markets: RwLock<HashMap<String, NormalizedMarket>>,
    pairs: RwLock<Vec<MarketPair>>,
    orders: RwLock<HashMap<String, Order>>,
    trades: RwLock<Vec<Trade>>,
    positions: RwLock<Vec<Position>>,
    opportunities: RwLock<Vec<ArbitrageOpportunity>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order_count(&self) -> usize {
        self.orders.read().len()
    }

    pub fn opportunity_count(&self) -> usize {
        self.opportunities.read().len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn ping(&self) -> bool {
        true
    }

    async fn save_markets(&self, markets: &[NormalizedMarket]) {
        let mut stored = self.markets.write();
        for market in markets {
            stored.insert(market.key.to_string(), market.clone());
        }
    }

    async fn save_pairs(&self, pairs: &[MarketPair]) {
        *self.pairs.write() = pairs.to_vec();
    }

    async fn save_order(&self, order: &Order) {
        self.orders.write().insert(order.id.clone(), order.clone());
    }

    async fn save_trade(&self, trade: &Trade) {
        self.trades.write().push(trade.clone());
    }

    async fn save_position(&self, position: &Position) {
        self.positions.write().push(position.clone());
    }

    async fn save_opportunity(&self, opportunity: &ArbitrageOpportunity) {
        self.opportunities.write().push(opportunity.clone());
    }

    async fn load_markets(&self) -> Vec<NormalizedMarket> {
        self.markets.read().values().cloned().collect()
    }

    async fn load_trades(&self) -> Vec<Trade> {
        self.trades.read().clone()
    }
}
