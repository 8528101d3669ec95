// =============================================================================
// Venue client contract
// =============================================================================
//
// Both venues present the same normalized surface: markets, books, orders,
// positions, balances, and one typed event stream. The engine never sees a
// venue's wire format; each client normalizes at the edge.
// =============================================================================

pub mod kalshi;
pub mod polymarket;
pub mod stream;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::EngineResult;
use crate::market_data::OrderBook;
use crate::types::{
    Balance, NormalizedMarket, Order, OrderSide, OrderStatus, OrderType, Platform, Position,
};

pub use kalshi::KalshiClient;
pub use polymarket::PolymarketClient;
pub use stream::ReconnectBackoff;

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Per-venue fee schedule, in basis points of notional.
///
/// Fee schedules are engine constants configured at startup; venue-reported
/// schedules are not fetched.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VenueFees {
    pub taker_bps: f64,
    pub maker_bps: f64,
}

impl VenueFees {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            // CLOB venue charges nothing on most binary markets.
            Platform::Polymarket => Self {
                taker_bps: 0.0,
                maker_bps: 0.0,
            },
            // Regulated venue: ~1% taker on typical contracts.
            Platform::Kalshi => Self {
                taker_bps: 100.0,
                maker_bps: 0.0,
            },
        }
    }

    /// Taker fee for a fill of `size` contracts at `price`.
    pub fn taker_fee(&self, price: f64, size: f64) -> f64 {
        price * size * self.taker_bps / crate::types::BPS_DIVISOR
    }
}

// ---------------------------------------------------------------------------
// Requests & filters
// ---------------------------------------------------------------------------

/// Order placement request, venue-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub order_type: OrderType,
    #[serde(default)]
    pub strategy_id: Option<String>,
}

/// Market catalog filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketFilter {
    #[serde(default)]
    pub active_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Order query filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub market_id: Option<String>,
    pub status: Option<OrderStatus>,
    pub strategy_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Connection state reported on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Reconnecting,
}

/// A trade printed on the venue's public tape.
#[derive(Debug, Clone, Serialize)]
pub struct TapeTrade {
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub at: DateTime<Utc>,
}

/// Order status change pushed by the venue.
#[derive(Debug, Clone, Serialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub status: OrderStatus,
    /// Cumulative filled size after this update.
    pub filled_size: f64,
    pub avg_fill_price: f64,
    pub reason: Option<String>,
}

/// Typed event stream shared by both venue clients.
#[derive(Debug, Clone)]
pub enum VenueEvent {
    Book(OrderBook),
    Trade(TapeTrade),
    OrderUpdate(OrderUpdate),
    Error { platform: Platform, message: String },
    StateChange { platform: Platform, state: ConnectionState },
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// Uniform client surface over both venues.
#[async_trait]
pub trait VenueClient: Send + Sync {
    fn platform(&self) -> Platform;

    async fn connect(&self) -> EngineResult<()>;
    async fn disconnect(&self) -> EngineResult<()>;
    fn is_connected(&self) -> bool;

    async fn get_markets(&self, filter: &MarketFilter) -> EngineResult<Vec<NormalizedMarket>>;
    async fn get_order_book(
        &self,
        market_id: &str,
        outcome_id: Option<&str>,
    ) -> EngineResult<OrderBook>;

    async fn place_order(&self, request: &OrderRequest) -> EngineResult<Order>;
    async fn cancel_order(&self, order_id: &str) -> EngineResult<()>;
    async fn get_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<Order>>;

    async fn get_positions(&self) -> EngineResult<Vec<Position>>;
    async fn get_balance(&self) -> EngineResult<Balance>;

    /// Recent public activity for a wallet address. Venues without a wallet
    /// concept return an empty list.
    async fn get_wallet_activity(
        &self,
        wallet: &str,
        limit: usize,
    ) -> EngineResult<Vec<WalletActivity>>;

    /// Subscribe to the typed event stream.
    fn subscribe_events(&self) -> broadcast::Receiver<VenueEvent>;
}

/// One observed on-venue action by a tracked wallet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletActivity {
    pub transaction_hash: String,
    pub wallet: String,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub usd_value: f64,
    pub at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fee_schedule_per_platform() {
        let poly = VenueFees::for_platform(Platform::Polymarket);
        assert_eq!(poly.taker_bps, 0.0);
        let kalshi = VenueFees::for_platform(Platform::Kalshi);
        assert_eq!(kalshi.taker_bps, 100.0);
    }

    #[test]
    fn taker_fee_is_bps_of_notional() {
        let fees = VenueFees {
            taker_bps: 100.0,
            maker_bps: 0.0,
        };
        // 100 bps of 0.50 * 200 = 1.0
        assert!((fees.taker_fee(0.50, 200.0) - 1.0).abs() < 1e-12);
        let free = VenueFees {
            taker_bps: 0.0,
            maker_bps: 0.0,
        };
        assert_eq!(free.taker_fee(0.50, 200.0), 0.0);
    }
}
