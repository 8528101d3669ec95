// =============================================================================
// Shared types used across the Meridian trading engine
// =============================================================================
//
// All prices in binary prediction markets live in (0, 1): a contract pays out
// 1 unit if its outcome resolves true, 0 otherwise. Every enum here is matched
// exhaustively at the use sites; adding a variant is a compile-time event.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Engine-wide constants
// ---------------------------------------------------------------------------

/// Lowest price a contract can trade at.
pub const MIN_PRICE: f64 = 0.01;
/// Highest price a contract can trade at.
pub const MAX_PRICE: f64 = 0.99;
/// Basis-point divisor.
pub const BPS_DIVISOR: f64 = 10_000.0;
/// How long a detected arbitrage opportunity stays actionable.
pub const ARBITRAGE_OPPORTUNITY_TTL_MS: u64 = 5_000;
/// Upper bound on a multi-leg execution, cancellation included.
pub const EXECUTION_TIMEOUT_MS: u64 = 5_000;
/// How long a cached top-of-book price is considered fresh.
pub const PRICE_CACHE_TTL_MS: u64 = 1_000;

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The two venues the engine trades on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// CLOB-based crypto-settled venue.
    Polymarket,
    /// Regulated API venue.
    Kalshi,
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polymarket => write!(f, "polymarket"),
            Self::Kalshi => write!(f, "kalshi"),
        }
    }
}

/// Stable identity of a market: `(platform, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketKey {
    pub platform: Platform,
    pub external_id: String,
}

impl MarketKey {
    pub fn new(platform: Platform, external_id: impl Into<String>) -> Self {
        Self {
            platform,
            external_id: external_id.into(),
        }
    }
}

impl std::fmt::Display for MarketKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.platform, self.external_id)
    }
}

// ---------------------------------------------------------------------------
// Markets & outcomes
// ---------------------------------------------------------------------------

/// Venue-reported lifecycle state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketStatus {
    Active,
    Closed,
    Resolved,
    Suspended,
}

/// The two sides of a binary contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeSide {
    Yes,
    No,
}

impl OutcomeSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Yes => Self::No,
            Self::No => Self::Yes,
        }
    }
}

impl std::fmt::Display for OutcomeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Yes => write!(f, "YES"),
            Self::No => write!(f, "NO"),
        }
    }
}

/// One tradeable outcome of a market, with its top of book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub external_id: String,
    pub name: String,
    pub side: OutcomeSide,
    /// Venue-reported probability in [0, 1].
    #[serde(default)]
    pub probability: f64,
    #[serde(default)]
    pub best_bid: f64,
    #[serde(default)]
    pub best_ask: f64,
    #[serde(default)]
    pub bid_size: f64,
    #[serde(default)]
    pub ask_size: f64,
}

/// A market normalized across venues. Primary key is `key` (platform plus the
/// venue's own id); binary markets carry exactly two outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedMarket {
    pub key: MarketKey,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub status: MarketStatus,
    /// Scheduled resolution time, when the venue publishes one.
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    #[serde(default)]
    pub volume_24h: f64,
    #[serde(default)]
    pub liquidity: f64,
    pub outcomes: Vec<Outcome>,
}

impl NormalizedMarket {
    /// The YES outcome of a binary market, if present.
    pub fn yes(&self) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.side == OutcomeSide::Yes)
    }

    /// The NO outcome of a binary market, if present.
    pub fn no(&self) -> Option<&Outcome> {
        self.outcomes.iter().find(|o| o.side == OutcomeSide::No)
    }

    /// True when this is a well-formed two-outcome binary market.
    pub fn is_binary(&self) -> bool {
        self.outcomes.len() == 2 && self.yes().is_some() && self.no().is_some()
    }

    /// Hours until the scheduled resolution, if an end date exists.
    pub fn hours_to_resolution(&self, now: DateTime<Utc>) -> Option<f64> {
        self.end_date
            .map(|end| (end - now).num_seconds() as f64 / 3600.0)
    }
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }

    /// +1.0 for buys, -1.0 for sells.
    pub fn sign(self) -> f64 {
        match self {
            Self::Buy => 1.0,
            Self::Sell => -1.0,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Time-in-force qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// Good-til-cancelled.
    Gtc,
    /// Good-til-date.
    Gtd,
    /// Fill-or-kill.
    Fok,
    /// Immediate-or-cancel.
    Ioc,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gtc => write!(f, "GTC"),
            Self::Gtd => write!(f, "GTD"),
            Self::Fok => write!(f, "FOK"),
            Self::Ioc => write!(f, "IOC"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Partial,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Partial => "partial",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// A tracked order. `id` is client-assigned before the venue ever sees the
/// request, so every order is addressable even if placement fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    #[serde(default)]
    pub filled_size: f64,
    #[serde(default)]
    pub avg_fill_price: f64,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub strategy_id: Option<String>,
    /// Operator-readable reason for a rejection, when there is one.
    #[serde(default)]
    pub reject_reason: Option<String>,
}

impl Order {
    /// Remaining unfilled size.
    pub fn remaining(&self) -> f64 {
        (self.size - self.filled_size).max(0.0)
    }
}

/// An immutable fill record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: String,
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
    /// Realized PnL when this fill reduced a position.
    #[serde(default)]
    pub realized_pnl: f64,
    pub executed_at: DateTime<Utc>,
    #[serde(default)]
    pub strategy_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Positions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    pub fn sign(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }
}

/// A net position per `(platform, market, outcome, strategy)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub platform: Platform,
    pub market_id: String,
    pub outcome_id: String,
    #[serde(default)]
    pub strategy_id: Option<String>,
    pub side: PositionSide,
    pub size: f64,
    pub avg_entry_price: f64,
    #[serde(default)]
    pub unrealized_pnl: f64,
    #[serde(default)]
    pub realized_pnl: f64,
    pub is_open: bool,
    pub opened_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
}

impl Position {
    /// Capital currently at risk, valued at entry.
    pub fn notional(&self) -> f64 {
        self.size * self.avg_entry_price
    }
}

// ---------------------------------------------------------------------------
// Balances
// ---------------------------------------------------------------------------

/// Balance snapshot for a venue account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub available: f64,
    pub locked: f64,
    pub total: f64,
    pub currency: String,
}

// ---------------------------------------------------------------------------
// Cross-venue market pairs
// ---------------------------------------------------------------------------

/// Whether the mapped outcomes agree in direction or are flipped
/// (venue-A YES corresponds to venue-B NO).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairPolarity {
    Same,
    Inverted,
}

/// Two markets on different venues judged to represent the same question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketPair {
    pub market_a: MarketKey,
    pub market_b: MarketKey,
    /// Matching confidence in [0, 1].
    pub confidence: f64,
    /// venue-A outcome id -> venue-B outcome id.
    pub outcome_map: Vec<(String, String)>,
    pub polarity: PairPolarity,
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(side: OutcomeSide, ask: f64) -> Outcome {
        Outcome {
            external_id: format!("o-{side}"),
            name: side.to_string(),
            side,
            probability: ask,
            best_bid: ask - 0.02,
            best_ask: ask,
            bid_size: 100.0,
            ask_size: 100.0,
        }
    }

    #[test]
    fn market_key_display_uses_platform_prefix() {
        let key = MarketKey::new(Platform::Polymarket, "0xabc");
        assert_eq!(key.to_string(), "polymarket:0xabc");
        let key = MarketKey::new(Platform::Kalshi, "FED-25DEC");
        assert_eq!(key.to_string(), "kalshi:FED-25DEC");
    }

    #[test]
    fn binary_market_detection() {
        let mut market = NormalizedMarket {
            key: MarketKey::new(Platform::Polymarket, "m1"),
            title: "Test".into(),
            description: String::new(),
            category: String::new(),
            status: MarketStatus::Active,
            end_date: None,
            is_active: true,
            volume_24h: 0.0,
            liquidity: 0.0,
            outcomes: vec![outcome(OutcomeSide::Yes, 0.6), outcome(OutcomeSide::No, 0.42)],
        };
        assert!(market.is_binary());
        assert_eq!(market.yes().unwrap().best_ask, 0.6);
        assert_eq!(market.no().unwrap().best_ask, 0.42);

        market.outcomes.pop();
        assert!(!market.is_binary());
    }

    #[test]
    fn hours_to_resolution_from_end_date() {
        let now = Utc::now();
        let market = NormalizedMarket {
            key: MarketKey::new(Platform::Kalshi, "m2"),
            title: "T".into(),
            description: String::new(),
            category: String::new(),
            status: MarketStatus::Active,
            end_date: Some(now + chrono::Duration::hours(24)),
            is_active: true,
            volume_24h: 0.0,
            liquidity: 0.0,
            outcomes: vec![],
        };
        let hours = market.hours_to_resolution(now).unwrap();
        assert!((hours - 24.0).abs() < 0.01);
    }

    #[test]
    fn order_side_sign_and_opposite() {
        assert_eq!(OrderSide::Buy.sign(), 1.0);
        assert_eq!(OrderSide::Sell.sign(), -1.0);
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OutcomeSide::Yes.opposite(), OutcomeSide::No);
    }

    #[test]
    fn terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::Partial.is_terminal());
    }

    #[test]
    fn order_remaining_never_negative() {
        let now = Utc::now();
        let order = Order {
            id: "o1".into(),
            platform: Platform::Polymarket,
            market_id: "m".into(),
            outcome_id: "y".into(),
            side: OrderSide::Buy,
            price: 0.5,
            size: 100.0,
            filled_size: 120.0,
            avg_fill_price: 0.5,
            order_type: OrderType::Ioc,
            status: OrderStatus::Filled,
            created_at: now,
            updated_at: now,
            strategy_id: None,
            reject_reason: None,
        };
        assert_eq!(order.remaining(), 0.0);
    }

    #[test]
    fn enum_serde_wire_format() {
        assert_eq!(
            serde_json::to_string(&Platform::Polymarket).unwrap(),
            "\"polymarket\""
        );
        assert_eq!(serde_json::to_string(&OutcomeSide::Yes).unwrap(), "\"YES\"");
        assert_eq!(
            serde_json::to_string(&OrderStatus::Partial).unwrap(),
            "\"partial\""
        );
    }
}
