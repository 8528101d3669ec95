// =============================================================================
// Kalshi client — regulated venue, bearer-token REST + sequenced WS deltas
// =============================================================================
//
// Kalshi quotes prices in integer cents (1..=99); normalization divides by
// 100 at the edge so the engine only ever sees (0, 1) prices. The orderbook
// endpoint returns resting bids per side; asks are reconstructed from the
// opposite side's complement (a NO bid at c cents is a YES ask at 100 - c).
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::VenueCredentials;
use crate::error::{EngineError, EngineResult};
use crate::market_data::{BookLevel, BookSide, OrderBook};
use crate::types::{
    Balance, MarketKey, MarketStatus, NormalizedMarket, Order, OrderSide, OrderStatus, OrderType,
    Outcome, OutcomeSide, Platform, Position, PositionSide,
};
use crate::venue::stream::{ReconnectBackoff, HEARTBEAT_INTERVAL, PONG_TIMEOUT};
use crate::venue::{
    ConnectionState, MarketFilter, OrderFilter, OrderRequest, OrderUpdate, VenueClient, VenueEvent,
    WalletActivity,
};

const DEFAULT_REST_URL: &str = "https://api.elections.kalshi.com/trade-api/v2";
const DEFAULT_WS_URL: &str = "wss://api.elections.kalshi.com/trade-api/ws/v2";

/// Regulated venue client.
pub struct KalshiClient {
    credentials: VenueCredentials,
    rest_url: String,
    ws_url: String,
    http: reqwest::Client,
    connected: AtomicBool,
    events_tx: broadcast::Sender<VenueEvent>,
}

impl KalshiClient {
    pub fn new(credentials: VenueCredentials) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        let (events_tx, _) = broadcast::channel(1024);

        Self {
            credentials,
            rest_url: DEFAULT_REST_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            http,
            connected: AtomicBool::new(false),
            events_tx,
        }
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> EngineResult<serde_json::Value> {
        let url = format!("{}{}", self.rest_url, path);
        let mut request = self
            .http
            .request(method, &url)
            .bearer_auth(&self.credentials.api_key);
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request.send().await.map_err(|e| EngineError::Transport {
            platform: Platform::Kalshi,
            message: format!("{path}: {e}"),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::Auth {
                platform: Platform::Kalshi,
                message: format!("{path} returned {status}"),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| EngineError::Protocol {
                platform: Platform::Kalshi,
                message: format!("{path}: invalid JSON: {e}"),
            })?;

        if !status.is_success() {
            return Err(EngineError::Transport {
                platform: Platform::Kalshi,
                message: format!("{path} returned {status}: {value}"),
            });
        }

        Ok(value)
    }

    async fn get_json(&self, path: &str) -> EngineResult<serde_json::Value> {
        self.request(reqwest::Method::GET, path, None).await
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    /// Run the market stream for `tickers` until cancelled, reconnecting with
    /// backoff and announcing state changes on the event bus.
    pub async fn run_market_stream(self: Arc<Self>, tickers: Vec<String>) {
        let mut backoff = ReconnectBackoff::new();

        loop {
            match self.stream_once(&tickers).await {
                Ok(()) => info!("kalshi market stream ended cleanly"),
                Err(e) => {
                    warn!(error = %e, "kalshi market stream error");
                    let _ = self.events_tx.send(VenueEvent::Error {
                        platform: Platform::Kalshi,
                        message: e.to_string(),
                    });
                }
            }

            let _ = self.events_tx.send(VenueEvent::StateChange {
                platform: Platform::Kalshi,
                state: ConnectionState::Reconnecting,
            });

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "reconnecting kalshi stream");
            tokio::time::sleep(delay).await;
        }
    }

    async fn stream_once(&self, tickers: &[String]) -> EngineResult<()> {
        let (ws, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| EngineError::Transport {
                platform: Platform::Kalshi,
                message: format!("ws connect: {e}"),
            })?;

        info!(markets = tickers.len(), "kalshi market stream connected");
        let _ = self.events_tx.send(VenueEvent::StateChange {
            platform: Platform::Kalshi,
            state: ConnectionState::Connected,
        });

        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::json!({
            "id": 1,
            "cmd": "subscribe",
            "params": {
                "channels": ["orderbook_delta", "trade", "fill"],
                "market_tickers": tickers,
            }
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| EngineError::Transport {
                platform: Platform::Kalshi,
                message: format!("ws subscribe: {e}"),
            })?;

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_pong = std::time::Instant::now();

        loop {
            tokio::select! {
                message = read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            match parse_stream_message(&text) {
                                Ok(Some(event)) => { let _ = self.events_tx.send(event); }
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, "unparseable kalshi message dropped"),
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = std::time::Instant::now();
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(EngineError::Transport {
                                platform: Platform::Kalshi,
                                message: format!("ws read: {e}"),
                            });
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if last_pong.elapsed() > HEARTBEAT_INTERVAL + PONG_TIMEOUT {
                        return Err(EngineError::Transport {
                            platform: Platform::Kalshi,
                            message: "pong timeout".to_string(),
                        });
                    }
                    write.send(Message::Ping(Vec::new())).await.map_err(|e| {
                        EngineError::Transport {
                            platform: Platform::Kalshi,
                            message: format!("ws ping: {e}"),
                        }
                    })?;
                }
            }
        }
    }
}

#[async_trait]
impl VenueClient for KalshiClient {
    fn platform(&self) -> Platform {
        Platform::Kalshi
    }

    async fn connect(&self) -> EngineResult<()> {
        self.get_json("/exchange/status").await?;
        self.connected.store(true, Ordering::SeqCst);
        info!("kalshi client connected");
        Ok(())
    }

    async fn disconnect(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(VenueEvent::StateChange {
            platform: Platform::Kalshi,
            state: ConnectionState::Disconnected,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_markets(&self, filter: &MarketFilter) -> EngineResult<Vec<NormalizedMarket>> {
        let mut path = String::from("/markets?");
        if filter.active_only {
            path.push_str("status=open&");
        }
        if let Some(limit) = filter.limit {
            path.push_str(&format!("limit={limit}&"));
        }
        let value = self.get_json(path.trim_end_matches(['&', '?'])).await?;
        let raw = value
            .get("markets")
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        let mut markets = Vec::with_capacity(raw.len());
        for entry in &raw {
            match parse_market(entry) {
                Ok(market) => {
                    if let Some(category) = &filter.category {
                        if !market.category.eq_ignore_ascii_case(category) {
                            continue;
                        }
                    }
                    markets.push(market);
                }
                Err(e) => warn!(error = %e, "skipping malformed kalshi market"),
            }
        }
        debug!(count = markets.len(), "kalshi markets fetched");
        Ok(markets)
    }

    async fn get_order_book(
        &self,
        market_id: &str,
        _outcome_id: Option<&str>,
    ) -> EngineResult<OrderBook> {
        let value = self
            .get_json(&format!("/markets/{market_id}/orderbook"))
            .await?;
        parse_book(market_id, &value)
    }

    async fn place_order(&self, request: &OrderRequest) -> EngineResult<Order> {
        // The venue takes the outcome side and a cent price.
        let body = serde_json::json!({
            "ticker": request.market_id,
            "action": request.side.to_string(),
            "side": request.outcome_id,
            "type": "limit",
            "count": request.size as u64,
            "yes_price": to_cents(request.price),
            "time_in_force": request.order_type.to_string(),
        });
        let value = self
            .request(reqwest::Method::POST, "/portfolio/orders", Some(body))
            .await?;

        let venue_id = value
            .get("order")
            .and_then(|o| o.get("order_id"))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let now = Utc::now();

        Ok(Order {
            id: venue_id,
            platform: Platform::Kalshi,
            market_id: request.market_id.clone(),
            outcome_id: request.outcome_id.clone(),
            side: request.side,
            price: request.price,
            size: request.size,
            filled_size: 0.0,
            avg_fill_price: 0.0,
            order_type: request.order_type,
            status: OrderStatus::Open,
            created_at: now,
            updated_at: now,
            strategy_id: request.strategy_id.clone(),
            reject_reason: None,
        })
    }

    async fn cancel_order(&self, order_id: &str) -> EngineResult<()> {
        self.request(
            reqwest::Method::DELETE,
            &format!("/portfolio/orders/{order_id}"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn get_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<Order>> {
        let mut path = String::from("/portfolio/orders");
        if let Some(market) = &filter.market_id {
            path.push_str(&format!("?ticker={market}"));
        }
        let value = self.get_json(&path).await?;
        let raw = value
            .get("orders")
            .and_then(|o| o.as_array())
            .cloned()
            .unwrap_or_default();

        let mut orders = Vec::with_capacity(raw.len());
        for entry in &raw {
            match parse_order(entry) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(error = %e, "skipping malformed kalshi order"),
            }
        }
        Ok(orders)
    }

    async fn get_positions(&self) -> EngineResult<Vec<Position>> {
        let value = self.get_json("/portfolio/positions").await?;
        let raw = value
            .get("market_positions")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();

        let mut positions = Vec::with_capacity(raw.len());
        for entry in &raw {
            let count = entry
                .get("position")
                .and_then(|v| v.as_i64())
                .unwrap_or(0);
            if count == 0 {
                continue;
            }
            positions.push(Position {
                platform: Platform::Kalshi,
                market_id: read_string(entry, "ticker"),
                outcome_id: "yes".to_string(),
                strategy_id: None,
                side: if count > 0 {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                },
                size: count.unsigned_abs() as f64,
                avg_entry_price: from_cents(
                    entry
                        .get("market_exposure")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0) as f64
                        / count.abs().max(1) as f64,
                ),
                unrealized_pnl: 0.0,
                realized_pnl: from_cents(
                    entry
                        .get("realized_pnl")
                        .and_then(|v| v.as_i64())
                        .unwrap_or(0) as f64,
                ),
                is_open: true,
                opened_at: Utc::now(),
                closed_at: None,
            });
        }
        Ok(positions)
    }

    async fn get_balance(&self) -> EngineResult<Balance> {
        let value = self.get_json("/portfolio/balance").await?;
        let available = from_cents(
            value.get("balance").and_then(|v| v.as_i64()).unwrap_or(0) as f64,
        );
        let locked = from_cents(
            value
                .get("payout_locked")
                .and_then(|v| v.as_i64())
                .unwrap_or(0) as f64,
        );
        Ok(Balance {
            available,
            locked,
            total: available + locked,
            currency: "USD".to_string(),
        })
    }

    async fn get_wallet_activity(
        &self,
        _wallet: &str,
        _limit: usize,
    ) -> EngineResult<Vec<WalletActivity>> {
        // Regulated venue exposes no public per-wallet tape.
        Ok(Vec::new())
    }

    fn subscribe_events(&self) -> broadcast::Receiver<VenueEvent> {
        self.events_tx.subscribe()
    }
}

impl std::fmt::Debug for KalshiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KalshiClient")
            .field("rest_url", &self.rest_url)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire parsing & cent conversion
// ---------------------------------------------------------------------------

fn read_string(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Venue cents (1..=99) to engine price in (0, 1).
fn from_cents(cents: f64) -> f64 {
    cents / 100.0
}

/// Engine price to venue cents.
fn to_cents(price: f64) -> u64 {
    (price * 100.0).round() as u64
}

fn protocol_error(message: impl Into<String>) -> EngineError {
    EngineError::Protocol {
        platform: Platform::Kalshi,
        message: message.into(),
    }
}

fn parse_market(entry: &serde_json::Value) -> EngineResult<NormalizedMarket> {
    let ticker = entry
        .get("ticker")
        .and_then(|v| v.as_str())
        .ok_or_else(|| protocol_error("market missing ticker"))?;

    let cents = |key: &str| -> f64 {
        from_cents(entry.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0))
    };

    let yes_bid = cents("yes_bid");
    let yes_ask = cents("yes_ask");
    let no_bid = cents("no_bid");
    let no_ask = cents("no_ask");

    let status = match read_string(entry, "status").as_str() {
        "active" | "open" => MarketStatus::Active,
        "closed" => MarketStatus::Closed,
        "settled" | "finalized" => MarketStatus::Resolved,
        _ => MarketStatus::Suspended,
    };

    let end_date = entry
        .get("close_time")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    let liquidity = from_cents(entry.get("liquidity").and_then(|v| v.as_f64()).unwrap_or(0.0));
    let volume_24h = entry
        .get("volume_24h")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);

    let outcomes = vec![
        Outcome {
            external_id: "yes".to_string(),
            name: "Yes".to_string(),
            side: OutcomeSide::Yes,
            probability: yes_ask,
            best_bid: yes_bid,
            best_ask: yes_ask,
            bid_size: 0.0,
            ask_size: 0.0,
        },
        Outcome {
            external_id: "no".to_string(),
            name: "No".to_string(),
            side: OutcomeSide::No,
            probability: no_ask,
            best_bid: no_bid,
            best_ask: no_ask,
            bid_size: 0.0,
            ask_size: 0.0,
        },
    ];

    Ok(NormalizedMarket {
        key: MarketKey::new(Platform::Kalshi, ticker),
        title: read_string(entry, "title"),
        description: read_string(entry, "subtitle"),
        category: read_string(entry, "category"),
        status,
        end_date,
        is_active: status == MarketStatus::Active,
        volume_24h,
        liquidity,
        outcomes,
    })
}

/// Parse `/markets/{ticker}/orderbook`.
///
/// Shape: `{"orderbook": {"yes": [[price_cents, size], ...], "no": [...]}}`
/// where each ladder holds resting bids for that side. Asks are the
/// complement of the opposite ladder.
fn parse_book(ticker: &str, value: &serde_json::Value) -> EngineResult<OrderBook> {
    let orderbook = value
        .get("orderbook")
        .ok_or_else(|| protocol_error("missing orderbook"))?;

    let ladder = |key: &str| -> Vec<BookLevel> {
        orderbook
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|pair| {
                        let level = pair.as_array()?;
                        Some(BookLevel {
                            price: from_cents(level.first()?.as_f64()?),
                            size: level.get(1)?.as_f64()?,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let yes_bids = ladder("yes");
    let no_bids = ladder("no");

    let complement = |levels: &[BookLevel]| -> Vec<BookLevel> {
        levels
            .iter()
            .map(|l| BookLevel {
                price: 1.0 - l.price,
                size: l.size,
            })
            .collect()
    };

    let mut yes = BookSide {
        bids: yes_bids.clone(),
        asks: complement(&no_bids),
    };
    let mut no = BookSide {
        bids: no_bids,
        asks: complement(&yes_bids),
    };
    yes.normalize();
    no.normalize();

    let seq = value.get("seq").and_then(|v| v.as_u64()).unwrap_or(0);

    Ok(OrderBook {
        market: MarketKey::new(Platform::Kalshi, ticker),
        yes,
        no,
        seq,
        timestamp: Utc::now(),
    })
}

/// Parse one streaming frame; `Ok(None)` for non-data frames.
fn parse_stream_message(text: &str) -> EngineResult<Option<VenueEvent>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| protocol_error(format!("bad JSON: {e}")))?;

    let msg = match value.get("msg") {
        Some(m) => m,
        None => return Ok(None),
    };

    match value.get("type").and_then(|v| v.as_str()) {
        Some("orderbook_snapshot") | Some("orderbook_delta") => {
            let ticker = read_string(msg, "market_ticker");
            let mut book = parse_book(&ticker, &serde_json::json!({ "orderbook": msg }))?;
            book.seq = value.get("seq").and_then(|v| v.as_u64()).unwrap_or(0);
            Ok(Some(VenueEvent::Book(book)))
        }
        Some("trade") => {
            let side = if read_string(msg, "taker_side") == "yes" {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            Ok(Some(VenueEvent::Trade(crate::venue::TapeTrade {
                platform: Platform::Kalshi,
                market_id: read_string(msg, "market_ticker"),
                outcome_id: "yes".to_string(),
                side,
                price: from_cents(msg.get("yes_price").and_then(|v| v.as_f64()).unwrap_or(0.0)),
                size: msg.get("count").and_then(|v| v.as_f64()).unwrap_or(0.0),
                at: Utc::now(),
            })))
        }
        Some("fill") => Ok(Some(VenueEvent::OrderUpdate(OrderUpdate {
            order_id: read_string(msg, "order_id"),
            status: if msg.get("remaining_count").and_then(|v| v.as_u64()) == Some(0) {
                OrderStatus::Filled
            } else {
                OrderStatus::Partial
            },
            filled_size: msg.get("count").and_then(|v| v.as_f64()).unwrap_or(0.0),
            avg_fill_price: from_cents(
                msg.get("yes_price").and_then(|v| v.as_f64()).unwrap_or(0.0),
            ),
            reason: None,
        }))),
        _ => Ok(None),
    }
}

fn parse_order(entry: &serde_json::Value) -> EngineResult<Order> {
    let id = entry
        .get("order_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| protocol_error("order missing order_id"))?;

    let side = if read_string(entry, "action").eq_ignore_ascii_case("buy") {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };
    let status = match read_string(entry, "status").as_str() {
        "resting" => OrderStatus::Open,
        "executed" => OrderStatus::Filled,
        "canceled" | "cancelled" => OrderStatus::Cancelled,
        _ => OrderStatus::Pending,
    };

    let size = entry
        .get("initial_count")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let remaining = entry
        .get("remaining_count")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let now = Utc::now();

    Ok(Order {
        id: id.to_string(),
        platform: Platform::Kalshi,
        market_id: read_string(entry, "ticker"),
        outcome_id: read_string(entry, "side"),
        side,
        price: from_cents(entry.get("yes_price").and_then(|v| v.as_f64()).unwrap_or(0.0)),
        size,
        filled_size: (size - remaining).max(0.0),
        avg_fill_price: from_cents(entry.get("yes_price").and_then(|v| v.as_f64()).unwrap_or(0.0)),
        order_type: OrderType::Gtc,
        status,
        created_at: now,
        updated_at: now,
        strategy_id: None,
        reject_reason: None,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cent_conversion_roundtrip() {
        assert_eq!(from_cents(62.0), 0.62);
        assert_eq!(to_cents(0.62), 62);
        assert_eq!(to_cents(from_cents(1.0)), 1);
        assert_eq!(to_cents(from_cents(99.0)), 99);
    }

    #[test]
    fn parse_market_divides_cents() {
        let raw = serde_json::json!({
            "ticker": "FED-25DEC-T4.75",
            "title": "Fed funds above 4.75% in December?",
            "subtitle": "Settles on the FOMC target range.",
            "category": "Economics",
            "status": "active",
            "yes_bid": 41, "yes_ask": 44,
            "no_bid": 56, "no_ask": 59,
            "volume_24h": 15000,
            "liquidity": 250000,
            "close_time": "2026-12-10T21:00:00Z"
        });
        let market = parse_market(&raw).unwrap();
        assert_eq!(market.key.platform, Platform::Kalshi);
        assert!(market.is_binary());
        assert_eq!(market.yes().unwrap().best_ask, 0.44);
        assert_eq!(market.no().unwrap().best_bid, 0.56);
        assert_eq!(market.status, MarketStatus::Active);
        assert!(market.end_date.is_some());
    }

    #[test]
    fn parse_book_builds_asks_from_opposite_bids() {
        let raw = serde_json::json!({
            "seq": 42,
            "orderbook": {
                "yes": [[40, 100], [38, 200]],
                "no": [[55, 150], [52, 300]]
            }
        });
        let book = parse_book("T", &raw).unwrap();
        assert_eq!(book.seq, 42);
        // Best YES bid: 40c.
        assert!((book.yes.best_bid().unwrap().price - 0.40).abs() < 1e-12);
        // Best YES ask = 1 - best NO bid = 1 - 0.55 = 0.45.
        assert!((book.yes.best_ask().unwrap().price - 0.45).abs() < 1e-12);
        assert_eq!(book.yes.best_ask().unwrap().size, 150.0);
        // Best NO ask = 1 - best YES bid = 0.60.
        assert!((book.no.best_ask().unwrap().price - 0.60).abs() < 1e-12);
    }

    #[test]
    fn parse_stream_snapshot_carries_outer_seq() {
        let text = serde_json::json!({
            "type": "orderbook_snapshot",
            "seq": 9,
            "msg": {
                "market_ticker": "T",
                "yes": [[50, 10]],
                "no": [[48, 20]]
            }
        })
        .to_string();
        match parse_stream_message(&text).unwrap() {
            Some(VenueEvent::Book(book)) => {
                assert_eq!(book.seq, 9);
                assert_eq!(book.market.external_id, "T");
            }
            other => panic!("expected book, got {other:?}"),
        }
    }

    #[test]
    fn parse_fill_terminal_when_nothing_remains() {
        let text = serde_json::json!({
            "type": "fill",
            "msg": {
                "order_id": "ord-1",
                "count": 25,
                "remaining_count": 0,
                "yes_price": 47
            }
        })
        .to_string();
        match parse_stream_message(&text).unwrap() {
            Some(VenueEvent::OrderUpdate(update)) => {
                assert_eq!(update.status, OrderStatus::Filled);
                assert_eq!(update.filled_size, 25.0);
                assert!((update.avg_fill_price - 0.47).abs() < 1e-12);
            }
            other => panic!("expected order update, got {other:?}"),
        }
    }

    #[test]
    fn non_data_frames_ignored() {
        let text = serde_json::json!({"type": "subscribed", "id": 1}).to_string();
        assert!(parse_stream_message(&text).unwrap().is_none());
    }
}
