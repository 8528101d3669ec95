// =============================================================================
// Polymarket CLOB client — HMAC-SHA256 signed requests
// =============================================================================
//
// SECURITY: the secret key is never logged or serialized. Signed requests
// carry the key id in a header and an HMAC of `timestamp + method + path +
// body` so replays outside the recv window are rejected venue-side.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures_util::{SinkExt, StreamExt};
use hmac::{Hmac, Mac};
use sha2::Sha256;
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

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_REST_URL: &str = "https://clob.polymarket.com";
const DEFAULT_WS_URL: &str = "wss://ws-subscriptions-clob.polymarket.com/ws/market";

/// CLOB venue client. Cheap to clone behind `Arc`.
pub struct PolymarketClient {
    credentials: VenueCredentials,
    rest_url: String,
    ws_url: String,
    http: reqwest::Client,
    connected: AtomicBool,
    events_tx: broadcast::Sender<VenueEvent>,
}

impl PolymarketClient {
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

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// HMAC-SHA256 hex signature over `timestamp + method + path + body`.
    fn sign(&self, timestamp_ms: u64, method: &str, path: &str, body: &str) -> String {
        let payload = format!("{timestamp_ms}{method}{path}{body}");
        let mut mac = HmacSha256::new_from_slice(self.credentials.api_secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        Utc::now().timestamp_millis() as u64
    }

    /// Issue a signed request and parse the JSON response body.
    async fn signed_request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> EngineResult<serde_json::Value> {
        let ts = Self::timestamp_ms();
        let body_text = body
            .as_ref()
            .map(|b| b.to_string())
            .unwrap_or_default();
        let signature = self.sign(ts, method.as_str(), path, &body_text);
        let url = format!("{}{}", self.rest_url, path);

        let mut request = self
            .http
            .request(method, &url)
            .header("POLY-API-KEY", &self.credentials.api_key)
            .header("POLY-TIMESTAMP", ts.to_string())
            .header("POLY-SIGNATURE", signature);
        if let Some(b) = body {
            request = request.json(&b);
        }

        let response = request.send().await.map_err(|e| EngineError::Transport {
            platform: Platform::Polymarket,
            message: format!("{path}: {e}"),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(EngineError::Auth {
                platform: Platform::Polymarket,
                message: format!("{path} returned {status}"),
            });
        }

        let value: serde_json::Value =
            response.json().await.map_err(|e| EngineError::Protocol {
                platform: Platform::Polymarket,
                message: format!("{path}: invalid JSON: {e}"),
            })?;

        if !status.is_success() {
            return Err(EngineError::Transport {
                platform: Platform::Polymarket,
                message: format!("{path} returned {status}: {value}"),
            });
        }

        Ok(value)
    }

    async fn get_json(&self, path: &str) -> EngineResult<serde_json::Value> {
        self.signed_request(reqwest::Method::GET, path, None).await
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    /// Run the market-data stream for `market_ids` until cancelled.
    ///
    /// Reconnects with exponential backoff; on every reconnect a
    /// `StateChange` event lets the book store mark cached books stale.
    pub async fn run_market_stream(self: Arc<Self>, market_ids: Vec<String>) {
        let mut backoff = ReconnectBackoff::new();

        loop {
            match self.stream_once(&market_ids).await {
                Ok(()) => {
                    info!("polymarket market stream ended cleanly");
                }
                Err(e) => {
                    warn!(error = %e, "polymarket market stream error");
                    let _ = self.events_tx.send(VenueEvent::Error {
                        platform: Platform::Polymarket,
                        message: e.to_string(),
                    });
                }
            }

            let _ = self.events_tx.send(VenueEvent::StateChange {
                platform: Platform::Polymarket,
                state: ConnectionState::Reconnecting,
            });

            let delay = backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "reconnecting polymarket stream");
            tokio::time::sleep(delay).await;
        }
    }

    async fn stream_once(&self, market_ids: &[String]) -> EngineResult<()> {
        let (ws, _) = connect_async(&self.ws_url)
            .await
            .map_err(|e| EngineError::Transport {
                platform: Platform::Polymarket,
                message: format!("ws connect: {e}"),
            })?;

        info!(markets = market_ids.len(), "polymarket market stream connected");
        let _ = self.events_tx.send(VenueEvent::StateChange {
            platform: Platform::Polymarket,
            state: ConnectionState::Connected,
        });

        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::json!({
            "type": "market",
            "assets_ids": market_ids,
        });
        write
            .send(Message::Text(subscribe.to_string()))
            .await
            .map_err(|e| EngineError::Transport {
                platform: Platform::Polymarket,
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
                            match parse_market_message(&text) {
                                Ok(Some(event)) => { let _ = self.events_tx.send(event); }
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, "unparseable polymarket message dropped"),
                            }
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_pong = std::time::Instant::now();
                        }
                        Some(Ok(Message::Ping(payload))) => {
                            let _ = write.send(Message::Pong(payload)).await;
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return Err(EngineError::Transport {
                                platform: Platform::Polymarket,
                                message: format!("ws read: {e}"),
                            });
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if last_pong.elapsed() > HEARTBEAT_INTERVAL + PONG_TIMEOUT {
                        return Err(EngineError::Transport {
                            platform: Platform::Polymarket,
                            message: "pong timeout".to_string(),
                        });
                    }
                    write.send(Message::Ping(Vec::new())).await.map_err(|e| {
                        EngineError::Transport {
                            platform: Platform::Polymarket,
                            message: format!("ws ping: {e}"),
                        }
                    })?;
                }
            }
        }
    }
}

#[async_trait]
impl VenueClient for PolymarketClient {
    fn platform(&self) -> Platform {
        Platform::Polymarket
    }

    async fn connect(&self) -> EngineResult<()> {
        // REST is stateless; verify credentials with a lightweight call.
        self.get_json("/auth/ban-status").await?;
        self.connected.store(true, Ordering::SeqCst);
        info!("polymarket client connected");
        Ok(())
    }

    async fn disconnect(&self) -> EngineResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        let _ = self.events_tx.send(VenueEvent::StateChange {
            platform: Platform::Polymarket,
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
            path.push_str("active=true&");
        }
        if let Some(limit) = filter.limit {
            path.push_str(&format!("limit={limit}&"));
        }
        let value = self.get_json(path.trim_end_matches(['&', '?'])).await?;
        let raw = value
            .get("data")
            .and_then(|d| d.as_array())
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
                Err(e) => warn!(error = %e, "skipping malformed polymarket market"),
            }
        }
        debug!(count = markets.len(), "polymarket markets fetched");
        Ok(markets)
    }

    async fn get_order_book(
        &self,
        market_id: &str,
        _outcome_id: Option<&str>,
    ) -> EngineResult<OrderBook> {
        let value = self.get_json(&format!("/book?market={market_id}")).await?;
        parse_book(market_id, &value)
    }

    async fn place_order(&self, request: &OrderRequest) -> EngineResult<Order> {
        let body = serde_json::json!({
            "market": request.market_id,
            "asset_id": request.outcome_id,
            "side": request.side.to_string().to_uppercase(),
            "price": request.price,
            "size": request.size,
            "order_type": request.order_type.to_string(),
        });
        let value = self
            .signed_request(reqwest::Method::POST, "/order", Some(body))
            .await?;

        let venue_id = value
            .get("orderID")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let now = Utc::now();

        Ok(Order {
            id: venue_id,
            platform: Platform::Polymarket,
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
        let body = serde_json::json!({ "orderID": order_id });
        self.signed_request(reqwest::Method::DELETE, "/order", Some(body))
            .await?;
        Ok(())
    }

    async fn get_orders(&self, filter: &OrderFilter) -> EngineResult<Vec<Order>> {
        let mut path = String::from("/orders");
        if let Some(market) = &filter.market_id {
            path.push_str(&format!("?market={market}"));
        }
        let value = self.get_json(&path).await?;
        let raw = value.as_array().cloned().unwrap_or_default();
        let mut orders = Vec::with_capacity(raw.len());
        for entry in &raw {
            match parse_order(entry) {
                Ok(order) => orders.push(order),
                Err(e) => warn!(error = %e, "skipping malformed polymarket order"),
            }
        }
        Ok(orders)
    }

    async fn get_positions(&self) -> EngineResult<Vec<Position>> {
        let value = self.get_json("/positions").await?;
        let raw = value.as_array().cloned().unwrap_or_default();
        let mut positions = Vec::with_capacity(raw.len());
        for entry in &raw {
            let size = read_f64(entry, "size");
            if size == 0.0 {
                continue;
            }
            positions.push(Position {
                platform: Platform::Polymarket,
                market_id: read_string(entry, "market"),
                outcome_id: read_string(entry, "asset_id"),
                strategy_id: None,
                side: if size >= 0.0 {
                    PositionSide::Long
                } else {
                    PositionSide::Short
                },
                size: size.abs(),
                avg_entry_price: read_f64(entry, "avgPrice"),
                unrealized_pnl: read_f64(entry, "cashPnl"),
                realized_pnl: read_f64(entry, "realizedPnl"),
                is_open: true,
                opened_at: Utc::now(),
                closed_at: None,
            });
        }
        Ok(positions)
    }

    async fn get_balance(&self) -> EngineResult<Balance> {
        let value = self.get_json("/balance-allowance?asset_type=COLLATERAL").await?;
        let available = read_f64(&value, "balance");
        let locked = read_f64(&value, "locked");
        Ok(Balance {
            available,
            locked,
            total: available + locked,
            currency: "USDC".to_string(),
        })
    }

    async fn get_wallet_activity(
        &self,
        wallet: &str,
        limit: usize,
    ) -> EngineResult<Vec<WalletActivity>> {
        let value = self
            .get_json(&format!("/activity?user={wallet}&limit={limit}"))
            .await?;
        let raw = value.as_array().cloned().unwrap_or_default();
        let mut activities = Vec::with_capacity(raw.len());
        for entry in &raw {
            match parse_wallet_activity(wallet, entry) {
                Ok(activity) => activities.push(activity),
                Err(e) => warn!(error = %e, "skipping malformed wallet activity"),
            }
        }
        Ok(activities)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<VenueEvent> {
        self.events_tx.subscribe()
    }
}

impl std::fmt::Debug for PolymarketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolymarketClient")
            .field("rest_url", &self.rest_url)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Wire parsing
// ---------------------------------------------------------------------------

fn read_string(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Read a field that may be a JSON number or a stringified number.
fn read_f64(value: &serde_json::Value, key: &str) -> f64 {
    match value.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

fn protocol_error(message: impl Into<String>) -> EngineError {
    EngineError::Protocol {
        platform: Platform::Polymarket,
        message: message.into(),
    }
}

/// Normalize one market entry from `GET /markets`.
fn parse_market(entry: &serde_json::Value) -> EngineResult<NormalizedMarket> {
    let id = entry
        .get("condition_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| protocol_error("market missing condition_id"))?;

    let tokens = entry
        .get("tokens")
        .and_then(|v| v.as_array())
        .ok_or_else(|| protocol_error("market missing tokens"))?;

    let mut outcomes = Vec::with_capacity(tokens.len());
    for token in tokens {
        let name = read_string(token, "outcome");
        let side = if name.eq_ignore_ascii_case("yes") {
            OutcomeSide::Yes
        } else {
            OutcomeSide::No
        };
        outcomes.push(Outcome {
            external_id: read_string(token, "token_id"),
            name,
            side,
            probability: read_f64(token, "price"),
            best_bid: read_f64(token, "best_bid"),
            best_ask: read_f64(token, "best_ask"),
            bid_size: read_f64(token, "bid_size"),
            ask_size: read_f64(token, "ask_size"),
        });
    }

    let active = entry
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let closed = entry
        .get("closed")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let status = if closed {
        MarketStatus::Closed
    } else if active {
        MarketStatus::Active
    } else {
        MarketStatus::Suspended
    };

    let end_date = entry
        .get("end_date_iso")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(NormalizedMarket {
        key: MarketKey::new(Platform::Polymarket, id),
        title: read_string(entry, "question"),
        description: read_string(entry, "description"),
        category: read_string(entry, "category"),
        status,
        end_date,
        is_active: active && !closed,
        volume_24h: read_f64(entry, "volume24hr"),
        liquidity: read_f64(entry, "liquidity"),
        outcomes,
    })
}

/// Parse a `GET /book` response into a two-sided book.
///
/// The venue returns one ladder per token; the NO side is reconstructed from
/// the YES ladder's complement when absent.
fn parse_book(market_id: &str, value: &serde_json::Value) -> EngineResult<OrderBook> {
    let seq = value
        .get("hash")
        .and_then(|v| v.as_str())
        .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
        .or_else(|| value.get("seq").and_then(|v| v.as_u64()))
        .unwrap_or(0);

    let parse_side = |key: &str| -> BookSide {
        let levels = |k: &str| -> Vec<BookLevel> {
            value
                .get(key)
                .and_then(|s| s.get(k))
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .map(|l| BookLevel {
                            price: read_f64(l, "price"),
                            size: read_f64(l, "size"),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut side = BookSide {
            bids: levels("bids"),
            asks: levels("asks"),
        };
        side.normalize();
        side
    };

    let yes = parse_side("yes");
    let mut no = parse_side("no");

    // Complement reconstruction: a YES bid at p is a NO ask at 1-p.
    if no.bids.is_empty() && no.asks.is_empty() {
        no = BookSide {
            bids: yes
                .asks
                .iter()
                .map(|l| BookLevel {
                    price: 1.0 - l.price,
                    size: l.size,
                })
                .collect(),
            asks: yes
                .bids
                .iter()
                .map(|l| BookLevel {
                    price: 1.0 - l.price,
                    size: l.size,
                })
                .collect(),
        };
        no.normalize();
    }

    Ok(OrderBook {
        market: MarketKey::new(Platform::Polymarket, market_id),
        yes,
        no,
        seq,
        timestamp: Utc::now(),
    })
}

/// Parse one streaming message; returns `Ok(None)` for non-data frames.
fn parse_market_message(text: &str) -> EngineResult<Option<VenueEvent>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| protocol_error(format!("bad JSON: {e}")))?;

    match value.get("event_type").and_then(|v| v.as_str()) {
        Some("book") => {
            let market_id = read_string(&value, "market");
            let book = parse_book(&market_id, &value)?;
            Ok(Some(VenueEvent::Book(book)))
        }
        Some("last_trade_price") => {
            let side = if read_string(&value, "side").eq_ignore_ascii_case("buy") {
                OrderSide::Buy
            } else {
                OrderSide::Sell
            };
            Ok(Some(VenueEvent::Trade(crate::venue::TapeTrade {
                platform: Platform::Polymarket,
                market_id: read_string(&value, "market"),
                outcome_id: read_string(&value, "asset_id"),
                side,
                price: read_f64(&value, "price"),
                size: read_f64(&value, "size"),
                at: Utc::now(),
            })))
        }
        Some("order_update") => Ok(Some(VenueEvent::OrderUpdate(OrderUpdate {
            order_id: read_string(&value, "orderID"),
            status: parse_order_status(&read_string(&value, "status")),
            filled_size: read_f64(&value, "size_matched"),
            avg_fill_price: read_f64(&value, "price"),
            reason: value
                .get("reason")
                .and_then(|v| v.as_str())
                .map(String::from),
        }))),
        _ => Ok(None),
    }
}

fn parse_order_status(raw: &str) -> OrderStatus {
    match raw.to_ascii_lowercase().as_str() {
        "live" | "open" => OrderStatus::Open,
        "matched" | "filled" => OrderStatus::Filled,
        "partial" | "partially_matched" => OrderStatus::Partial,
        "cancelled" | "canceled" => OrderStatus::Cancelled,
        "rejected" | "invalid" => OrderStatus::Rejected,
        _ => OrderStatus::Pending,
    }
}

fn parse_order(entry: &serde_json::Value) -> EngineResult<Order> {
    let id = entry
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| protocol_error("order missing id"))?;
    let side = if read_string(entry, "side").eq_ignore_ascii_case("buy") {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };
    let now = Utc::now();
    Ok(Order {
        id: id.to_string(),
        platform: Platform::Polymarket,
        market_id: read_string(entry, "market"),
        outcome_id: read_string(entry, "asset_id"),
        side,
        price: read_f64(entry, "price"),
        size: read_f64(entry, "original_size"),
        filled_size: read_f64(entry, "size_matched"),
        avg_fill_price: read_f64(entry, "price"),
        order_type: OrderType::Gtc,
        status: parse_order_status(&read_string(entry, "status")),
        created_at: now,
        updated_at: now,
        strategy_id: None,
        reject_reason: None,
    })
}

fn parse_wallet_activity(
    wallet: &str,
    entry: &serde_json::Value,
) -> EngineResult<WalletActivity> {
    let hash = entry
        .get("transactionHash")
        .and_then(|v| v.as_str())
        .ok_or_else(|| protocol_error("activity missing transactionHash"))?;
    let side = if read_string(entry, "side").eq_ignore_ascii_case("buy") {
        OrderSide::Buy
    } else {
        OrderSide::Sell
    };
    let price = read_f64(entry, "price");
    let size = read_f64(entry, "size");
    let at = entry
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now);

    Ok(WalletActivity {
        transaction_hash: hash.to_string(),
        wallet: wallet.to_string(),
        market_id: read_string(entry, "conditionId"),
        outcome_id: read_string(entry, "asset"),
        side,
        price,
        size,
        usd_value: price * size,
        at,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_secret_dependent() {
        let client = PolymarketClient::new(VenueCredentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
            extra: serde_json::Value::Null,
        });
        let a = client.sign(1_700_000_000_000, "GET", "/markets", "");
        let b = client.sign(1_700_000_000_000, "GET", "/markets", "");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 hex

        let other = PolymarketClient::new(VenueCredentials {
            api_key: "key".into(),
            api_secret: "other-secret".into(),
            extra: serde_json::Value::Null,
        });
        assert_ne!(a, other.sign(1_700_000_000_000, "GET", "/markets", ""));
    }

    #[test]
    fn parse_market_normalizes_outcomes() {
        let raw = serde_json::json!({
            "condition_id": "0xcafe",
            "question": "Will it rain tomorrow?",
            "description": "Resolution per local weather service.",
            "category": "Weather",
            "active": true,
            "closed": false,
            "end_date_iso": "2026-09-01T00:00:00Z",
            "volume24hr": "12345.5",
            "liquidity": 9000.0,
            "tokens": [
                {"token_id": "t-yes", "outcome": "Yes", "price": 0.62,
                 "best_bid": 0.61, "best_ask": 0.63, "bid_size": 150.0, "ask_size": 200.0},
                {"token_id": "t-no", "outcome": "No", "price": 0.38,
                 "best_bid": 0.37, "best_ask": 0.39, "bid_size": 90.0, "ask_size": 80.0}
            ]
        });
        let market = parse_market(&raw).unwrap();
        assert_eq!(market.key.external_id, "0xcafe");
        assert_eq!(market.key.platform, Platform::Polymarket);
        assert!(market.is_binary());
        assert!(market.is_active);
        assert_eq!(market.status, MarketStatus::Active);
        assert_eq!(market.volume_24h, 12345.5);
        assert_eq!(market.yes().unwrap().best_ask, 0.63);
        assert_eq!(market.no().unwrap().ask_size, 80.0);
        assert!(market.end_date.is_some());
    }

    #[test]
    fn parse_market_requires_condition_id() {
        let raw = serde_json::json!({ "question": "?" });
        assert!(parse_market(&raw).is_err());
    }

    #[test]
    fn parse_book_reconstructs_no_side_from_complement() {
        let raw = serde_json::json!({
            "seq": 7,
            "yes": {
                "bids": [{"price": 0.48, "size": 100.0}],
                "asks": [{"price": 0.52, "size": 150.0}]
            }
        });
        let book = parse_book("m1", &raw).unwrap();
        assert_eq!(book.seq, 7);
        assert_eq!(book.yes.best_bid().unwrap().price, 0.48);
        // NO bid mirrors the YES ask: 1 - 0.52 = 0.48.
        assert!((book.no.best_bid().unwrap().price - 0.48).abs() < 1e-12);
        // NO ask mirrors the YES bid: 1 - 0.48 = 0.52.
        assert!((book.no.best_ask().unwrap().price - 0.52).abs() < 1e-12);
        assert_eq!(book.no.best_ask().unwrap().size, 100.0);
    }

    #[test]
    fn parse_stream_book_message() {
        let text = serde_json::json!({
            "event_type": "book",
            "market": "m1",
            "seq": 3,
            "yes": {
                "bids": [{"price": "0.45", "size": "10"}],
                "asks": [{"price": "0.55", "size": "20"}]
            },
            "no": {
                "bids": [{"price": "0.45", "size": "5"}],
                "asks": [{"price": "0.55", "size": "5"}]
            }
        })
        .to_string();
        match parse_market_message(&text).unwrap() {
            Some(VenueEvent::Book(book)) => {
                assert_eq!(book.market.external_id, "m1");
                assert_eq!(book.seq, 3);
                assert_eq!(book.yes.best_bid().unwrap().price, 0.45);
            }
            other => panic!("expected book event, got {other:?}"),
        }
    }

    #[test]
    fn non_data_frames_are_ignored() {
        let text = serde_json::json!({"event_type": "subscribed"}).to_string();
        assert!(parse_market_message(&text).unwrap().is_none());
        assert!(parse_market_message("not json").is_err());
    }

    #[test]
    fn order_status_mapping() {
        assert_eq!(parse_order_status("LIVE"), OrderStatus::Open);
        assert_eq!(parse_order_status("matched"), OrderStatus::Filled);
        assert_eq!(parse_order_status("canceled"), OrderStatus::Cancelled);
        assert_eq!(parse_order_status("whatever"), OrderStatus::Pending);
    }

    #[test]
    fn wallet_activity_carries_usd_value() {
        let raw = serde_json::json!({
            "transactionHash": "0xdead",
            "conditionId": "m9",
            "asset": "t-yes",
            "side": "BUY",
            "price": 0.40,
            "size": 250.0,
            "timestamp": 1_700_000_000
        });
        let activity = parse_wallet_activity("0xwhale", &raw).unwrap();
        assert_eq!(activity.transaction_hash, "0xdead");
        assert_eq!(activity.side, OrderSide::Buy);
        assert!((activity.usd_value - 100.0).abs() < 1e-12);
    }
}
