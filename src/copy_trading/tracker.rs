// =============================================================================
// Copy Trader — wallet polling, aggregation, and sized mirroring
// =============================================================================
//
// One poller per tracked wallet fetches recent activity (15 s cadence with
// jitter), dedupes by transaction hash, and either mirrors each trade
// directly or pushes it into a per-(wallet, market, outcome, side) bucket.
// Buckets fire on `min_trades` or when their window elapses, collapsing the
// burst into one synthetic order at the size-weighted average price. Mirrored
// positions update on actual fills, not on placement.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::config::TraderCopyConfig;
use crate::copy_trading::positions::{CopyPositionBook, PositionChange};
use crate::copy_trading::sizing::{calculate_size, SizingCalculation};
use crate::copy_trading::{AggregatedTrade, CopyEvent, DetectedTrade};
use crate::orders::manager::OrderStatusChanged;
use crate::orders::OrderManager;
use crate::types::{OrderSide, OrderType, Platform};
use crate::venue::{OrderRequest, VenueClient, WalletActivity};

/// Activities fetched per poll.
const ACTIVITY_FETCH_LIMIT: usize = 50;
/// Fallback balance when no venue balance is reachable.
const FALLBACK_BALANCE_USD: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BucketKey {
    wallet: String,
    market_id: String,
    outcome_id: String,
    side: OrderSide,
}

struct Bucket {
    trades: Vec<DetectedTrade>,
    started_at_ms: u64,
    window_ms: u64,
    min_trades: usize,
}

pub struct CopyTrader {
    configs: Vec<TraderCopyConfig>,
    client: Arc<dyn VenueClient>,
    orders: Arc<OrderManager>,
    positions: Arc<CopyPositionBook>,
    clock: SharedClock,
    poll_interval_ms: u64,
    seen_hashes: RwLock<HashSet<String>>,
    buckets: RwLock<HashMap<BucketKey, Bucket>>,
    /// order id -> (wallet, market, outcome, side) for fill attribution.
    mirrored_orders: RwLock<HashMap<String, (String, String, String, OrderSide)>>,
    /// order id -> cumulative fill already applied.
    applied_fills: RwLock<HashMap<String, f64>>,
    events_tx: broadcast::Sender<CopyEvent>,
}

impl CopyTrader {
    pub fn new(
        configs: Vec<TraderCopyConfig>,
        client: Arc<dyn VenueClient>,
        orders: Arc<OrderManager>,
        clock: SharedClock,
        poll_interval_ms: u64,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            configs,
            client,
            orders,
            positions: Arc::new(CopyPositionBook::new()),
            clock,
            poll_interval_ms,
            seen_hashes: RwLock::new(HashSet::new()),
            buckets: RwLock::new(HashMap::new()),
            mirrored_orders: RwLock::new(HashMap::new()),
            applied_fills: RwLock::new(HashMap::new()),
            events_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CopyEvent> {
        self.events_tx.subscribe()
    }

    pub fn positions(&self) -> Arc<CopyPositionBook> {
        self.positions.clone()
    }

    // -------------------------------------------------------------------------
    // Task entry points
    // -------------------------------------------------------------------------

    /// Spawn one poller per tracked wallet plus the fill listener. Runs until
    /// the process exits.
    pub fn start(self: &Arc<Self>) {
        if self.configs.is_empty() {
            info!("copy trading idle — no tracked wallets configured");
            return;
        }

        // Fill listener attributes order fills back to copy positions.
        {
            let tracker = self.clone();
            let mut rx = self.orders.subscribe();
            tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    tracker.handle_order_event(&event);
                }
            });
        }

        for config in self.configs.clone() {
            let tracker = self.clone();
            tokio::spawn(async move {
                info!(wallet = %config.wallet, "wallet poller started");
                loop {
                    let jitter =
                        rand::thread_rng().gen_range(0..=tracker.poll_interval_ms / 10);
                    tokio::time::sleep(Duration::from_millis(
                        tracker.poll_interval_ms + jitter,
                    ))
                    .await;
                    tracker.poll_once(&config).await;
                }
            });
        }
        info!(wallets = self.configs.len(), "copy trading started");
    }

    /// One polling cycle for one wallet.
    pub async fn poll_once(&self, config: &TraderCopyConfig) {
        match self
            .client
            .get_wallet_activity(&config.wallet, ACTIVITY_FETCH_LIMIT)
            .await
        {
            Ok(activities) => self.ingest_activities(config, activities).await,
            Err(e) => warn!(wallet = %config.wallet, error = %e, "wallet activity fetch failed"),
        }
        self.flush_due_buckets(config).await;
    }

    // -------------------------------------------------------------------------
    // Detection & aggregation
    // -------------------------------------------------------------------------

    /// Process a batch of wallet activities (deduped by transaction hash).
    pub async fn ingest_activities(
        &self,
        config: &TraderCopyConfig,
        activities: Vec<WalletActivity>,
    ) {
        for activity in activities {
            if activity.price <= 0.0 || activity.size <= 0.0 {
                continue;
            }
            {
                let mut seen = self.seen_hashes.write();
                if !seen.insert(activity.transaction_hash.clone()) {
                    continue;
                }
            }

            let detected = DetectedTrade {
                id: Uuid::new_v4().to_string(),
                wallet: activity.wallet.clone(),
                platform: self.client.platform(),
                market_id: activity.market_id.clone(),
                outcome_id: activity.outcome_id.clone(),
                side: activity.side,
                price: activity.price,
                size: activity.size,
                usd_value: activity.usd_value,
                transaction_hash: activity.transaction_hash.clone(),
                detected_at_ms: self.clock.now_ms(),
            };
            debug!(
                wallet = %detected.wallet,
                market_id = %detected.market_id,
                side = %detected.side,
                usd = detected.usd_value,
                "trade detected"
            );
            let _ = self.events_tx.send(CopyEvent::TradeDetected(detected.clone()));

            if config.aggregation.enabled {
                self.push_bucket(config, detected).await;
            } else {
                self.mirror(
                    config,
                    detected.platform,
                    &detected.market_id,
                    &detected.outcome_id,
                    detected.side,
                    detected.price,
                    detected.usd_value,
                )
                .await;
            }
        }
    }

    async fn push_bucket(&self, config: &TraderCopyConfig, detected: DetectedTrade) {
        let key = BucketKey {
            wallet: detected.wallet.clone(),
            market_id: detected.market_id.clone(),
            outcome_id: detected.outcome_id.clone(),
            side: detected.side,
        };
        let fire = {
            let mut buckets = self.buckets.write();
            let bucket = buckets.entry(key.clone()).or_insert_with(|| Bucket {
                trades: Vec::new(),
                started_at_ms: self.clock.now_ms(),
                window_ms: config.aggregation.window_ms,
                min_trades: config.aggregation.min_trades,
            });
            bucket.trades.push(detected);
            if bucket.trades.len() >= bucket.min_trades {
                buckets.remove(&key)
            } else {
                None
            }
        };
        if let Some(bucket) = fire {
            self.fire_bucket(config, bucket).await;
        }
    }

    /// Fire buckets whose window has elapsed.
    pub async fn flush_due_buckets(&self, config: &TraderCopyConfig) {
        let now = self.clock.now_ms();
        let due: Vec<Bucket> = {
            let mut buckets = self.buckets.write();
            let keys: Vec<BucketKey> = buckets
                .iter()
                .filter(|(k, b)| {
                    k.wallet == config.wallet
                        && now.saturating_sub(b.started_at_ms) >= b.window_ms
                })
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter().filter_map(|k| buckets.remove(&k)).collect()
        };
        for bucket in due {
            self.fire_bucket(config, bucket).await;
        }
    }

    async fn fire_bucket(&self, config: &TraderCopyConfig, bucket: Bucket) {
        let Some(aggregated) = aggregate(&bucket) else {
            return;
        };
        info!(
            wallet = %aggregated.wallet,
            market_id = %aggregated.market_id,
            trades = aggregated.trade_count,
            total_size = aggregated.total_size,
            avg_price = aggregated.avg_price,
            "aggregation bucket fired"
        );
        self.mirror(
            config,
            aggregated.platform,
            &aggregated.market_id,
            &aggregated.outcome_id,
            aggregated.side,
            aggregated.avg_price,
            aggregated.usd_value,
        )
        .await;
    }

    // -------------------------------------------------------------------------
    // Mirroring
    // -------------------------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    async fn mirror(
        &self,
        config: &TraderCopyConfig,
        platform: Platform,
        market_id: &str,
        outcome_id: &str,
        side: OrderSide,
        price: f64,
        trader_usd: f64,
    ) {
        let balance = self.available_balance().await;
        let sizing = calculate_size(config, trader_usd, balance);
        let size_usd = match sizing {
            SizingCalculation::Copy { size_usd } => size_usd,
            SizingCalculation::Skip { reason } => {
                debug!(wallet = %config.wallet, market_id, %reason, "copy skipped");
                let _ = self.events_tx.send(CopyEvent::TradeSkipped {
                    wallet: config.wallet.clone(),
                    market_id: market_id.to_string(),
                    reason,
                });
                return;
            }
        };

        let contracts = size_usd / price;
        let request = OrderRequest {
            platform,
            market_id: market_id.to_string(),
            outcome_id: outcome_id.to_string(),
            side,
            price,
            size: contracts,
            order_type: OrderType::Ioc,
            strategy_id: Some(format!("copy:{}", config.wallet)),
        };

        match self.orders.place_order(request).await {
            Ok(order) if order.status == crate::types::OrderStatus::Rejected => {
                let reason = order
                    .reject_reason
                    .unwrap_or_else(|| "order rejected".to_string());
                let _ = self.events_tx.send(CopyEvent::TradeSkipped {
                    wallet: config.wallet.clone(),
                    market_id: market_id.to_string(),
                    reason,
                });
            }
            Ok(order) => {
                self.mirrored_orders.write().insert(
                    order.id.clone(),
                    (
                        config.wallet.clone(),
                        market_id.to_string(),
                        outcome_id.to_string(),
                        side,
                    ),
                );
                let _ = self.events_tx.send(CopyEvent::TradeCopied {
                    wallet: config.wallet.clone(),
                    market_id: market_id.to_string(),
                    order_id: order.id,
                    size_usd,
                });
            }
            Err(e) => {
                warn!(wallet = %config.wallet, market_id, error = %e, "mirror order failed");
                let _ = self.events_tx.send(CopyEvent::TradeSkipped {
                    wallet: config.wallet.clone(),
                    market_id: market_id.to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    async fn available_balance(&self) -> f64 {
        if let Some(paper) = self.orders.paper_engine() {
            return paper.balance();
        }
        match self.client.get_balance().await {
            Ok(balance) => balance.available,
            Err(_) => FALLBACK_BALANCE_USD,
        }
    }

    // -------------------------------------------------------------------------
    // Fill attribution
    // -------------------------------------------------------------------------

    /// Apply a fill delta from the order manager to the copy-position book.
    pub fn handle_order_event(&self, event: &OrderStatusChanged) {
        let meta = {
            let mirrored = self.mirrored_orders.read();
            mirrored.get(&event.order.id).cloned()
        };
        let Some((wallet, market_id, outcome_id, side)) = meta else {
            return;
        };

        let delta = {
            let mut applied = self.applied_fills.write();
            let prior = applied.get(&event.order.id).copied().unwrap_or(0.0);
            let delta = event.order.filled_size - prior;
            if delta <= 0.0 {
                return;
            }
            applied.insert(event.order.id.clone(), event.order.filled_size);
            delta
        };

        let price = event.order.avg_fill_price;
        let now = self.clock.now_ms();
        let change = match side {
            OrderSide::Buy => {
                let (change, position) =
                    self.positions
                        .record_buy(&wallet, &market_id, &outcome_id, price, delta, now);
                Some((change, position))
            }
            OrderSide::Sell => self
                .positions
                .record_sell(&wallet, &market_id, &outcome_id, price, delta)
                .map(|(change, position, _)| (change, position)),
        };

        if let Some((change, position)) = change {
            let event = match change {
                PositionChange::Opened => CopyEvent::PositionOpened(position),
                PositionChange::Updated => CopyEvent::PositionUpdated(position),
                PositionChange::Closed => CopyEvent::PositionClosed(position),
            };
            let _ = self.events_tx.send(event);
        }
    }
}

/// Collapse a bucket into one synthetic trade at the size-weighted price.
fn aggregate(bucket: &Bucket) -> Option<AggregatedTrade> {
    let first = bucket.trades.first()?;
    let total_size: f64 = bucket.trades.iter().map(|t| t.size).sum();
    if total_size <= 0.0 {
        return None;
    }
    let avg_price =
        bucket.trades.iter().map(|t| t.price * t.size).sum::<f64>() / total_size;
    Some(AggregatedTrade {
        wallet: first.wallet.clone(),
        platform: first.platform,
        market_id: first.market_id.clone(),
        outcome_id: first.outcome_id.clone(),
        side: first.side,
        total_size,
        avg_price,
        usd_value: avg_price * total_size,
        trade_count: bucket.trades.len(),
        window_start_ms: bucket.started_at_ms,
    })
}

impl std::fmt::Debug for CopyTrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CopyTrader")
            .field("wallets", &self.configs.len())
            .field("open_buckets", &self.buckets.read().len())
            .finish()
    }
}
