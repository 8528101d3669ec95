// =============================================================================
// Order Manager — central authority for order lifecycle and routing
// =============================================================================
//
// Every order passes through here: client-id assignment, the pre-trade risk
// gate, routing to the venue client (or the paper engine), and status
// transitions. The status machine accepts only:
//
//   pending -> open -> (partial <-> partial) -> filled
//   pending -> rejected
//   open -> cancelled
//
// Anything else is logged and dropped, late events for terminal orders
// included. `filled_size` is monotonically non-decreasing.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::market_data::PriceHistoryTracker;
use crate::orders::paper::{PaperEngine, SimOutcome};
use crate::orders::positions::PositionBook;
use crate::risk::RiskEngine;
use crate::types::{Order, OrderStatus, Platform, Trade};
use crate::venue::{OrderFilter, OrderRequest, OrderUpdate, VenueClient, VenueFees};

/// Emitted on every accepted status transition.
#[derive(Debug, Clone)]
pub struct OrderStatusChanged {
    pub order: Order,
    pub previous: OrderStatus,
}

/// Central order index and router.
pub struct OrderManager {
    clients: HashMap<Platform, Arc<dyn VenueClient>>,
    paper: Option<Arc<PaperEngine>>,
    risk: Arc<RiskEngine>,
    positions: Arc<PositionBook>,
    tracker: Arc<PriceHistoryTracker>,
    orders: RwLock<HashMap<String, Order>>,
    /// venue order id -> client order id.
    venue_ids: RwLock<HashMap<String, String>>,
    trades: RwLock<Vec<Trade>>,
    events_tx: broadcast::Sender<OrderStatusChanged>,
}

impl OrderManager {
    pub fn new(
        clients: HashMap<Platform, Arc<dyn VenueClient>>,
        paper: Option<Arc<PaperEngine>>,
        risk: Arc<RiskEngine>,
        positions: Arc<PositionBook>,
        tracker: Arc<PriceHistoryTracker>,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(1024);
        Self {
            clients,
            paper,
            risk,
            positions,
            tracker,
            orders: RwLock::new(HashMap::new()),
            venue_ids: RwLock::new(HashMap::new()),
            trades: RwLock::new(Vec::new()),
            events_tx,
        }
    }

    pub fn is_paper(&self) -> bool {
        self.paper.is_some()
    }

    pub fn paper_engine(&self) -> Option<Arc<PaperEngine>> {
        self.paper.clone()
    }

    pub fn positions(&self) -> Arc<PositionBook> {
        self.positions.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrderStatusChanged> {
        self.events_tx.subscribe()
    }

    // -------------------------------------------------------------------------
    // Placement
    // -------------------------------------------------------------------------

    /// Place an order. Risk rejections come back as an order in `rejected`
    /// status with the reason attached; transport failures are errors.
    pub async fn place_order(self: &Arc<Self>, request: OrderRequest) -> EngineResult<Order> {
        let price = crate::math::round_to_tick(request.price, 0.01);
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let mut order = Order {
            id: id.clone(),
            platform: request.platform,
            market_id: request.market_id.clone(),
            outcome_id: request.outcome_id.clone(),
            side: request.side,
            price,
            size: request.size,
            filled_size: 0.0,
            avg_fill_price: 0.0,
            order_type: request.order_type,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
            strategy_id: request.strategy_id.clone(),
            reject_reason: None,
        };

        // Pre-trade risk gate.
        let order_notional = price * request.size;
        let position_notional = self.positions.position_notional(
            request.platform,
            &request.market_id,
            &request.outcome_id,
        );
        let total_exposure = self.positions.total_exposure();

        if let Err(e) = self
            .risk
            .check_order(order_notional, position_notional, total_exposure)
        {
            order.status = OrderStatus::Rejected;
            order.reject_reason = Some(e.to_string());
            warn!(order_id = %id, reason = %e, "order rejected by risk gate");
            self.orders.write().insert(id.clone(), order.clone());
            return Ok(order);
        }

        self.orders.write().insert(id.clone(), order.clone());
        info!(
            order_id = %id,
            platform = %request.platform,
            market_id = %request.market_id,
            side = %request.side,
            price,
            size = request.size,
            order_type = %request.order_type,
            paper = self.is_paper(),
            "order placed"
        );

        if let Some(paper) = &self.paper {
            self.apply_status(&id, OrderStatus::Open, None);
            self.spawn_paper_fill(paper.clone(), id.clone(), request, price);
        } else {
            let client = self.clients.get(&request.platform).ok_or_else(|| {
                EngineError::Internal(format!("no client for {}", request.platform))
            })?;
            let mut routed = request.clone();
            routed.price = price;
            match client.place_order(&routed).await {
                Ok(venue_order) => {
                    if !venue_order.id.is_empty() {
                        self.venue_ids
                            .write()
                            .insert(venue_order.id.clone(), id.clone());
                    }
                    self.apply_status(&id, OrderStatus::Open, None);
                }
                Err(e) => {
                    self.apply_status(&id, OrderStatus::Rejected, Some(e.to_string()));
                }
            }
        }

        Ok(self.get_order(&id).unwrap_or(order))
    }

    /// Paper path: draw the fill, sleep the latency, apply the update.
    fn spawn_paper_fill(
        self: &Arc<Self>,
        paper: Arc<PaperEngine>,
        order_id: String,
        request: OrderRequest,
        price: f64,
    ) {
        let sigma = self
            .tracker
            .get_stats(&request.market_id, 300)
            .and_then(|s| s.volatility)
            .unwrap_or(0.0);
        let (latency, outcome) =
            paper.simulate(request.platform, request.side, price, request.size, sigma);

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            match outcome {
                SimOutcome::Fill {
                    price,
                    size,
                    partial,
                    fee,
                } => {
                    paper.settle(request.side, price, size, fee);
                    let status = if partial {
                        OrderStatus::Partial
                    } else {
                        OrderStatus::Filled
                    };
                    manager.apply_order_update(&OrderUpdate {
                        order_id,
                        status,
                        filled_size: size,
                        avg_fill_price: price,
                        reason: None,
                    });
                }
                SimOutcome::NoFill => {
                    debug!(order_id = %order_id, "paper order missed the fill draw — resting open");
                }
            }
        });
    }

    // -------------------------------------------------------------------------
    // Status transitions
    // -------------------------------------------------------------------------

    /// Apply a venue (or paper) order update. Resolves venue ids, enforces
    /// the status DAG and fill monotonicity, books fills into positions.
    pub fn apply_order_update(&self, update: &OrderUpdate) {
        let client_id = {
            let venue_ids = self.venue_ids.read();
            venue_ids
                .get(&update.order_id)
                .cloned()
                .unwrap_or_else(|| update.order_id.clone())
        };

        let (previous, fill_delta, order_snapshot) = {
            let mut orders = self.orders.write();
            let order = match orders.get_mut(&client_id) {
                Some(order) => order,
                None => {
                    debug!(order_id = %update.order_id, "update for unknown order dropped");
                    return;
                }
            };

            if order.status.is_terminal() {
                debug!(
                    order_id = %client_id,
                    status = %order.status,
                    "late event for terminal order dropped"
                );
                return;
            }

            if !transition_allowed(order.status, update.status) {
                warn!(
                    order_id = %client_id,
                    from = %order.status,
                    to = %update.status,
                    "illegal order transition ignored"
                );
                return;
            }

            // filled_size is monotone non-decreasing.
            let fill_delta = (update.filled_size - order.filled_size).max(0.0);
            if update.filled_size < order.filled_size {
                warn!(
                    order_id = %client_id,
                    current = order.filled_size,
                    incoming = update.filled_size,
                    "regressing fill size ignored"
                );
                return;
            }

            let previous = order.status;
            order.status = update.status;
            if fill_delta > 0.0 {
                // Blend the running average fill price.
                let prior = order.filled_size;
                order.avg_fill_price = if prior + fill_delta > 0.0 {
                    (order.avg_fill_price * prior + update.avg_fill_price * fill_delta)
                        / (prior + fill_delta)
                } else {
                    update.avg_fill_price
                };
                order.filled_size = update.filled_size;
            }
            if let Some(reason) = &update.reason {
                order.reject_reason = Some(reason.clone());
            }
            order.updated_at = Utc::now();

            (previous, fill_delta, order.clone())
        };

        if fill_delta > 0.0 {
            let fee = VenueFees::for_platform(order_snapshot.platform)
                .taker_fee(update.avg_fill_price, fill_delta);
            let trade = Trade {
                order_id: order_snapshot.id.clone(),
                platform: order_snapshot.platform,
                market_id: order_snapshot.market_id.clone(),
                outcome_id: order_snapshot.outcome_id.clone(),
                side: order_snapshot.side,
                price: update.avg_fill_price,
                size: fill_delta,
                fee,
                realized_pnl: 0.0,
                executed_at: Utc::now(),
                strategy_id: order_snapshot.strategy_id.clone(),
            };
            let realized = self.positions.apply_fill(&trade);
            if realized != 0.0 {
                self.risk.record_realized(realized);
            }
            let mut recorded = trade;
            recorded.realized_pnl = realized;
            self.trades.write().push(recorded);
        }

        debug!(
            order_id = %order_snapshot.id,
            from = %previous,
            to = %order_snapshot.status,
            filled = order_snapshot.filled_size,
            "order transition applied"
        );
        let _ = self.events_tx.send(OrderStatusChanged {
            order: order_snapshot,
            previous,
        });
    }

    /// Internal status-only transition (no fill payload).
    fn apply_status(&self, order_id: &str, status: OrderStatus, reason: Option<String>) {
        let filled = self
            .get_order(order_id)
            .map(|o| o.filled_size)
            .unwrap_or(0.0);
        self.apply_order_update(&OrderUpdate {
            order_id: order_id.to_string(),
            status,
            filled_size: filled,
            avg_fill_price: 0.0,
            reason,
        });
    }

    // -------------------------------------------------------------------------
    // Revaluation
    // -------------------------------------------------------------------------

    /// Mark every open position against the tracker's latest price and feed
    /// the total unrealized PnL to the risk engine.
    pub fn revalue_positions(&self) {
        let open = self.positions.open_positions();
        if open.is_empty() {
            self.risk.mark_unrealized(0.0);
            return;
        }
        let mut seen: std::collections::HashSet<(Platform, String)> =
            std::collections::HashSet::new();
        let mut total_unrealized = 0.0;
        for position in &open {
            if seen.insert((position.platform, position.market_id.clone())) {
                if let Some(price) = self.tracker.last_price(&position.market_id) {
                    total_unrealized =
                        self.positions
                            .mark_market(position.platform, &position.market_id, price);
                }
            }
        }
        self.risk.mark_unrealized(total_unrealized);
    }

    // -------------------------------------------------------------------------
    // Cancellation
    // -------------------------------------------------------------------------

    /// Cancel one order, best-effort.
    pub async fn cancel_order(&self, order_id: &str) -> EngineResult<()> {
        let order = self
            .get_order(order_id)
            .ok_or_else(|| EngineError::Execution(format!("unknown order {order_id}")))?;

        if order.status.is_terminal() {
            debug!(order_id, status = %order.status, "cancel of terminal order is a no-op");
            return Ok(());
        }
        debug!(order_id, remaining = order.remaining(), "cancelling order");

        if self.paper.is_none() {
            if let Some(client) = self.clients.get(&order.platform) {
                // Venue knows its own id when we have a mapping; fall back to
                // the client id.
                let venue_id = {
                    let venue_ids = self.venue_ids.read();
                    venue_ids
                        .iter()
                        .find(|(_, cid)| cid.as_str() == order_id)
                        .map(|(vid, _)| vid.clone())
                        .unwrap_or_else(|| order_id.to_string())
                };
                if let Err(e) = client.cancel_order(&venue_id).await {
                    warn!(order_id, error = %e, "venue cancel failed");
                }
            }
        }

        self.apply_status(order_id, OrderStatus::Cancelled, None);
        Ok(())
    }

    /// Cancel all non-terminal orders matching `filter`. Returns the number
    /// of cancellations attempted.
    pub async fn cancel_all_orders(&self, filter: Option<&OrderFilter>) -> usize {
        let targets: Vec<String> = {
            let orders = self.orders.read();
            orders
                .values()
                .filter(|o| !o.status.is_terminal())
                .filter(|o| matches_filter(o, filter))
                .map(|o| o.id.clone())
                .collect()
        };

        info!(count = targets.len(), "cancelling all open orders");
        let mut attempted = 0;
        for id in targets {
            if self.cancel_order(&id).await.is_ok() {
                attempted += 1;
            }
        }
        attempted
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn get_order(&self, order_id: &str) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    pub fn get_orders(&self, filter: Option<&OrderFilter>) -> Vec<Order> {
        self.orders
            .read()
            .values()
            .filter(|o| matches_filter(o, filter))
            .cloned()
            .collect()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.read().clone()
    }

    pub fn open_order_count(&self) -> usize {
        self.orders
            .read()
            .values()
            .filter(|o| !o.status.is_terminal())
            .count()
    }
}

impl std::fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderManager")
            .field("orders", &self.orders.read().len())
            .field("paper", &self.is_paper())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Order status machine: only these edges are accepted.
fn transition_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Pending, Open)
            | (Pending, Rejected)
            | (Open, Partial)
            | (Open, Filled)
            | (Open, Cancelled)
            | (Partial, Partial)
            | (Partial, Filled)
    )
}

fn matches_filter(order: &Order, filter: Option<&OrderFilter>) -> bool {
    let Some(filter) = filter else { return true };
    if let Some(market) = &filter.market_id {
        if &order.market_id != market {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if order.status != status {
            return false;
        }
    }
    if let Some(strategy) = &filter.strategy_id {
        if order.strategy_id.as_deref() != Some(strategy.as_str()) {
            return false;
        }
    }
    true
}
