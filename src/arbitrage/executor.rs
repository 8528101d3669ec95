// =============================================================================
// Arbitrage Executor — two-leg atomic execution with compensating unwind
// =============================================================================
//
// Policy per opportunity:
//   1. Both legs go out concurrently as IOC through the order manager (which
//      runs the pre-trade risk gate).
//   2. Both filled      -> executed; the book holds the locked-in pair.
//   3. One-sided fill   -> compensating market order flattens the exposed
//      leg; if that also fails the outcome is an explicit unhedged alert
//      (kill-switch candidate, never auto-trip).
//   4. Both rejected    -> failed, no state change.
//
// EXECUTION_TIMEOUT_MS bounds the whole attempt; legs still open at the
// deadline are cancelled and treated by their filled amounts. At most one
// execution is in flight per market.
// =============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::arbitrage::{ArbitrageLeg, ArbitrageOpportunity};
use crate::clock::SharedClock;
use crate::orders::OrderManager;
use crate::types::{Order, OrderStatus, OrderType, EXECUTION_TIMEOUT_MS, MAX_PRICE, MIN_PRICE};
use crate::venue::{OrderFilter, OrderRequest};

/// Poll cadence while waiting on leg fills.
const FILL_POLL_MS: u64 = 25;
/// A leg counts as fully filled above this fraction of its target.
const FULL_FILL_FRACTION: f64 = 0.999;

/// Terminal result of one execution attempt.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Both legs filled; the pair is locked in.
    Executed { filled_size: f64 },
    /// One-sided fill was flattened by a compensating order.
    Unwound { compensated_size: f64, realized_pnl: f64 },
    /// One-sided fill could not be flattened. Kill-switch candidate.
    UnhedgedAlert { exposed_size: f64, exposed_leg: ArbitrageLeg },
    /// Neither leg filled.
    Failed,
    /// Not attempted (expired, market busy, or risk-rejected).
    Skipped { reason: String },
}

pub struct ArbitrageExecutor {
    orders: Arc<OrderManager>,
    clock: SharedClock,
    /// Markets with an execution in flight.
    in_flight: Mutex<HashSet<String>>,
}

impl ArbitrageExecutor {
    pub fn new(orders: Arc<OrderManager>, clock: SharedClock) -> Self {
        Self {
            orders,
            clock,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_market_busy(&self, market_id: &str) -> bool {
        self.in_flight.lock().contains(market_id)
    }

    /// Number of markets with an execution in flight (shutdown drains on 0).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Execute one opportunity end to end.
    pub async fn execute(&self, opportunity: &ArbitrageOpportunity) -> ExecutionOutcome {
        if opportunity.is_expired(self.clock.now_ms()) {
            return ExecutionOutcome::Skipped {
                reason: "opportunity expired".into(),
            };
        }

        // Per-market latch: a second opportunity on a busy market waits for
        // the next scan instead of stacking.
        let markets: Vec<String> = opportunity
            .legs
            .iter()
            .map(|l| l.market_id.clone())
            .collect();
        {
            let mut in_flight = self.in_flight.lock();
            if markets.iter().any(|m| in_flight.contains(m)) {
                return ExecutionOutcome::Skipped {
                    reason: "execution already in flight for market".into(),
                };
            }
            for market in &markets {
                in_flight.insert(market.clone());
            }
        }

        let outcome = self.execute_inner(opportunity).await;

        {
            let mut in_flight = self.in_flight.lock();
            for market in &markets {
                in_flight.remove(market);
            }
        }
        outcome
    }

    async fn execute_inner(&self, opportunity: &ArbitrageOpportunity) -> ExecutionOutcome {
        let size = opportunity.max_size;
        info!(
            opportunity_id = %opportunity.id,
            arb_type = ?opportunity.arb_type,
            size,
            spread_bps = opportunity.spread_bps,
            "executing arbitrage"
        );

        // Both legs concurrently, IOC.
        let deadline = Duration::from_millis(EXECUTION_TIMEOUT_MS);
        let attempt = timeout(deadline, async {
            tokio::join!(
                self.place_and_wait(&opportunity.legs[0], size),
                self.place_and_wait(&opportunity.legs[1], size),
            )
        })
        .await;

        let (leg_a, leg_b) = match attempt {
            Ok(results) => results,
            Err(_) => {
                // Timed out: cancel whatever is still resting on the leg
                // markets, then settle on observed fills.
                warn!(opportunity_id = %opportunity.id, "execution timeout — cancelling open legs");
                for leg in &opportunity.legs {
                    let filter = OrderFilter {
                        market_id: Some(leg.market_id.clone()),
                        status: None,
                        strategy_id: Some("arbitrage".into()),
                    };
                    self.orders.cancel_all_orders(Some(&filter)).await;
                }
                (
                    self.latest_fill(&opportunity.legs[0]),
                    self.latest_fill(&opportunity.legs[1]),
                )
            }
        };

        let filled_a = leg_a.as_ref().map(|o| o.filled_size).unwrap_or(0.0);
        let filled_b = leg_b.as_ref().map(|o| o.filled_size).unwrap_or(0.0);
        let full_a = filled_a >= size * FULL_FILL_FRACTION;
        let full_b = filled_b >= size * FULL_FILL_FRACTION;

        if full_a && full_b {
            info!(opportunity_id = %opportunity.id, filled = size, "both legs filled");
            return ExecutionOutcome::Executed { filled_size: size };
        }

        if filled_a <= 0.0 && filled_b <= 0.0 {
            info!(opportunity_id = %opportunity.id, "both legs rejected or unfilled");
            return ExecutionOutcome::Failed;
        }

        // One-sided exposure: flatten the over-filled leg down to the
        // under-filled one.
        let (exposed_leg, excess) = if filled_a > filled_b {
            (&opportunity.legs[0], filled_a - filled_b)
        } else {
            (&opportunity.legs[1], filled_b - filled_a)
        };
        warn!(
            opportunity_id = %opportunity.id,
            market_id = %exposed_leg.market_id,
            excess,
            "one-sided fill — compensating"
        );
        self.compensate(exposed_leg, excess).await
    }

    /// Place one leg and poll until it reaches a terminal state.
    async fn place_and_wait(&self, leg: &ArbitrageLeg, size: f64) -> Option<Order> {
        let request = OrderRequest {
            platform: leg.platform,
            market_id: leg.market_id.clone(),
            outcome_id: leg.outcome_id.clone(),
            side: leg.side,
            price: leg.price,
            size,
            order_type: OrderType::Ioc,
            strategy_id: Some("arbitrage".into()),
        };

        let order = match self.orders.place_order(request).await {
            Ok(order) => order,
            Err(e) => {
                warn!(market_id = %leg.market_id, error = %e, "leg placement failed");
                return None;
            }
        };
        if order.status == OrderStatus::Rejected {
            return Some(order);
        }

        loop {
            tokio::time::sleep(Duration::from_millis(FILL_POLL_MS)).await;
            match self.orders.get_order(&order.id) {
                Some(current) if current.status.is_terminal() => return Some(current),
                Some(current) if current.filled_size >= size * FULL_FILL_FRACTION => {
                    return Some(current)
                }
                Some(_) => continue,
                None => return None,
            }
        }
    }

    /// Most recent order state for a leg after a timeout.
    fn latest_fill(&self, leg: &ArbitrageLeg) -> Option<Order> {
        self.orders
            .get_orders(None)
            .into_iter()
            .filter(|o| {
                o.market_id == leg.market_id
                    && o.outcome_id == leg.outcome_id
                    && o.strategy_id.as_deref() == Some("arbitrage")
            })
            .max_by_key(|o| o.created_at)
    }

    /// Flatten `excess` contracts of an exposed leg with an aggressive IOC
    /// order on the opposite side.
    async fn compensate(&self, leg: &ArbitrageLeg, excess: f64) -> ExecutionOutcome {
        let unwind_side = leg.side.opposite();
        // Cross the book: worst acceptable price inside the band.
        let price = match unwind_side {
            crate::types::OrderSide::Buy => MAX_PRICE,
            crate::types::OrderSide::Sell => MIN_PRICE,
        };
        let request = OrderRequest {
            platform: leg.platform,
            market_id: leg.market_id.clone(),
            outcome_id: leg.outcome_id.clone(),
            side: unwind_side,
            price,
            size: excess,
            order_type: OrderType::Ioc,
            strategy_id: Some("arbitrage-unwind".into()),
        };

        let deadline = Duration::from_millis(EXECUTION_TIMEOUT_MS);
        let unwind_leg = ArbitrageLeg {
            side: unwind_side,
            price,
            size: excess,
            ..leg.clone()
        };

        let result = timeout(deadline, async {
            let order = self.orders.place_order(request).await.ok()?;
            if order.status == OrderStatus::Rejected {
                return Some(order);
            }
            loop {
                tokio::time::sleep(Duration::from_millis(FILL_POLL_MS)).await;
                match self.orders.get_order(&order.id) {
                    Some(current) if current.status.is_terminal() => return Some(current),
                    Some(current) if current.filled_size >= excess * FULL_FILL_FRACTION => {
                        return Some(current)
                    }
                    Some(_) => continue,
                    None => return None,
                }
            }
        })
        .await;

        let compensated = match result {
            Ok(Some(order)) => order.filled_size,
            _ => 0.0,
        };

        if compensated >= excess * FULL_FILL_FRACTION {
            // PnL of the unwind is already booked through the position book;
            // report the round trip.
            let realized = self.orders.positions().total_realized_pnl();
            info!(
                market_id = %leg.market_id,
                compensated,
                realized,
                "exposure flattened"
            );
            ExecutionOutcome::Unwound {
                compensated_size: compensated,
                realized_pnl: realized,
            }
        } else {
            warn!(
                market_id = %leg.market_id,
                exposed = excess - compensated,
                "compensating order failed — position unhedged"
            );
            ExecutionOutcome::UnhedgedAlert {
                exposed_size: excess - compensated,
                exposed_leg: unwind_leg,
            }
        }
    }
}

impl std::fmt::Debug for ArbitrageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrageExecutor")
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{ArbType, ArbitrageOpportunity};
    use crate::clock::{ManualClock, SharedClock};
    use crate::error::{EngineError, EngineResult};
    use crate::market_data::{OrderBook, PriceHistoryTracker};
    use crate::orders::PositionBook;
    use crate::risk::{RiskEngine, RiskLimits};
    use crate::types::{
        Balance, MarketKey, NormalizedMarket, Order, OrderSide, Platform, Position,
    };
    use crate::venue::{
        MarketFilter, OrderFilter, OrderUpdate, VenueClient, VenueEvent, WalletActivity,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex as PlMutex;
    use std::collections::HashMap;
    use tokio::sync::broadcast;

    /// Scripted venue: each placed order consumes the next behavior.
    #[derive(Clone, Copy, Debug)]
    enum Behavior {
        FillFull,
        FillAt(f64),
        Reject,
        Silent,
    }

    struct MockVenue {
        behaviors: PlMutex<Vec<Behavior>>,
        events_tx: broadcast::Sender<VenueEvent>,
        placed: PlMutex<Vec<OrderRequest>>,
    }

    impl MockVenue {
        fn new(behaviors: Vec<Behavior>) -> Arc<Self> {
            let (events_tx, _) = broadcast::channel(64);
            Arc::new(Self {
                behaviors: PlMutex::new(behaviors),
                events_tx,
                placed: PlMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl VenueClient for MockVenue {
        fn platform(&self) -> Platform {
            Platform::Polymarket
        }
        async fn connect(&self) -> EngineResult<()> {
            Ok(())
        }
        async fn disconnect(&self) -> EngineResult<()> {
            Ok(())
        }
        fn is_connected(&self) -> bool {
            true
        }
        async fn get_markets(&self, _f: &MarketFilter) -> EngineResult<Vec<NormalizedMarket>> {
            Ok(Vec::new())
        }
        async fn get_order_book(
            &self,
            _m: &str,
            _o: Option<&str>,
        ) -> EngineResult<OrderBook> {
            Err(EngineError::Internal("not used".into()))
        }
        async fn place_order(&self, request: &OrderRequest) -> EngineResult<Order> {
            self.placed.lock().push(request.clone());
            let behavior = {
                let mut behaviors = self.behaviors.lock();
                if behaviors.is_empty() {
                    Behavior::Silent
                } else {
                    behaviors.remove(0)
                }
            };
            let venue_id = format!("v-{}", self.placed.lock().len());
            match behavior {
                Behavior::Reject => Err(EngineError::Execution("venue rejected order".into())),
                other => {
                    // Push the fill event after placement returns.
                    let fill_price = match other {
                        Behavior::FillAt(p) => Some(p),
                        Behavior::FillFull => Some(request.price),
                        _ => None,
                    };
                    if let Some(price) = fill_price {
                        let tx = self.events_tx.clone();
                        let id = venue_id.clone();
                        let size = request.size;
                        tokio::spawn(async move {
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            let _ = tx.send(VenueEvent::OrderUpdate(OrderUpdate {
                                order_id: id,
                                status: crate::types::OrderStatus::Filled,
                                filled_size: size,
                                avg_fill_price: price,
                                reason: None,
                            }));
                        });
                    }
                    let now = Utc::now();
                    Ok(Order {
                        id: venue_id,
                        platform: request.platform,
                        market_id: request.market_id.clone(),
                        outcome_id: request.outcome_id.clone(),
                        side: request.side,
                        price: request.price,
                        size: request.size,
                        filled_size: 0.0,
                        avg_fill_price: 0.0,
                        order_type: request.order_type,
                        status: crate::types::OrderStatus::Open,
                        created_at: now,
                        updated_at: now,
                        strategy_id: request.strategy_id.clone(),
                        reject_reason: None,
                    })
                }
            }
        }
        async fn cancel_order(&self, _id: &str) -> EngineResult<()> {
            Ok(())
        }
        async fn get_orders(&self, _f: &OrderFilter) -> EngineResult<Vec<Order>> {
            Ok(Vec::new())
        }
        async fn get_positions(&self) -> EngineResult<Vec<Position>> {
            Ok(Vec::new())
        }
        async fn get_balance(&self) -> EngineResult<Balance> {
            Ok(Balance {
                available: 0.0,
                locked: 0.0,
                total: 0.0,
                currency: "USDC".into(),
            })
        }
        async fn get_wallet_activity(
            &self,
            _w: &str,
            _l: usize,
        ) -> EngineResult<Vec<WalletActivity>> {
            Ok(Vec::new())
        }
        fn subscribe_events(&self) -> broadcast::Receiver<VenueEvent> {
            self.events_tx.subscribe()
        }
    }

    fn setup(behaviors: Vec<Behavior>) -> (Arc<OrderManager>, ArbitrageExecutor, Arc<MockVenue>) {
        let clock = Arc::new(ManualClock::new()) as SharedClock;
        let tracker = Arc::new(PriceHistoryTracker::new(clock.clone()));
        let risk = Arc::new(RiskEngine::new(
            100_000.0,
            RiskLimits {
                max_position_size_usd: 10_000.0,
                max_total_exposure_usd: 50_000.0,
                max_daily_loss_usd: 5_000.0,
                max_drawdown_percent: 50.0,
            },
        ));
        let venue = MockVenue::new(behaviors);
        let mut clients: HashMap<Platform, Arc<dyn VenueClient>> = HashMap::new();
        clients.insert(Platform::Polymarket, venue.clone());

        let manager = Arc::new(OrderManager::new(
            clients,
            None,
            risk,
            Arc::new(PositionBook::new()),
            tracker,
        ));

        // Forward venue order updates into the manager, as the engine does.
        let mut rx = venue.subscribe_events();
        let fwd = manager.clone();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                if let VenueEvent::OrderUpdate(update) = event {
                    fwd.apply_order_update(&update);
                }
            }
        });

        let executor = ArbitrageExecutor::new(manager.clone(), Arc::new(ManualClock::new()) as SharedClock);
        (manager, executor, venue)
    }

    fn sum_opportunity(size: f64) -> ArbitrageOpportunity {
        ArbitrageOpportunity::new(
            ArbType::SinglePlatform,
            [
                ArbitrageLeg {
                    platform: Platform::Polymarket,
                    market_id: "m1".into(),
                    outcome_id: "yes".into(),
                    side: OrderSide::Buy,
                    price: 0.48,
                    size,
                },
                ArbitrageLeg {
                    platform: Platform::Polymarket,
                    market_id: "m1".into(),
                    outcome_id: "no".into(),
                    side: OrderSide::Buy,
                    price: 0.49,
                    size,
                },
            ],
            300.0,
            0.03 * size,
            size,
            0.8,
            0,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn both_legs_fill_locks_the_pair() {
        let (manager, executor, _venue) =
            setup(vec![Behavior::FillFull, Behavior::FillFull]);
        let outcome = executor.execute(&sum_opportunity(800.0)).await;
        match outcome {
            ExecutionOutcome::Executed { filled_size } => assert_eq!(filled_size, 800.0),
            other => panic!("expected executed, got {other:?}"),
        }
        // Two trades, total cost 0.48*800 + 0.49*800 = 776.
        let trades = manager.trades();
        assert_eq!(trades.len(), 2);
        let cost: f64 = trades.iter().map(|t| t.price * t.size).sum();
        assert!((cost - 776.0).abs() < 1e-6);
        assert_eq!(manager.positions().open_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_sided_fill_gets_compensated() {
        // YES leg fills, NO leg rejects, unwind sells at 0.475.
        let (manager, executor, venue) = setup(vec![
            Behavior::FillFull,
            Behavior::Reject,
            Behavior::FillAt(0.475),
        ]);
        let outcome = executor.execute(&sum_opportunity(800.0)).await;
        match outcome {
            ExecutionOutcome::Unwound {
                compensated_size,
                realized_pnl,
            } => {
                assert_eq!(compensated_size, 800.0);
                // Bought 800 @ 0.48, sold 800 @ 0.475: -4.
                assert!((realized_pnl + 4.0).abs() < 1e-6);
            }
            other => panic!("expected unwound, got {other:?}"),
        }
        // Exposure is flat again.
        assert_eq!(manager.positions().open_count(), 0);
        // Third placement was the unwind sell.
        let placed = venue.placed.lock();
        assert_eq!(placed.len(), 3);
        assert_eq!(placed[2].side, OrderSide::Sell);
        assert_eq!(placed[2].size, 800.0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_compensation_raises_unhedged_alert() {
        let (_manager, executor, _venue) = setup(vec![
            Behavior::FillFull,
            Behavior::Reject,
            Behavior::Reject,
        ]);
        let outcome = executor.execute(&sum_opportunity(500.0)).await;
        match outcome {
            ExecutionOutcome::UnhedgedAlert {
                exposed_size,
                exposed_leg,
            } => {
                assert_eq!(exposed_size, 500.0);
                assert_eq!(exposed_leg.side, OrderSide::Sell);
            }
            other => panic!("expected unhedged alert, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn both_rejections_fail_cleanly() {
        let (manager, executor, _venue) = setup(vec![Behavior::Reject, Behavior::Reject]);
        let outcome = executor.execute(&sum_opportunity(500.0)).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed));
        assert_eq!(manager.positions().open_count(), 0);
        assert!(manager.trades().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_opportunity_is_skipped() {
        let clock = Arc::new(ManualClock::new());
        let (manager, _executor, _venue) = setup(vec![]);
        let executor = ArbitrageExecutor::new(manager, clock.clone() as SharedClock);
        clock.advance_ms(crate::types::ARBITRAGE_OPPORTUNITY_TTL_MS + 1);
        let outcome = executor.execute(&sum_opportunity(100.0)).await;
        assert!(matches!(outcome, ExecutionOutcome::Skipped { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn silent_legs_time_out_and_fail() {
        let (_manager, executor, _venue) =
            setup(vec![Behavior::Silent, Behavior::Silent]);
        let outcome = executor.execute(&sum_opportunity(100.0)).await;
        assert!(matches!(outcome, ExecutionOutcome::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_market_is_latched() {
        let (_manager, executor, _venue) =
            setup(vec![Behavior::Silent, Behavior::Silent]);
        let executor = Arc::new(executor);

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(&sum_opportunity(100.0)).await })
        };
        // Let the first execution claim the market latch.
        tokio::task::yield_now().await;
        assert!(executor.is_market_busy("m1"));

        let second = executor.execute(&sum_opportunity(100.0)).await;
        assert!(matches!(second, ExecutionOutcome::Skipped { .. }));

        let first = first.await.unwrap();
        assert!(matches!(first, ExecutionOutcome::Failed));
        assert!(!executor.is_market_busy("m1"));
    }
}
