// =============================================================================
// Trading Engine — composition root for scanning and execution
// =============================================================================
//
// Lifecycle is linear: Created -> Initialized -> Running -> Stopped.
// `initialize` connects the venue clients, pulls both market catalogs, and
// computes cross-venue pairs; `start` spawns the ingress pumps and the scan
// loop; `stop` drains in-flight executions (bounded by EXECUTION_TIMEOUT_MS)
// and cancels whatever is still resting.
// =============================================================================

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::arbitrage::{ArbitrageDetector, ArbitrageExecutor, ExecutionOutcome};
use crate::clock::SharedClock;
use crate::config::RuntimeConfig;
use crate::health::HealthMonitor;
use crate::market_data::{BookStore, PriceHistoryTracker};
use crate::orders::OrderManager;
use crate::persistence::Repository;
use crate::strategy::StrategyManager;
use crate::types::{
    MarketKey, MarketPair, NormalizedMarket, Platform, EXECUTION_TIMEOUT_MS,
};
use crate::venue::{ConnectionState, MarketFilter, OrderRequest, VenueClient, VenueEvent};

/// Engine lifecycle states; transitions are linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Created,
    Initialized,
    Running,
    Stopped,
}

/// Counters exposed through the admin surface.
#[derive(Default)]
struct Counters {
    scans: AtomicU64,
    opportunities_detected: AtomicU64,
    opportunities_executed: AtomicU64,
    signals_emitted: AtomicU64,
    unhedged_alerts: AtomicU64,
}

/// Serialisable engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub state: EngineState,
    pub scans: u64,
    pub opportunities_detected: u64,
    pub opportunities_executed: u64,
    pub signals_emitted: u64,
    pub unhedged_alerts: u64,
    pub markets_tracked: usize,
    pub matched_pairs: usize,
}

pub struct TradingEngine {
    state: RwLock<EngineState>,
    config: RuntimeConfig,
    clients: HashMap<Platform, Arc<dyn VenueClient>>,
    books: Arc<BookStore>,
    tracker: Arc<PriceHistoryTracker>,
    strategies: Arc<StrategyManager>,
    detector: ArbitrageDetector,
    executor: Arc<ArbitrageExecutor>,
    orders: Arc<OrderManager>,
    health: Arc<HealthMonitor>,
    repository: Arc<dyn Repository>,
    clock: SharedClock,
    markets: RwLock<HashMap<MarketKey, NormalizedMarket>>,
    pairs: RwLock<Vec<MarketPair>>,
    counters: Counters,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl TradingEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RuntimeConfig,
        clients: HashMap<Platform, Arc<dyn VenueClient>>,
        books: Arc<BookStore>,
        tracker: Arc<PriceHistoryTracker>,
        strategies: Arc<StrategyManager>,
        orders: Arc<OrderManager>,
        health: Arc<HealthMonitor>,
        repository: Arc<dyn Repository>,
        clock: SharedClock,
    ) -> Self {
        let detector = ArbitrageDetector::new(
            clock.clone(),
            config.min_arbitrage_spread_bps,
            config.enable_single_platform_arb,
            config.enable_cross_platform_arb,
        );
        let executor = Arc::new(ArbitrageExecutor::new(orders.clone(), clock.clone()));
        Self {
            state: RwLock::new(EngineState::Created),
            config,
            clients,
            books,
            tracker,
            strategies,
            detector,
            executor,
            orders,
            health,
            repository,
            clock,
            markets: RwLock::new(HashMap::new()),
            pairs: RwLock::new(Vec::new()),
            counters: Counters::default(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    pub fn books(&self) -> Arc<BookStore> {
        self.books.clone()
    }

    pub fn matched_pairs(&self) -> Vec<MarketPair> {
        self.pairs.read().clone()
    }

    pub fn markets(&self) -> Vec<NormalizedMarket> {
        self.markets.read().values().cloned().collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            state: self.state(),
            scans: self.counters.scans.load(Ordering::Relaxed),
            opportunities_detected: self
                .counters
                .opportunities_detected
                .load(Ordering::Relaxed),
            opportunities_executed: self
                .counters
                .opportunities_executed
                .load(Ordering::Relaxed),
            signals_emitted: self.counters.signals_emitted.load(Ordering::Relaxed),
            unhedged_alerts: self.counters.unhedged_alerts.load(Ordering::Relaxed),
            markets_tracked: self.markets.read().len(),
            matched_pairs: self.pairs.read().len(),
        }
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Connect clients, pull catalogs, compute pairs. Created -> Initialized.
    pub async fn initialize(&self) -> anyhow::Result<()> {
        {
            let state = self.state.read();
            anyhow::ensure!(
                *state == EngineState::Created,
                "initialize only from created (current: {state:?})"
            );
        }

        for (platform, client) in &self.clients {
            if let Err(e) = client.connect().await {
                // Auth failures degrade a venue to read-only; the engine
                // still runs on the other one.
                warn!(%platform, error = %e, "venue connect failed — degraded");
            }
        }

        self.refresh_markets().await;
        *self.state.write() = EngineState::Initialized;
        info!(
            markets = self.markets.read().len(),
            pairs = self.pairs.read().len(),
            "engine initialized"
        );
        Ok(())
    }

    /// Spawn background tasks. Initialized -> Running.
    pub fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        {
            let state = self.state.read();
            anyhow::ensure!(
                *state == EngineState::Initialized,
                "start only from initialized (current: {state:?})"
            );
        }

        let mut tasks = self.tasks.lock();

        // Ingress pump per venue.
        for client in self.clients.values() {
            let engine = self.clone();
            let mut rx = client.subscribe_events();
            tasks.push(tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(event) => engine.handle_venue_event(event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!(missed = n, "venue event pump lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }));
        }

        // Significant moves feed the volatility-capture strategy.
        {
            let strategies = self.strategies.clone();
            let mut rx = self.tracker.subscribe_moves();
            tasks.push(tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    strategies.on_significant_move(event);
                }
            }));
        }

        // Scan loop.
        {
            let engine = self.clone();
            let interval = Duration::from_millis(self.config.scan_interval_ms);
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    engine.trigger_scan().await;
                }
            }));
        }

        // Book resync loop: gaps flagged by the store get fresh snapshots.
        {
            let engine = self.clone();
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(2));
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    engine.resync_books().await;
                }
            }));
        }

        // Catalog refresh loop.
        {
            let engine = self.clone();
            let every = Duration::from_secs(self.config.market_refresh_secs.max(30));
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(every);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await; // initial tick fires immediately; skip
                loop {
                    ticker.tick().await;
                    engine.refresh_markets().await;
                }
            }));
        }

        *self.state.write() = EngineState::Running;
        info!("engine running");
        Ok(())
    }

    /// Drain and halt. Running -> Stopped.
    pub async fn stop(&self) -> anyhow::Result<()> {
        {
            let state = self.state.read();
            anyhow::ensure!(
                *state == EngineState::Running,
                "stop only from running (current: {state:?})"
            );
        }
        *self.state.write() = EngineState::Stopped;

        // Wait for in-flight executions, bounded.
        let deadline = std::time::Instant::now() + Duration::from_millis(EXECUTION_TIMEOUT_MS);
        while self.executor.in_flight_count() > 0 && std::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        let cancelled = self.orders.cancel_all_orders(None).await;
        info!(cancelled, "engine stopped");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Ingress
    // -------------------------------------------------------------------------

    fn handle_venue_event(&self, event: VenueEvent) {
        match event {
            VenueEvent::Book(book) => {
                let market_id = book.market.external_id.clone();
                let mid = match (book.yes.best_bid(), book.yes.best_ask()) {
                    (Some(bid), Some(ask)) => Some((
                        crate::math::mid(bid.price, ask.price),
                        bid.size,
                        ask.size,
                    )),
                    _ => None,
                };
                self.books.apply_update(book);
                if let Some((mid, bid_size, ask_size)) = mid {
                    self.tracker
                        .record(&market_id, mid, None, Some(bid_size), Some(ask_size));
                }
            }
            VenueEvent::Trade(trade) => {
                self.tracker
                    .record(&trade.market_id, trade.price, Some(trade.size), None, None);
            }
            VenueEvent::OrderUpdate(update) => {
                self.orders.apply_order_update(&update);
            }
            VenueEvent::Error { platform, message } => {
                self.health.note_venue_error(platform, &message);
            }
            VenueEvent::StateChange { platform, state } => {
                debug!(%platform, ?state, "venue connection state changed");
                if matches!(
                    state,
                    ConnectionState::Disconnected | ConnectionState::Reconnecting
                ) {
                    self.books.mark_platform_stale(platform);
                }
            }
        }
    }

    async fn resync_books(&self) {
        for key in self.books.pending_resyncs() {
            let Some(client) = self.clients.get(&key.platform) else {
                continue;
            };
            match client.get_order_book(&key.external_id, None).await {
                Ok(book) => {
                    info!(market = %key, "book resynced after sequence gap");
                    self.books.apply_snapshot(book);
                }
                Err(e) => warn!(market = %key, error = %e, "book resync failed"),
            }
        }
    }

    // -------------------------------------------------------------------------
    // Market catalog & matching
    // -------------------------------------------------------------------------

    async fn refresh_markets(&self) {
        let filter = MarketFilter {
            active_only: true,
            limit: Some(500),
            category: None,
        };

        let mut catalogs: HashMap<Platform, Vec<NormalizedMarket>> = HashMap::new();
        for (platform, client) in &self.clients {
            match client.get_markets(&filter).await {
                Ok(markets) => {
                    debug!(%platform, count = markets.len(), "catalog fetched");
                    catalogs.insert(*platform, markets);
                }
                Err(e) => {
                    warn!(%platform, error = %e, "catalog fetch failed");
                    self.health.note_venue_error(*platform, &e.to_string());
                }
            }
        }

        let all: Vec<NormalizedMarket> = catalogs.values().flatten().cloned().collect();
        if !all.is_empty() {
            self.repository.save_markets(&all).await;
            let mut markets = self.markets.write();
            for market in all {
                markets.insert(market.key.clone(), market);
            }
        }

        // Cross-venue pairing needs both catalogs.
        if let (Some(markets_a), Some(markets_b)) = (
            catalogs.get(&Platform::Polymarket),
            catalogs.get(&Platform::Kalshi),
        ) {
            let pairs = crate::matching::match_markets(markets_a, markets_b);
            self.repository.save_pairs(&pairs).await;
            *self.pairs.write() = pairs;
        }
    }

    /// Test and admin hook: seed the market cache directly.
    pub fn set_markets(&self, markets: Vec<NormalizedMarket>, pairs: Vec<MarketPair>) {
        let mut stored = self.markets.write();
        stored.clear();
        for market in markets {
            stored.insert(market.key.clone(), market);
        }
        *self.pairs.write() = pairs;
    }

    // -------------------------------------------------------------------------
    // Scan
    // -------------------------------------------------------------------------

    /// One scan tick: detect, execute the best opportunity per market, then
    /// run the strategy portfolio. Returns how many executions were attempted.
    pub async fn trigger_scan(&self) -> usize {
        if self.state() != EngineState::Running {
            return 0;
        }
        if self.health.kill_switch().is_tripped() {
            debug!("scan skipped — kill switch latched");
            return 0;
        }
        self.counters.scans.fetch_add(1, Ordering::Relaxed);

        // Fresh marks first so the risk gate sees current unrealized PnL.
        self.orders.revalue_positions();

        let markets: Vec<NormalizedMarket> = self.markets.read().values().cloned().collect();
        let by_key: HashMap<MarketKey, NormalizedMarket> = self.markets.read().clone();
        let pairs = self.pairs.read().clone();

        // Arbitrage first: detected opportunities outrank advisory signals.
        let detected = self.detector.scan(&markets, &pairs, &by_key);
        self.counters
            .opportunities_detected
            .fetch_add(detected.len() as u64, Ordering::Relaxed);
        for opportunity in &detected {
            self.repository.save_opportunity(opportunity).await;
        }

        let mut live = self.detector.filter_live(detected);
        live.sort_by(|a, b| {
            b.max_profit
                .partial_cmp(&a.max_profit)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut attempted = 0usize;
        let mut touched: HashSet<String> = HashSet::new();
        for opportunity in live {
            // One opportunity per market per tick, and none while a prior
            // execution is still in flight on the market.
            if opportunity
                .legs
                .iter()
                .any(|l| touched.contains(&l.market_id) || self.executor.is_market_busy(&l.market_id))
            {
                continue;
            }
            for leg in &opportunity.legs {
                touched.insert(leg.market_id.clone());
            }

            attempted += 1;
            match self.executor.execute(&opportunity).await {
                ExecutionOutcome::Executed { .. } => {
                    self.counters
                        .opportunities_executed
                        .fetch_add(1, Ordering::Relaxed);
                }
                ExecutionOutcome::UnhedgedAlert {
                    exposed_size,
                    exposed_leg,
                } => {
                    self.counters.unhedged_alerts.fetch_add(1, Ordering::Relaxed);
                    self.health.note_internal_error(&format!(
                        "unhedged exposure: {exposed_size} contracts on {}",
                        exposed_leg.market_id
                    ));
                }
                ExecutionOutcome::Unwound { realized_pnl, .. } => {
                    debug!(realized_pnl, "opportunity unwound");
                }
                ExecutionOutcome::Failed | ExecutionOutcome::Skipped { .. } => {}
            }
        }

        // Strategy portfolio on the same snapshot.
        let signals = self.strategies.scan_markets(&markets, &self.books);
        self.counters
            .signals_emitted
            .fetch_add(signals.len() as u64, Ordering::Relaxed);
        for signal in signals {
            if touched.contains(&signal.market_id) {
                continue;
            }
            let request = OrderRequest {
                platform: by_key
                    .values()
                    .find(|m| m.key.external_id == signal.market_id)
                    .map(|m| m.key.platform)
                    .unwrap_or(Platform::Polymarket),
                market_id: signal.market_id.clone(),
                outcome_id: signal.outcome_id.clone(),
                side: signal.side,
                price: signal.price,
                size: signal.size,
                order_type: crate::types::OrderType::Ioc,
                strategy_id: Some(signal.strategy.to_string()),
            };
            match self.orders.place_order(request).await {
                Ok(order) => {
                    debug!(
                        signal = %signal.strategy,
                        market_id = %signal.market_id,
                        order_id = %order.id,
                        status = %order.status,
                        "signal routed to order manager"
                    );
                    attempted += 1;
                }
                Err(e) => warn!(error = %e, "signal order failed"),
            }
            self.strategies.clear_signal(&signal.market_id);
        }

        attempted
    }
}

impl std::fmt::Debug for TradingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradingEngine")
            .field("state", &self.state())
            .field("markets", &self.markets.read().len())
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::health::KillSwitch;
    use crate::orders::{PaperEngine, PositionBook};
    use crate::persistence::MemoryRepository;
    use crate::risk::{RiskEngine, RiskLimits};
    use crate::types::{MarketStatus, Outcome, OutcomeSide};

    fn engine(paper_seed: u64) -> (Arc<TradingEngine>, Arc<MemoryRepository>) {
        let clock = Arc::new(ManualClock::new()) as SharedClock;
        let books = Arc::new(BookStore::new());
        let tracker = Arc::new(PriceHistoryTracker::new(clock.clone()));
        let risk = Arc::new(RiskEngine::new(
            1_000_000.0,
            RiskLimits {
                max_position_size_usd: 100_000.0,
                max_total_exposure_usd: 500_000.0,
                max_daily_loss_usd: 50_000.0,
                max_drawdown_percent: 90.0,
            },
        ));
        let positions = Arc::new(PositionBook::new());
        let orders = Arc::new(OrderManager::new(
            HashMap::new(),
            Some(Arc::new(PaperEngine::with_seed(1_000_000.0, paper_seed))),
            risk.clone(),
            positions,
            tracker.clone(),
        ));
        let strategies = Arc::new(StrategyManager::new(
            tracker.clone(),
            clock.clone(),
            15_000,
            5,
        ));
        let repository = Arc::new(MemoryRepository::new());
        let health = Arc::new(HealthMonitor::new(
            Vec::new(),
            orders.clone(),
            risk,
            repository.clone(),
            Arc::new(KillSwitch::new()),
            clock.clone(),
            50.0,
        ));
        let engine = Arc::new(TradingEngine::new(
            RuntimeConfig::default(),
            HashMap::new(),
            books,
            tracker,
            strategies,
            orders,
            health,
            repository.clone(),
            clock,
        ));
        (engine, repository)
    }

    fn arb_market() -> NormalizedMarket {
        NormalizedMarket {
            key: MarketKey::new(Platform::Polymarket, "m1"),
            title: "Arb".into(),
            description: String::new(),
            category: String::new(),
            status: MarketStatus::Active,
            end_date: None,
            is_active: true,
            volume_24h: 0.0,
            liquidity: 0.0,
            outcomes: vec![
                Outcome {
                    external_id: "yes".into(),
                    name: "Yes".into(),
                    side: OutcomeSide::Yes,
                    probability: 0.48,
                    best_bid: 0.46,
                    best_ask: 0.48,
                    bid_size: 500.0,
                    ask_size: 1_000.0,
                },
                Outcome {
                    external_id: "no".into(),
                    name: "No".into(),
                    side: OutcomeSide::No,
                    probability: 0.49,
                    best_bid: 0.47,
                    best_ask: 0.49,
                    bid_size: 500.0,
                    ask_size: 800.0,
                },
            ],
        }
    }

    #[tokio::test]
    async fn lifecycle_is_linear() {
        let (engine, _) = engine(1);
        assert_eq!(engine.state(), EngineState::Created);

        // start before initialize is refused.
        assert!(engine.start().is_err());

        engine.initialize().await.unwrap();
        assert_eq!(engine.state(), EngineState::Initialized);

        // initialize twice is refused.
        assert!(engine.initialize().await.is_err());

        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Running);

        engine.stop().await.unwrap();
        assert_eq!(engine.state(), EngineState::Stopped);

        // stop twice is refused.
        assert!(engine.stop().await.is_err());
    }

    #[tokio::test]
    async fn scan_is_a_noop_unless_running() {
        let (engine, _) = engine(2);
        assert_eq!(engine.trigger_scan().await, 0);
        engine.initialize().await.unwrap();
        assert_eq!(engine.trigger_scan().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn scan_detects_and_attempts_the_sum_arb() {
        let (engine, repository) = engine(3);
        engine.initialize().await.unwrap();
        engine.start().unwrap();
        engine.set_markets(vec![arb_market()], Vec::new());

        let attempted = engine.trigger_scan().await;
        assert!(attempted >= 1);

        let stats = engine.stats();
        assert!(stats.scans >= 1);
        assert!(stats.opportunities_detected >= 1);
        assert!(repository.opportunity_count() >= 1);

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn kill_switch_halts_scanning() {
        let (engine, _) = engine(4);
        engine.initialize().await.unwrap();
        engine.start().unwrap();
        engine.set_markets(vec![arb_market()], Vec::new());

        engine
            .health
            .kill_switch()
            .trip(crate::health::KillReason::Manual, "test");
        assert_eq!(engine.trigger_scan().await, 0);
        assert_eq!(engine.stats().scans, 0);

        engine.stop().await.unwrap();
    }

    #[tokio::test]
    async fn venue_book_events_feed_store_and_tracker() {
        use crate::market_data::{BookLevel, BookSide, OrderBook};
        let (engine, _) = engine(5);

        let book = OrderBook {
            market: MarketKey::new(Platform::Polymarket, "m9"),
            yes: BookSide {
                bids: vec![BookLevel { price: 0.48, size: 10.0 }],
                asks: vec![BookLevel { price: 0.52, size: 20.0 }],
            },
            no: BookSide::default(),
            seq: 1,
            timestamp: chrono::Utc::now(),
        };
        engine.handle_venue_event(VenueEvent::Book(book));

        assert_eq!(engine.books().len(), 1);
        // Mid of 0.48/0.52 recorded.
        assert_eq!(engine.tracker.last_price("m9"), Some(0.50));
    }

    #[tokio::test]
    async fn disconnect_event_stales_the_platform() {
        use crate::market_data::{BookLevel, BookSide, OrderBook};
        let (engine, _) = engine(6);
        let key = MarketKey::new(Platform::Polymarket, "m9");
        let book = OrderBook {
            market: key.clone(),
            yes: BookSide {
                bids: vec![BookLevel { price: 0.48, size: 10.0 }],
                asks: vec![BookLevel { price: 0.52, size: 20.0 }],
            },
            no: BookSide::default(),
            seq: 1,
            timestamp: chrono::Utc::now(),
        };
        engine.handle_venue_event(VenueEvent::Book(book));
        assert!(engine.books().get(&key).is_some());

        engine.handle_venue_event(VenueEvent::StateChange {
            platform: Platform::Polymarket,
            state: ConnectionState::Reconnecting,
        });
        assert!(engine.books().get(&key).is_none());
    }
}
