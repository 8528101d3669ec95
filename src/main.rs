// =============================================================================
// Meridian — Main Entry Point
// =============================================================================
//
// The engine starts in paper mode for safety: live order routing requires
// `paper_trading: false` in the config file plus venue credentials in the
// environment.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod arbitrage;
mod clock;
mod config;
mod copy_trading;
mod engine;
mod error;
mod health;
mod market_data;
mod matching;
mod math;
mod orders;
mod persistence;
mod risk;
mod strategy;
mod types;
mod venue;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::clock::{SharedClock, SystemClock};
use crate::config::RuntimeConfig;
use crate::copy_trading::CopyTrader;
use crate::engine::TradingEngine;
use crate::health::{HealthMonitor, KillSwitch};
use crate::market_data::{BookStore, PriceHistoryTracker};
use crate::orders::{OrderManager, PaperEngine, PositionBook};
use crate::persistence::{MemoryRepository, Repository};
use crate::risk::{RiskEngine, RiskLimits};
use crate::strategy::StrategyManager;
use crate::types::Platform;
use crate::venue::{KalshiClient, PolymarketClient, VenueClient};

const CONFIG_PATH: &str = "meridian_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Meridian Markets Engine — Starting Up            ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Credentials come from the environment, never from the config file.
    if let Ok(key) = std::env::var("POLYMARKET_API_KEY") {
        config.polymarket_credentials.api_key = key;
    }
    if let Ok(secret) = std::env::var("POLYMARKET_API_SECRET") {
        config.polymarket_credentials.api_secret = secret;
    }
    if let Ok(key) = std::env::var("KALSHI_API_KEY") {
        config.kalshi_credentials.api_key = key;
    }

    info!(
        paper_trading = config.paper_trading,
        single_platform_arb = config.enable_single_platform_arb,
        cross_platform_arb = config.enable_cross_platform_arb,
        web_socket = config.enable_web_socket,
        tracked_traders = config.tracked_traders.len(),
        "configuration loaded"
    );

    // ── 2. Shared infrastructure ─────────────────────────────────────────
    let clock: SharedClock = Arc::new(SystemClock::new());
    let books = Arc::new(BookStore::new());
    let tracker = Arc::new(PriceHistoryTracker::new(clock.clone()));

    let capital = if config.paper_trading {
        config.paper_balance
    } else {
        config.max_total_exposure_usd
    };
    let risk = Arc::new(RiskEngine::new(
        capital,
        RiskLimits {
            max_position_size_usd: config.max_position_size_usd,
            max_total_exposure_usd: config.max_total_exposure_usd,
            max_daily_loss_usd: config.max_daily_loss_usd,
            max_drawdown_percent: config.max_drawdown_percent,
        },
    ));

    // ── 3. Venue clients ─────────────────────────────────────────────────
    let polymarket = Arc::new(PolymarketClient::new(config.polymarket_credentials.clone()));
    let kalshi = Arc::new(KalshiClient::new(config.kalshi_credentials.clone()));

    let mut clients: HashMap<Platform, Arc<dyn VenueClient>> = HashMap::new();
    clients.insert(Platform::Polymarket, polymarket.clone());
    clients.insert(Platform::Kalshi, kalshi.clone());

    // ── 4. Order manager (paper or live routing) ─────────────────────────
    let paper = config
        .paper_trading
        .then(|| Arc::new(PaperEngine::new(config.paper_balance)));
    if paper.is_some() {
        info!(balance = config.paper_balance, "paper trading enabled");
    } else {
        warn!("LIVE order routing enabled");
    }
    let orders = Arc::new(OrderManager::new(
        clients.clone(),
        paper,
        risk.clone(),
        Arc::new(PositionBook::new()),
        tracker.clone(),
    ));

    // ── 5. Strategies, persistence, health ───────────────────────────────
    let strategies = Arc::new(StrategyManager::new(
        tracker.clone(),
        clock.clone(),
        config.signal_cooldown_ms,
        config.max_concurrent_signals,
    ));
    let repository: Arc<dyn Repository> = Arc::new(MemoryRepository::new());

    let kill_switch = Arc::new(KillSwitch::new());
    let health = Arc::new(HealthMonitor::new(
        clients
            .iter()
            .map(|(platform, client)| (*platform, client.clone()))
            .collect(),
        orders.clone(),
        risk.clone(),
        repository.clone(),
        kill_switch,
        clock.clone(),
        config.min_wallet_balance_usd,
    ));
    tokio::spawn(health.clone().run(Duration::from_secs(30)));

    // ── 6. Trading engine ────────────────────────────────────────────────
    let engine = Arc::new(TradingEngine::new(
        config.clone(),
        clients.clone(),
        books,
        tracker.clone(),
        strategies,
        orders.clone(),
        health.clone(),
        repository,
        clock.clone(),
    ));

    if let Err(e) = engine.initialize().await {
        error!(error = %e, "engine initialization failed");
        anyhow::bail!("engine initialization failed: {e}");
    }
    engine.start()?;

    // ── 7. Streaming ingress ─────────────────────────────────────────────
    if config.enable_web_socket {
        let poly_markets: Vec<String> = engine
            .markets()
            .into_iter()
            .filter(|m| m.key.platform == Platform::Polymarket)
            .map(|m| m.key.external_id)
            .collect();
        let kalshi_markets: Vec<String> = engine
            .markets()
            .into_iter()
            .filter(|m| m.key.platform == Platform::Kalshi)
            .map(|m| m.key.external_id)
            .collect();

        tokio::spawn(polymarket.clone().run_market_stream(poly_markets));
        tokio::spawn(kalshi.clone().run_market_stream(kalshi_markets));
        info!("market data streams launched");
    }

    // ── 8. Copy trading ──────────────────────────────────────────────────
    let copy_trader = Arc::new(CopyTrader::new(
        config.tracked_traders.clone(),
        polymarket.clone(),
        orders.clone(),
        clock,
        config.copy_poll_interval_ms,
    ));
    copy_trader.start();

    // ── 9. Admin API ─────────────────────────────────────────────────────
    let state = Arc::new(AppState::new(
        engine.clone(),
        orders,
        risk,
        health,
        copy_trader,
        clients
            .iter()
            .map(|(platform, client)| (*platform, client.clone()))
            .collect(),
    ));
    let bind_addr =
        std::env::var("MERIDIAN_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    {
        let app = api::rest::router(state);
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!(addr = %bind_addr, "admin API listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "admin API server failed");
            }
        });
    }

    info!("all subsystems running — press Ctrl+C to stop");

    // ── 10. Graceful shutdown ────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("shutdown signal received — stopping gracefully");

    if let Err(e) = engine.stop().await {
        error!(error = %e, "engine stop failed");
    }
    if let Err(e) = config.save(CONFIG_PATH) {
        error!(error = %e, "failed to save runtime config on shutdown");
    }

    info!("Meridian shut down complete.");
    Ok(())
}
