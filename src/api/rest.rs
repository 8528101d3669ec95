// =============================================================================
// REST Admin API — Axum 0.7
// =============================================================================
//
// Operator surface only: health, catalogs, positions, balances, trading
// control, and the kill switch. The kill-switch endpoints are idempotent and
// always answer with the latched state. CORS is configured permissively for
// development; tighten `allowed_origins` in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{Any, CorsLayer};
use serde::Serialize;
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::engine::EngineState;
use crate::health::KillReason;

// =============================================================================
// Router construction
// =============================================================================

/// Build the admin router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/markets", get(markets))
        .route("/positions", get(positions))
        .route("/balances", get(balances))
        .route("/trading/status", get(trading_status))
        .route("/trading/pairs", get(trading_pairs))
        .route("/trading/start", post(trading_start))
        .route("/trading/stop", post(trading_stop))
        .route("/trading/scan", post(trading_scan))
        .route("/kill-switch", post(kill_switch))
        .route("/kill-switch/rearm", post(kill_switch_rearm))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.health.last_report() {
        Some(report) => {
            let status = if report.healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(serde_json::to_value(report).unwrap_or_default()))
        }
        None => (
            StatusCode::OK,
            Json(serde_json::json!({
                "healthy": true,
                "checks": [],
                "message": "first check pending",
            })),
        ),
    }
}

// =============================================================================
// Catalogs & books
// =============================================================================

async fn markets(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.markets())
}

async fn positions(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.all_positions())
}

async fn balances(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.balances().await)
}

// =============================================================================
// Trading control
// =============================================================================

async fn trading_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.trading_status())
}

async fn trading_pairs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.matched_pairs())
}

#[derive(Serialize)]
struct ControlResponse {
    state: EngineState,
    message: String,
}

async fn trading_start(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.health.kill_switch().is_tripped() {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "kill switch latched — re-arm before starting",
                "kill_switch": state.health.kill_switch().state(),
            })),
        )
            .into_response();
    }

    match state.engine.start() {
        Ok(()) => {
            state.increment_version();
            info!("trading started via API");
            Json(ControlResponse {
                state: state.engine.state(),
                message: "trading started".into(),
            })
            .into_response()
        }
        Err(e) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn trading_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.engine.stop().await {
        Ok(()) => {
            state.increment_version();
            warn!("trading stopped via API");
            Json(ControlResponse {
                state: state.engine.state(),
                message: "trading stopped".into(),
            })
            .into_response()
        }
        Err(e) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn trading_scan(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let attempted = state.engine.trigger_scan().await;
    state.increment_version();
    Json(serde_json::json!({
        "attempted_executions": attempted,
        "engine": state.engine.stats(),
    }))
}

// =============================================================================
// Kill switch (idempotent — always answers with the latched state)
// =============================================================================

async fn kill_switch(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let switch = state.health.kill_switch();
    let newly_tripped = {
        if switch.is_tripped() {
            false
        } else {
            state
                .health
                .trip_and_flatten(KillReason::Manual, "operator kill switch".into());
            true
        }
    };
    if newly_tripped {
        state.increment_version();
        warn!("kill switch tripped via API");
    }
    Json(serde_json::json!({
        "newly_tripped": newly_tripped,
        "kill_switch": switch.state(),
    }))
}

async fn kill_switch_rearm(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let switch = state.health.kill_switch();
    let rearmed = switch.rearm();
    if rearmed {
        state.increment_version();
        info!("kill switch re-armed via API");
    }
    Json(serde_json::json!({
        "rearmed": rearmed,
        "kill_switch": switch.state(),
    }))
}
