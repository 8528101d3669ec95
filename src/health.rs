// =============================================================================
// Health Monitor & Kill Switch
// =============================================================================
//
// The monitor runs periodic component checks (repository, venues, event-loop
// lag, memory, wallet balance); overall health is the worst constituent. The
// kill switch latches on the first trigger — manual call, daily-loss breach,
// drawdown breach, position-limit breach, venue error rate, or internal error
// rate — cancels all orders, halts trading, and stays disabled until an
// operator explicitly re-arms it.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::orders::OrderManager;
use crate::persistence::Repository;
use crate::risk::RiskEngine;
use crate::types::Platform;
use crate::venue::VenueClient;

/// Error-rate window length.
const ERROR_WINDOW_SECS: u64 = 60;
/// Venue errors per window that trip the switch.
const MAX_VENUE_ERRORS_PER_WINDOW: u64 = 20;
/// Internal errors per window that trip the switch.
const MAX_INTERNAL_ERRORS_PER_WINDOW: u64 = 5;
/// Event-loop lag threshold.
const MAX_EVENT_LOOP_LAG_MS: u64 = 250;
/// Resident memory threshold, bytes.
const MAX_MEMORY_BYTES: u64 = 2 * 1024 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Kill switch
// ---------------------------------------------------------------------------

/// Why trading was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KillReason {
    Manual,
    DailyLossBreach,
    DrawdownBreach,
    PositionLimitBreach,
    VenueErrorRate,
    InternalErrorRate,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillEvent {
    pub reason: KillReason,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Latched state returned by the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct KillState {
    pub disabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<KillReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tripped_at: Option<DateTime<Utc>>,
}

/// Latched global halt. Tripping is idempotent: the first trigger wins and
/// re-triggering returns the existing latched state.
pub struct KillSwitch {
    latched: RwLock<Option<KillEvent>>,
    events_tx: broadcast::Sender<KillEvent>,
}

impl KillSwitch {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(16);
        Self {
            latched: RwLock::new(None),
            events_tx,
        }
    }

    /// Trip the switch. Returns `true` only for the first (effective) trip.
    pub fn trip(&self, reason: KillReason, detail: impl Into<String>) -> bool {
        let mut latched = self.latched.write();
        if latched.is_some() {
            return false;
        }
        let event = KillEvent {
            reason,
            detail: detail.into(),
            at: Utc::now(),
        };
        error!(?reason, detail = %event.detail, "KILL SWITCH TRIPPED — trading halted");
        *latched = Some(event.clone());
        let _ = self.events_tx.send(event);
        true
    }

    pub fn is_tripped(&self) -> bool {
        self.latched.read().is_some()
    }

    pub fn state(&self) -> KillState {
        match self.latched.read().as_ref() {
            Some(event) => KillState {
                disabled: true,
                reason: Some(event.reason),
                detail: Some(event.detail.clone()),
                tripped_at: Some(event.at),
            },
            None => KillState {
                disabled: false,
                reason: None,
                detail: None,
                tripped_at: None,
            },
        }
    }

    /// Explicit operator re-arm. Returns `false` when the switch was not
    /// tripped.
    pub fn rearm(&self) -> bool {
        let mut latched = self.latched.write();
        if latched.is_none() {
            return false;
        }
        warn!("kill switch re-armed by operator");
        *latched = None;
        true
    }

    pub fn subscribe(&self) -> broadcast::Receiver<KillEvent> {
        self.events_tx.subscribe()
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Health checks
// ---------------------------------------------------------------------------

/// One component's check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub name: String,
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall report: healthy iff every constituent is.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub checks: Vec<HealthCheck>,
    pub kill_switch: KillState,
    pub at: DateTime<Utc>,
}

/// Sliding error-rate counter.
struct ErrorWindow {
    count: AtomicU64,
    window_start_ms: AtomicU64,
}

impl ErrorWindow {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            window_start_ms: AtomicU64::new(0),
        }
    }

    /// Record one error; returns the count inside the current window.
    fn note(&self, now_ms: u64) -> u64 {
        let start = self.window_start_ms.load(Ordering::SeqCst);
        if now_ms.saturating_sub(start) > ERROR_WINDOW_SECS * 1_000 {
            self.window_start_ms.store(now_ms, Ordering::SeqCst);
            self.count.store(0, Ordering::SeqCst);
        }
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct HealthMonitor {
    clients: Vec<(Platform, Arc<dyn VenueClient>)>,
    orders: Arc<OrderManager>,
    risk: Arc<RiskEngine>,
    repository: Arc<dyn Repository>,
    kill_switch: Arc<KillSwitch>,
    clock: crate::clock::SharedClock,
    min_wallet_balance_usd: f64,
    venue_errors: ErrorWindow,
    internal_errors: ErrorWindow,
    last_report: RwLock<Option<HealthReport>>,
}

impl HealthMonitor {
    pub fn new(
        clients: Vec<(Platform, Arc<dyn VenueClient>)>,
        orders: Arc<OrderManager>,
        risk: Arc<RiskEngine>,
        repository: Arc<dyn Repository>,
        kill_switch: Arc<KillSwitch>,
        clock: crate::clock::SharedClock,
        min_wallet_balance_usd: f64,
    ) -> Self {
        Self {
            clients,
            orders,
            risk,
            repository,
            kill_switch,
            clock,
            min_wallet_balance_usd,
            venue_errors: ErrorWindow::new(),
            internal_errors: ErrorWindow::new(),
            last_report: RwLock::new(None),
        }
    }

    pub fn kill_switch(&self) -> Arc<KillSwitch> {
        self.kill_switch.clone()
    }

    pub fn last_report(&self) -> Option<HealthReport> {
        self.last_report.read().clone()
    }

    // -------------------------------------------------------------------------
    // Error-rate triggers
    // -------------------------------------------------------------------------

    /// Record a venue transport/protocol error; trips the switch past the
    /// windowed threshold.
    pub fn note_venue_error(&self, platform: Platform, message: &str) {
        let count = self.venue_errors.note(self.clock.now_ms());
        if count >= MAX_VENUE_ERRORS_PER_WINDOW {
            self.trip_and_flatten(
                KillReason::VenueErrorRate,
                format!("{count} venue errors in {ERROR_WINDOW_SECS}s (last: {platform}: {message})"),
            );
        }
    }

    /// Record an internal error (invariant violation, unhedged alert).
    pub fn note_internal_error(&self, message: &str) {
        let count = self.internal_errors.note(self.clock.now_ms());
        if count >= MAX_INTERNAL_ERRORS_PER_WINDOW {
            self.trip_and_flatten(
                KillReason::InternalErrorRate,
                format!("{count} internal errors in {ERROR_WINDOW_SECS}s (last: {message})"),
            );
        }
    }

    /// Trip the switch and cancel everything outstanding.
    pub fn trip_and_flatten(&self, reason: KillReason, detail: String) {
        if self.kill_switch.trip(reason, detail) {
            let orders = self.orders.clone();
            tokio::spawn(async move {
                let cancelled = orders.cancel_all_orders(None).await;
                warn!(cancelled, "kill switch cancelled outstanding orders");
            });
        }
    }

    // -------------------------------------------------------------------------
    // Periodic loop
    // -------------------------------------------------------------------------

    /// Run checks every `interval` until the process exits.
    pub async fn run(self: Arc<Self>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "health monitor started");
        loop {
            ticker.tick().await;
            let report = self.check_all().await;
            if !report.healthy {
                warn!(
                    failing = report
                        .checks
                        .iter()
                        .filter(|c| !c.healthy)
                        .map(|c| c.name.clone())
                        .collect::<Vec<_>>()
                        .join(","),
                    "health degraded"
                );
            }
            self.check_risk_breaches();
            *self.last_report.write() = Some(report);
        }
    }

    /// Risk-limit breaches trip the kill switch.
    fn check_risk_breaches(&self) {
        if self.kill_switch.is_tripped() {
            return;
        }
        if self.risk.daily_loss_breached() {
            self.trip_and_flatten(
                KillReason::DailyLossBreach,
                "daily loss limit breached".into(),
            );
        } else if self.risk.drawdown_breached() {
            self.trip_and_flatten(
                KillReason::DrawdownBreach,
                "drawdown limit breached".into(),
            );
        } else {
            let exposure = self.orders.positions().total_exposure();
            let limit = self.risk.limits().max_total_exposure_usd;
            if exposure > limit {
                self.trip_and_flatten(
                    KillReason::PositionLimitBreach,
                    format!("exposure {exposure:.2} exceeds limit {limit:.2}"),
                );
            }
        }
    }

    /// Run every component check once.
    pub async fn check_all(&self) -> HealthReport {
        let mut checks = Vec::new();

        checks.push(self.check_repository().await);
        for (platform, client) in &self.clients {
            checks.push(check_venue(*platform, client.as_ref()));
        }
        checks.push(check_event_loop_lag().await);
        checks.push(check_memory());
        checks.push(self.check_balance().await);

        let healthy = checks.iter().all(|c| c.healthy);
        HealthReport {
            healthy,
            checks,
            kill_switch: self.kill_switch.state(),
            at: Utc::now(),
        }
    }

    async fn check_repository(&self) -> HealthCheck {
        let start = std::time::Instant::now();
        let healthy = self.repository.ping().await;
        HealthCheck {
            name: "repository".into(),
            healthy,
            latency_ms: start.elapsed().as_millis() as u64,
            message: (!healthy).then(|| "repository unreachable".into()),
        }
    }

    async fn check_balance(&self) -> HealthCheck {
        let start = std::time::Instant::now();
        // Paper mode reads the simulated balance; live mode asks the venues.
        let balance = if let Some(paper) = self.orders.paper_engine() {
            Some(paper.balance())
        } else {
            let mut total = 0.0;
            let mut any = false;
            for (_, client) in &self.clients {
                if let Ok(balance) = client.get_balance().await {
                    total += balance.available;
                    any = true;
                }
            }
            any.then_some(total)
        };

        match balance {
            Some(available) => {
                let healthy = available >= self.min_wallet_balance_usd;
                HealthCheck {
                    name: "wallet_balance".into(),
                    healthy,
                    latency_ms: start.elapsed().as_millis() as u64,
                    message: (!healthy).then(|| {
                        format!(
                            "balance {available:.2} below minimum {:.2}",
                            self.min_wallet_balance_usd
                        )
                    }),
                }
            }
            None => HealthCheck {
                name: "wallet_balance".into(),
                healthy: false,
                latency_ms: start.elapsed().as_millis() as u64,
                message: Some("no venue balance available".into()),
            },
        }
    }
}

fn check_venue(platform: Platform, client: &dyn VenueClient) -> HealthCheck {
    let healthy = client.is_connected();
    HealthCheck {
        name: format!("venue_{platform}"),
        healthy,
        latency_ms: 0,
        message: (!healthy).then(|| "disconnected".into()),
    }
}

/// Measure scheduler drift over a short sleep.
async fn check_event_loop_lag() -> HealthCheck {
    let target = Duration::from_millis(10);
    let start = std::time::Instant::now();
    tokio::time::sleep(target).await;
    let lag_ms = start.elapsed().saturating_sub(target).as_millis() as u64;
    HealthCheck {
        name: "event_loop_lag".into(),
        healthy: lag_ms < MAX_EVENT_LOOP_LAG_MS,
        latency_ms: lag_ms,
        message: (lag_ms >= MAX_EVENT_LOOP_LAG_MS)
            .then(|| format!("event loop lag {lag_ms}ms")),
    }
}

fn check_memory() -> HealthCheck {
    let start = std::time::Instant::now();
    let system = sysinfo::System::new_all();
    let check = match sysinfo::get_current_pid() {
        Ok(pid) => {
            match system.process(pid) {
                Some(process) => {
                    let used = process.memory();
                    HealthCheck {
                        name: "memory".into(),
                        healthy: used < MAX_MEMORY_BYTES,
                        latency_ms: start.elapsed().as_millis() as u64,
                        message: (used >= MAX_MEMORY_BYTES)
                            .then(|| format!("resident memory {used} bytes")),
                    }
                }
                None => HealthCheck {
                    name: "memory".into(),
                    healthy: true,
                    latency_ms: start.elapsed().as_millis() as u64,
                    message: Some("process stats unavailable".into()),
                },
            }
        }
        Err(_) => HealthCheck {
            name: "memory".into(),
            healthy: true,
            latency_ms: start.elapsed().as_millis() as u64,
            message: Some("pid unavailable".into()),
        },
    };
    check
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_switch_latches_first_trigger() {
        let switch = KillSwitch::new();
        assert!(!switch.is_tripped());

        assert!(switch.trip(KillReason::DailyLossBreach, "limit hit"));
        assert!(switch.is_tripped());

        // Re-trip is idempotent: the first reason stays latched.
        assert!(!switch.trip(KillReason::Manual, "operator"));
        let state = switch.state();
        assert!(state.disabled);
        assert_eq!(state.reason, Some(KillReason::DailyLossBreach));
    }

    #[test]
    fn rearm_requires_a_tripped_switch() {
        let switch = KillSwitch::new();
        assert!(!switch.rearm());

        switch.trip(KillReason::Manual, "operator");
        assert!(switch.rearm());
        assert!(!switch.is_tripped());
        assert!(!switch.state().disabled);
    }

    #[test]
    fn trip_broadcasts_to_subscribers() {
        let switch = KillSwitch::new();
        let mut rx = switch.subscribe();
        switch.trip(KillReason::VenueErrorRate, "storm");
        let event = rx.try_recv().unwrap();
        assert_eq!(event.reason, KillReason::VenueErrorRate);
    }

    #[test]
    fn error_window_resets_after_expiry() {
        let window = ErrorWindow::new();
        assert_eq!(window.note(1_000), 1);
        assert_eq!(window.note(2_000), 2);
        // Past the 60 s window: the counter starts over.
        assert_eq!(window.note(70_000), 1);
    }

    #[tokio::test]
    async fn event_loop_lag_check_reports_latency() {
        let check = check_event_loop_lag().await;
        assert_eq!(check.name, "event_loop_lag");
        assert!(check.healthy);
    }

    #[test]
    fn worst_of_aggregation() {
        let healthy_check = HealthCheck {
            name: "a".into(),
            healthy: true,
            latency_ms: 1,
            message: None,
        };
        let failing_check = HealthCheck {
            name: "b".into(),
            healthy: false,
            latency_ms: 1,
            message: Some("down".into()),
        };
        let report = HealthReport {
            healthy: [&healthy_check, &failing_check].iter().all(|c| c.healthy),
            checks: vec![healthy_check, failing_check],
            kill_switch: KillSwitch::new().state(),
            at: Utc::now(),
        };
        assert!(!report.healthy);
    }
}
