// =============================================================================
// Stream plumbing — reconnect backoff and heartbeat bookkeeping
// =============================================================================

use std::time::Duration;

use rand::Rng;

/// WebSocket heartbeat interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A pong must arrive within this after a ping, or the socket is dead.
pub const PONG_TIMEOUT: Duration = Duration::from_secs(10);

const INITIAL_BACKOFF_MS: u64 = 1_000;
const BACKOFF_MULTIPLIER: f64 = 2.0;
const MAX_BACKOFF_MS: u64 = 30_000;
const JITTER_FRACTION: f64 = 0.1;

/// Exponential reconnect backoff: 1 s doubling to a 30 s cap, with 10%
/// jitter so both venue streams never thunder in lockstep.
#[derive(Debug)]
pub struct ReconnectBackoff {
    current_ms: u64,
}

impl ReconnectBackoff {
    pub fn new() -> Self {
        Self {
            current_ms: INITIAL_BACKOFF_MS,
        }
    }

    /// Delay to sleep before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current_ms;
        self.current_ms =
            ((self.current_ms as f64 * BACKOFF_MULTIPLIER) as u64).min(MAX_BACKOFF_MS);

        let jitter_span = (base as f64 * JITTER_FRACTION) as u64;
        let jitter = if jitter_span > 0 {
            rand::thread_rng().gen_range(0..=jitter_span)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }

    /// Reset after a successful connection.
    pub fn reset(&mut self) {
        self.current_ms = INITIAL_BACKOFF_MS;
    }
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new()
    }
}
