// =============================================================================
// Paper Trading Engine — synthetic fills with latency, slippage, and fees
// =============================================================================
//
// Model, applied per order:
//   - Latency:  U(50, 500) ms before the fill event lands.
//   - Fill:     probability 0.95; a miss leaves the order open until
//               cancelled.
//   - Partial:  conditional on fill, probability 0.10 with a uniform
//               fraction of the requested size.
//   - Slippage: base 5 bps + size impact + volatility term, signed against
//               the order direction, clamped so price stays inside
//               (MIN_PRICE, MAX_PRICE).
//   - Fees:     per-venue schedule.
//
// The dice-roll interpretation is a pure function of the drawn rolls so the
// whole model is unit-testable without touching the RNG.
// =============================================================================

use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::types::{OrderSide, Platform, BPS_DIVISOR, MAX_PRICE, MIN_PRICE};
use crate::venue::VenueFees;

const FILL_PROBABILITY: f64 = 0.95;
const PARTIAL_FILL_PROBABILITY: f64 = 0.10;
const BASE_SLIPPAGE_BPS: f64 = 5.0;
/// Extra slippage bps per contract of order size.
const SIZE_IMPACT_FACTOR: f64 = 0.005;
/// Extra slippage bps per unit of log-return volatility.
const VOLATILITY_MULTIPLIER: f64 = 50.0;
const MIN_LATENCY_MS: u64 = 50;
const MAX_LATENCY_MS: u64 = 500;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of one simulated placement.
#[derive(Debug, Clone, PartialEq)]
pub enum SimOutcome {
    /// Order fills (fully or partially) after the latency elapses.
    Fill {
        price: f64,
        size: f64,
        partial: bool,
        fee: f64,
    },
    /// The 5% no-fill draw: order rests open until cancelled.
    NoFill,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Simulator active when `paper_trading` is on. Orders never reach a venue.
pub struct PaperEngine {
    rng: Mutex<StdRng>,
    /// Simulated cash balance in USD.
    balance: RwLock<f64>,
}

impl PaperEngine {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
            balance: RwLock::new(starting_balance),
        }
    }

    /// Deterministic variant for tests.
    pub fn with_seed(starting_balance: f64, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            balance: RwLock::new(starting_balance),
        }
    }

    pub fn balance(&self) -> f64 {
        *self.balance.read()
    }

    /// Draw latency and a fill outcome for an order.
    ///
    /// `sigma` is the market's current log-return volatility (0.0 when the
    /// tracker has no stats yet).
    pub fn simulate(
        &self,
        platform: Platform,
        side: OrderSide,
        price: f64,
        size: f64,
        sigma: f64,
    ) -> (Duration, SimOutcome) {
        let mut rng = self.rng.lock();
        let latency = Duration::from_millis(rng.gen_range(MIN_LATENCY_MS..=MAX_LATENCY_MS));
        let fill_roll: f64 = rng.gen();
        let partial_roll: f64 = rng.gen();
        let fraction_roll: f64 = rng.gen();
        drop(rng);

        let outcome = fill_outcome(
            platform,
            side,
            price,
            size,
            sigma,
            fill_roll,
            partial_roll,
            fraction_roll,
        );
        debug!(
            %platform, %side, price, size, sigma,
            latency_ms = latency.as_millis() as u64,
            ?outcome,
            "paper fill simulated"
        );
        (latency, outcome)
    }

    /// Settle a fill against the simulated cash balance.
    pub fn settle(&self, side: OrderSide, price: f64, size: f64, fee: f64) {
        let mut balance = self.balance.write();
        match side {
            OrderSide::Buy => *balance -= price * size + fee,
            OrderSide::Sell => *balance += price * size - fee,
        }
    }
}

impl std::fmt::Debug for PaperEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperEngine")
            .field("balance", &self.balance())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Pure fill model
// ---------------------------------------------------------------------------

/// Slippage in basis points for an order of `size` on a market with
/// log-return volatility `sigma`.
pub fn slippage_bps(size: f64, sigma: f64) -> f64 {
    BASE_SLIPPAGE_BPS + SIZE_IMPACT_FACTOR * size + VOLATILITY_MULTIPLIER * sigma
}

/// Interpret three uniform rolls as a fill outcome.
#[allow(clippy::too_many_arguments)]
fn fill_outcome(
    platform: Platform,
    side: OrderSide,
    price: f64,
    size: f64,
    sigma: f64,
    fill_roll: f64,
    partial_roll: f64,
    fraction_roll: f64,
) -> SimOutcome {
    if fill_roll >= FILL_PROBABILITY {
        return SimOutcome::NoFill;
    }

    let partial = partial_roll < PARTIAL_FILL_PROBABILITY;
    let filled_size = if partial {
        // Uniform fraction, floored away from zero-size fills.
        (size * fraction_roll).max(size * 0.05)
    } else {
        size
    };

    // Slippage works against the order: buys pay up, sells receive less.
    let slip = price * slippage_bps(size, sigma) / BPS_DIVISOR;
    let fill_price = match side {
        OrderSide::Buy => price + slip,
        OrderSide::Sell => price - slip,
    }
    .clamp(MIN_PRICE, MAX_PRICE);

    let fee = VenueFees::for_platform(platform).taker_fee(fill_price, filled_size);

    SimOutcome::Fill {
        price: fill_price,
        size: filled_size,
        partial,
        fee,
    }
}
