// =============================================================================
// Price-series and book math
// =============================================================================
//
// Pure functions over price slices. RSI uses Wilder's smoothing:
//   Step 1 — deltas from consecutive prices.
//   Step 2 — seed avg gain/loss with the SMA of the first `period` deltas.
//   Step 3 — avg = (prev_avg * (period - 1) + current) / period
//   Step 4 — RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//
// Volatility is the standard deviation of log-returns, not raw prices, so it
// is comparable across price levels.
// =============================================================================

/// Simple moving average over the trailing `period` values.
///
/// Returns `None` when fewer than `period` values exist or `period == 0`.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let tail = &values[values.len() - period..];
    Some(tail.iter().sum::<f64>() / period as f64)
}

/// Volume-weighted average price: `sum(p_i * v_i) / sum(v_i)`.
///
/// Falls back to the plain mean when total volume is zero (all sizes absent).
pub fn vwap(prices: &[f64], volumes: &[f64]) -> Option<f64> {
    if prices.is_empty() || prices.len() != volumes.len() {
        return None;
    }
    let total_volume: f64 = volumes.iter().sum();
    if total_volume <= 0.0 {
        return Some(prices.iter().sum::<f64>() / prices.len() as f64);
    }
    let weighted: f64 = prices.iter().zip(volumes).map(|(p, v)| p * v).sum();
    Some(weighted / total_volume)
}

/// Standard deviation of log-returns over the series.
///
/// Needs at least 3 points (2 returns). Non-positive prices yield `None`.
pub fn log_return_volatility(prices: &[f64]) -> Option<f64> {
    if prices.len() < 3 {
        return None;
    }
    if prices.iter().any(|&p| p <= 0.0) {
        return None;
    }
    let returns: Vec<f64> = prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect();
    stdev(&returns)
}

/// Sample standard deviation.
pub fn stdev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(variance.sqrt())
}

/// Latest RSI over `prices` with Wilder smoothing.
///
/// # Edge cases
/// - `period == 0` or fewer than `period + 1` prices => `None`
/// - All gains => 100.0; all losses => 0.0; flat => 50.0
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();

    let (sum_gain, sum_loss) = deltas[..period]
        .iter()
        .fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            if d > 0.0 {
                (g + d, l)
            } else {
                (g, l + d.abs())
            }
        });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
    }

    let value = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    value.is_finite().then_some(value)
}

/// Percentage change from the first to the last value.
pub fn change_percent(prices: &[f64]) -> Option<f64> {
    let first = *prices.first()?;
    let last = *prices.last()?;
    if first == 0.0 {
        return None;
    }
    Some((last - first) / first * 100.0)
}

/// Maximum peak-to-trough drawdown over an equity series, as a fraction.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > worst {
                worst = dd;
            }
        }
    }
    worst
}

/// Annualization-free Sharpe ratio over a return series: mean / stdev.
///
/// Returns `None` when the series is too short or has zero variance.
pub fn sharpe(returns: &[f64]) -> Option<f64> {
    let sd = stdev(returns)?;
    if sd == 0.0 {
        return None;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    Some(mean / sd)
}

/// Mid price of a quote.
pub fn mid(bid: f64, ask: f64) -> f64 {
    (bid + ask) / 2.0
}

/// Quoted spread in basis points of the mid.
pub fn spread_bps(bid: f64, ask: f64) -> f64 {
    let m = mid(bid, ask);
    if m <= 0.0 {
        return 0.0;
    }
    (ask - bid) / m * crate::types::BPS_DIVISOR
}

/// Round a price to the venue tick, clamped inside the tradeable band.
pub fn round_to_tick(price: f64, tick: f64) -> f64 {
    let rounded = if tick > 0.0 {
        (price / tick).round() * tick
    } else {
        price
    };
    rounded.clamp(crate::types::MIN_PRICE, crate::types::MAX_PRICE)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_basic() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(sma(&values, 2), Some(3.5));
        assert_eq!(sma(&values, 4), Some(2.5));
        assert_eq!(sma(&values, 5), None);
        assert_eq!(sma(&values, 0), None);
    }

    #[test]
    fn vwap_weights_by_volume() {
        let prices = [0.40, 0.60];
        let volumes = [3.0, 1.0];
        let v = vwap(&prices, &volumes).unwrap();
        assert!((v - 0.45).abs() < 1e-12);
    }

    #[test]
    fn vwap_falls_back_to_mean_without_volume() {
        let prices = [0.40, 0.60];
        let volumes = [0.0, 0.0];
        assert_eq!(vwap(&prices, &volumes), Some(0.5));
    }

    #[test]
    fn vwap_rejects_mismatched_lengths() {
        assert_eq!(vwap(&[0.5], &[]), None);
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let v = rsi(&prices, 14).unwrap();
        assert!((v - 100.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let prices: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let v = rsi(&prices, 14).unwrap();
        assert!(v.abs() < 1e-10);
    }

    #[test]
    fn rsi_flat_is_neutral() {
        let prices = vec![0.5; 30];
        assert_eq!(rsi(&prices, 14), Some(50.0));
    }

    #[test]
    fn rsi_insufficient_data() {
        let prices: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert_eq!(rsi(&prices, 14), None);
        assert_eq!(rsi(&prices, 0), None);
    }

    #[test]
    fn rsi_stays_in_range() {
        let prices = [
            0.44, 0.41, 0.45, 0.43, 0.48, 0.52, 0.51, 0.55, 0.58, 0.56, 0.53, 0.57, 0.44, 0.42,
            0.45, 0.43, 0.42, 0.43,
        ];
        let v = rsi(&prices, 14).unwrap();
        assert!((0.0..=100.0).contains(&v));
    }

    #[test]
    fn volatility_of_constant_series_is_zero() {
        let prices = vec![0.5; 10];
        let v = log_return_volatility(&prices).unwrap();
        assert!(v.abs() < 1e-12);
    }

    #[test]
    fn volatility_rejects_short_or_nonpositive() {
        assert_eq!(log_return_volatility(&[0.5, 0.6]), None);
        assert_eq!(log_return_volatility(&[0.5, 0.0, 0.6]), None);
    }

    #[test]
    fn change_percent_end_to_end() {
        let prices = [0.50, 0.55];
        assert!((change_percent(&prices).unwrap() - 10.0).abs() < 1e-10);
        assert_eq!(change_percent(&[]), None);
    }

    #[test]
    fn drawdown_peak_to_trough() {
        // Peak 100, trough 60 => 40% drawdown.
        let equity = [80.0, 100.0, 90.0, 60.0, 75.0];
        assert!((max_drawdown(&equity) - 0.4).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn sharpe_sign_follows_mean_return() {
        let gains = [0.01, 0.02, 0.015, 0.005];
        assert!(sharpe(&gains).unwrap() > 0.0);
        let losses = [-0.01, -0.02, -0.015, -0.005];
        assert!(sharpe(&losses).unwrap() < 0.0);
        assert_eq!(sharpe(&[0.01]), None);
    }

    #[test]
    fn spread_bps_of_symmetric_quote() {
        // bid 0.49, ask 0.51 => spread 0.02 over mid 0.50 => 400 bps.
        assert!((spread_bps(0.49, 0.51) - 400.0).abs() < 1e-9);
        assert_eq!(spread_bps(0.0, 0.0), 0.0);
    }

    #[test]
    fn round_to_tick_clamps_to_band() {
        assert!((round_to_tick(0.449, 0.01) - 0.45).abs() < 1e-12);
        assert_eq!(round_to_tick(0.001, 0.01), crate::types::MIN_PRICE);
        assert_eq!(round_to_tick(1.2, 0.01), crate::types::MAX_PRICE);
    }
}
