// =============================================================================
// Runtime Configuration — hot-reloadable engine settings with atomic save
// =============================================================================
//
// Every tunable of the Meridian engine lives here. Persistence uses the
// tmp + rename pattern so a crash mid-write never corrupts the file, and all
// fields carry `#[serde(default)]` so older config files keep loading after
// new fields appear.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_paper_balance() -> f64 {
    10_000.0
}

fn default_max_position_size_usd() -> f64 {
    1_000.0
}

fn default_max_total_exposure_usd() -> f64 {
    5_000.0
}

fn default_max_daily_loss_usd() -> f64 {
    500.0
}

fn default_max_drawdown_percent() -> f64 {
    10.0
}

fn default_min_arbitrage_spread_bps() -> f64 {
    100.0
}

fn default_signal_cooldown_ms() -> u64 {
    15_000
}

fn default_max_concurrent_signals() -> usize {
    5
}

fn default_scan_interval_ms() -> u64 {
    1_000
}

fn default_market_refresh_secs() -> u64 {
    300
}

fn default_copy_poll_interval_ms() -> u64 {
    15_000
}

fn default_min_wallet_balance_usd() -> f64 {
    50.0
}

// =============================================================================
// Venue credentials
// =============================================================================

/// Credential blob for one venue. Opaque to the core; handed to the venue
/// client untouched. Secrets are redacted from Debug output.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct VenueCredentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    /// Extra venue-specific fields (wallet address, passphrase, ...).
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl std::fmt::Debug for VenueCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueCredentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Copy-trading configuration
// =============================================================================

/// How a tracked trader's size translates into ours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SizingMode {
    Percentage,
    Fixed,
    Adaptive,
}

impl Default for SizingMode {
    fn default() -> Self {
        Self::Percentage
    }
}

/// Aggregation of a burst of detected trades into one synthetic order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Bucket window in milliseconds.
    #[serde(default = "default_aggregation_window_ms")]
    pub window_ms: u64,
    /// Bucket fires early once this many trades accumulate.
    #[serde(default = "default_aggregation_min_trades")]
    pub min_trades: usize,
}

fn default_aggregation_window_ms() -> u64 {
    5_000
}

fn default_aggregation_min_trades() -> usize {
    3
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            window_ms: default_aggregation_window_ms(),
            min_trades: default_aggregation_min_trades(),
        }
    }
}

/// One tracked wallet and its mirroring rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderCopyConfig {
    pub wallet: String,
    #[serde(default)]
    pub sizing: SizingMode,
    /// PERCENTAGE mode: fraction of the trader's notional we copy, in percent.
    #[serde(default = "default_copy_percentage")]
    pub copy_percentage: f64,
    /// FIXED mode: constant USD size per mirrored trade.
    #[serde(default = "default_fixed_copy_amount")]
    pub fixed_copy_amount: f64,
    #[serde(default = "default_min_trade_size")]
    pub min_trade_size: f64,
    #[serde(default = "default_max_position_size_usd")]
    pub max_position_size: f64,
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

fn default_copy_percentage() -> f64 {
    5.0
}

fn default_fixed_copy_amount() -> f64 {
    25.0
}

fn default_min_trade_size() -> f64 {
    5.0
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the Meridian engine.
///
/// Every field has a serde default so older JSON files missing new fields
/// still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Trading mode --------------------------------------------------------

    /// When true, orders route to the paper simulator instead of the venues.
    #[serde(default = "default_true")]
    pub paper_trading: bool,

    /// Initial simulated USD balance in paper mode.
    #[serde(default = "default_paper_balance")]
    pub paper_balance: f64,

    // --- Feature toggles -----------------------------------------------------

    /// Sum-mispricing detector on a single venue.
    #[serde(default = "default_true")]
    pub enable_single_platform_arb: bool,

    /// Cross-venue mispricing detector over matched pairs.
    #[serde(default = "default_true")]
    pub enable_cross_platform_arb: bool,

    /// Streaming ingress (WebSocket book/trade feeds).
    #[serde(default = "default_true")]
    pub enable_web_socket: bool,

    // --- Risk limits ---------------------------------------------------------

    #[serde(default = "default_max_position_size_usd")]
    pub max_position_size_usd: f64,

    #[serde(default = "default_max_total_exposure_usd")]
    pub max_total_exposure_usd: f64,

    #[serde(default = "default_max_daily_loss_usd")]
    pub max_daily_loss_usd: f64,

    #[serde(default = "default_max_drawdown_percent")]
    pub max_drawdown_percent: f64,

    #[serde(default = "default_min_arbitrage_spread_bps")]
    pub min_arbitrage_spread_bps: f64,

    // --- Strategy manager ----------------------------------------------------

    /// Per-market cooldown after a signal is emitted.
    #[serde(default = "default_signal_cooldown_ms")]
    pub signal_cooldown_ms: u64,

    /// Top-K signals returned per scan.
    #[serde(default = "default_max_concurrent_signals")]
    pub max_concurrent_signals: usize,

    // --- Scheduling ----------------------------------------------------------

    #[serde(default = "default_scan_interval_ms")]
    pub scan_interval_ms: u64,

    /// How often the market catalogs are refetched from the venues.
    #[serde(default = "default_market_refresh_secs")]
    pub market_refresh_secs: u64,

    // --- Copy trading --------------------------------------------------------

    #[serde(default = "default_copy_poll_interval_ms")]
    pub copy_poll_interval_ms: u64,

    #[serde(default)]
    pub tracked_traders: Vec<TraderCopyConfig>,

    // --- Health --------------------------------------------------------------

    /// Wallet balance below this trips the balance health check.
    #[serde(default = "default_min_wallet_balance_usd")]
    pub min_wallet_balance_usd: f64,

    // --- Venue credentials ---------------------------------------------------

    #[serde(default)]
    pub polymarket_credentials: VenueCredentials,

    #[serde(default)]
    pub kalshi_credentials: VenueCredentials,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            paper_trading: true,
            paper_balance: default_paper_balance(),
            enable_single_platform_arb: true,
            enable_cross_platform_arb: true,
            enable_web_socket: true,
            max_position_size_usd: default_max_position_size_usd(),
            max_total_exposure_usd: default_max_total_exposure_usd(),
            max_daily_loss_usd: default_max_daily_loss_usd(),
            max_drawdown_percent: default_max_drawdown_percent(),
            min_arbitrage_spread_bps: default_min_arbitrage_spread_bps(),
            signal_cooldown_ms: default_signal_cooldown_ms(),
            max_concurrent_signals: default_max_concurrent_signals(),
            scan_interval_ms: default_scan_interval_ms(),
            market_refresh_secs: default_market_refresh_secs(),
            copy_poll_interval_ms: default_copy_poll_interval_ms(),
            tracked_traders: Vec::new(),
            min_wallet_balance_usd: default_min_wallet_balance_usd(),
            polymarket_credentials: VenueCredentials::default(),
            kalshi_credentials: VenueCredentials::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// Returns an error if the file is missing or malformed so the caller can
    /// fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            paper_trading = config.paper_trading,
            tracked_traders = config.tracked_traders.len(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert!(cfg.paper_trading);
        assert_eq!(cfg.paper_balance, 10_000.0);
        assert!(cfg.enable_single_platform_arb);
        assert!(cfg.enable_cross_platform_arb);
        assert!(cfg.enable_web_socket);
        assert_eq!(cfg.max_position_size_usd, 1_000.0);
        assert_eq!(cfg.max_total_exposure_usd, 5_000.0);
        assert_eq!(cfg.max_daily_loss_usd, 500.0);
        assert_eq!(cfg.max_drawdown_percent, 10.0);
        assert_eq!(cfg.min_arbitrage_spread_bps, 100.0);
        assert_eq!(cfg.signal_cooldown_ms, 15_000);
        assert_eq!(cfg.max_concurrent_signals, 5);
        assert_eq!(cfg.scan_interval_ms, 1_000);
        assert!(cfg.tracked_traders.is_empty());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert!(cfg.paper_trading);
        assert_eq!(cfg.max_concurrent_signals, 5);
        assert_eq!(cfg.copy_poll_interval_ms, 15_000);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "paper_trading": false, "max_daily_loss_usd": 250.0 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert!(!cfg.paper_trading);
        assert_eq!(cfg.max_daily_loss_usd, 250.0);
        assert_eq!(cfg.max_total_exposure_usd, 5_000.0);
        assert!(cfg.enable_cross_platform_arb);
    }

    #[test]
    fn roundtrip_serialisation() {
        let mut cfg = RuntimeConfig::default();
        cfg.tracked_traders.push(TraderCopyConfig {
            wallet: "0xwhale".into(),
            sizing: SizingMode::Adaptive,
            copy_percentage: 2.0,
            fixed_copy_amount: 50.0,
            min_trade_size: 10.0,
            max_position_size: 400.0,
            aggregation: AggregationConfig {
                enabled: true,
                window_ms: 2_000,
                min_trades: 2,
            },
        });
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg2.tracked_traders.len(), 1);
        assert_eq!(cfg2.tracked_traders[0].sizing, SizingMode::Adaptive);
        assert!(cfg2.tracked_traders[0].aggregation.enabled);
    }

    #[test]
    fn credentials_debug_is_redacted() {
        let creds = VenueCredentials {
            api_key: "key-123".into(),
            api_secret: "secret-456".into(),
            extra: serde_json::Value::Null,
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("key-123"));
        assert!(!debug.contains("secret-456"));
    }

    #[test]
    fn sizing_mode_wire_format_is_uppercase() {
        assert_eq!(
            serde_json::to_string(&SizingMode::Percentage).unwrap(),
            "\"PERCENTAGE\""
        );
        let mode: SizingMode = serde_json::from_str("\"ADAPTIVE\"").unwrap();
        assert_eq!(mode, SizingMode::Adaptive);
    }
}
