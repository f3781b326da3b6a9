//! Configuration types for wick-engine

use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub feed: FeedConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub coinalyze: CoinalyzeConfig,
    #[serde(default)]
    pub coingecko: CoingeckoConfig,
    #[serde(default)]
    pub alert: Option<AlertConfig>,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub micro: MicroConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Market data feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// OKX public WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// Instruments to subscribe to (e.g. "BTC-USDT")
    pub symbols: Vec<String>,
}

fn default_ws_url() -> String {
    "wss://ws.okx.com:8443/ws/v5/public".to_string()
}

/// Core detection pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Bar aggregation interval in seconds
    #[serde(default = "default_bar_interval")]
    pub bar_interval_secs: u64,

    /// Low always-on wick:body ratio for event capture
    #[serde(default = "default_capture_ratio")]
    pub capture_ratio: Decimal,

    /// Higher wick:body ratio required before an alert is sent
    #[serde(default = "default_alert_ratio")]
    pub alert_ratio: Decimal,
}

fn default_bar_interval() -> u64 {
    60
}
fn default_capture_ratio() -> Decimal {
    Decimal::new(5, 2) // 0.05
}
fn default_alert_ratio() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bar_interval_secs: default_bar_interval(),
            capture_ratio: default_capture_ratio(),
            alert_ratio: default_alert_ratio(),
        }
    }
}

/// Coinalyze derivatives poller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CoinalyzeConfig {
    #[serde(default)]
    pub api_key: String,

    /// Poll cadence in seconds
    #[serde(default = "default_derivs_poll_secs")]
    pub poll_interval_secs: u64,
}

fn default_derivs_poll_secs() -> u64 {
    30
}

impl Default for CoinalyzeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            poll_interval_secs: default_derivs_poll_secs(),
        }
    }
}

/// CoinGecko macro dominance poller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CoingeckoConfig {
    #[serde(default)]
    pub api_key: String,

    /// Poll cadence in seconds
    #[serde(default = "default_macro_poll_secs")]
    pub poll_interval_secs: u64,
}

fn default_macro_poll_secs() -> u64 {
    60
}

impl Default for CoingeckoConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            poll_interval_secs: default_macro_poll_secs(),
        }
    }
}

/// Webhook alerting configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AlertConfig {
    pub webhook_url: String,

    /// Minimum seconds between alerts for the same (symbol, side)
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_cooldown_secs() -> u64 {
    300
}

/// Event log storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Rotate the JSONL event log once it reaches this size
    #[serde(default = "default_rotation_mb")]
    pub file_rotation_mb: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_rotation_mb() -> u64 {
    100
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            file_rotation_mb: default_rotation_mb(),
        }
    }
}

/// Microstructure analyzer (void/wall) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MicroConfig {
    /// Width of each scan band in basis points
    #[serde(default = "default_band_width_bps")]
    pub band_width_bps: f64,

    /// Bottom percentile of band depth considered a void
    #[serde(default = "default_void_percentile")]
    pub void_percentile: f64,

    /// Top percentile of level notional considered a wall
    #[serde(default = "default_stack_percentile")]
    pub stack_percentile: f64,

    /// How many bands to scan outward from mid-price
    #[serde(default = "default_max_bands")]
    pub max_bands: usize,

    /// Rolling calibration history size per symbol
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Walls reported per side
    #[serde(default = "default_top_n_walls")]
    pub top_n_walls: usize,
}

fn default_band_width_bps() -> f64 {
    10.0
}
fn default_void_percentile() -> f64 {
    10.0
}
fn default_stack_percentile() -> f64 {
    90.0
}
fn default_max_bands() -> usize {
    20
}
fn default_history_size() -> usize {
    100
}
fn default_top_n_walls() -> usize {
    3
}

impl Default for MicroConfig {
    fn default() -> Self {
        Self {
            band_width_bps: default_band_width_bps(),
            void_percentile: default_void_percentile(),
            stack_percentile: default_stack_percentile(),
            max_bands: default_max_bands(),
            history_size: default_history_size(),
            top_n_walls: default_top_n_walls(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_config_deserialize() {
        let toml = r#"
            [feed]
            ws_url = "wss://ws.okx.com:8443/ws/v5/public"
            symbols = ["BTC-USDT", "ETH-USDT"]

            [engine]
            bar_interval_secs = 60
            capture_ratio = 0.05
            alert_ratio = 1.5

            [coinalyze]
            api_key = "key"
            poll_interval_secs = 30

            [alert]
            webhook_url = "https://discord.com/api/webhooks/x"
            cooldown_secs = 300

            [storage]
            output_dir = "./data"
            file_rotation_mb = 100

            [telemetry]
            log_level = "info"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.symbols.len(), 2);
        assert_eq!(config.engine.bar_interval_secs, 60);
        assert_eq!(config.engine.alert_ratio, dec!(1.5));
        assert_eq!(config.alert.unwrap().cooldown_secs, 300);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let toml = r#"
            [feed]
            symbols = ["BTC-USDT"]
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.ws_url, "wss://ws.okx.com:8443/ws/v5/public");
        assert_eq!(config.engine.capture_ratio, dec!(0.05));
        assert_eq!(config.engine.alert_ratio, dec!(1.5));
        assert!(config.alert.is_none());
        assert_eq!(config.storage.file_rotation_mb, 100);
        assert_eq!(config.micro.band_width_bps, 10.0);
        assert_eq!(config.micro.void_percentile, 10.0);
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_micro_config_overrides() {
        let toml = r#"
            [feed]
            symbols = ["BTC-USDT"]

            [micro]
            band_width_bps = 5.0
            void_percentile = 20.0
            stack_percentile = 80.0
            max_bands = 10
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.micro.band_width_bps, 5.0);
        assert_eq!(config.micro.max_bands, 10);
        // Unspecified fields keep their defaults
        assert_eq!(config.micro.history_size, 100);
        assert_eq!(config.micro.top_n_walls, 3);
    }

    #[test]
    fn test_config_load_nonexistent() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }
}
