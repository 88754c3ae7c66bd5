//! Configuration management.
//!
//! Settings come from `configs/config.toml` (every field has a default, so a
//! missing section degrades gracefully); API credentials come from the
//! environment via `.env`. Unknown sections such as `[balance]` are accepted
//! and ignored.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

// --- File locations (relative to the working directory) ---

pub const CONFIG_FILE: &str = "configs/config.toml";
pub const WHITELIST_FILE: &str = "configs/whitelist.json";
pub const BLACKLIST_FILE: &str = "configs/blacklist.json";
pub const POSSIBLE_CYCLES_JSON_FILE: &str = "configs/possible_cycles.json";
pub const POSSIBLE_CYCLES_TXT_FILE: &str = "configs/possible_cycles.txt";
pub const OUTPUT_DIR: &str = "output";
pub const ALL_PROFITS_TXT_FILE: &str = "output/all_profits.txt";
pub const ALL_PROFITS_JSON_FILE: &str = "output/all_profits.json";
pub const LATEST_PRICES_FILE: &str = "output/latest_prices.json";
pub const LOG_DIR: &str = "logs";

/// Pairs per WebSocket connection. Combined-stream URLs embed every topic,
/// so the chunk size is bounded by URL length limits.
pub const STREAM_CHUNK_SIZE: usize = 50;

/// Top-level configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub whitelist: WhitelistConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

/// Core trading parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingConfig {
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    /// Maximum number of hops in an enumerated cycle.
    #[serde(default = "default_max_cycle_length")]
    pub max_cycle_length: usize,
    #[serde(default = "default_initial_investment")]
    pub initial_investment_usd: Decimal,
    /// Fallback taker fee when the exchange publishes none for a pair.
    #[serde(default = "default_trading_fee")]
    pub trading_fee: Decimal,
    /// Opportunities below this percentage are recorded but not executed.
    #[serde(default = "default_min_profit_threshold")]
    pub min_profit_threshold: Decimal,
    /// 24h quote-volume floor applied by the executor's liquidity gate.
    #[serde(default = "default_min_trade_volume")]
    pub min_trade_volume_usd: Decimal,
    /// Per-level slippage cap used when sizing the first leg.
    #[serde(default = "default_max_slippage")]
    pub max_slippage_pct: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistConfig {
    #[serde(default = "default_base_coins")]
    pub base_coins: Vec<String>,
    #[serde(default = "default_whitelist_min_volume")]
    pub min_volume_usd: Decimal,
    #[serde(default = "default_top_n_pairs")]
    pub top_n_pairs: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlacklistConfig {
    #[serde(default = "default_bottom_n_pairs")]
    pub bottom_n_pairs: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Fallback universe when no whitelist file exists.
    #[serde(default = "default_monitored_coins")]
    pub monitored_coins: Vec<String>,
}

fn default_base_currency() -> String {
    "USDT".to_string()
}
fn default_max_cycle_length() -> usize {
    3
}
fn default_initial_investment() -> Decimal {
    Decimal::from(1000)
}
fn default_trading_fee() -> Decimal {
    Decimal::new(1, 3) // 0.001
}
fn default_min_profit_threshold() -> Decimal {
    Decimal::new(1, 1) // 0.1%
}
fn default_min_trade_volume() -> Decimal {
    Decimal::from(1_000_000)
}
fn default_max_slippage() -> Decimal {
    Decimal::new(1, 1) // 0.1%
}
fn default_base_coins() -> Vec<String> {
    ["USDT", "BTC", "ETH", "BNB"].map(String::from).to_vec()
}
fn default_whitelist_min_volume() -> Decimal {
    Decimal::from(100_000)
}
fn default_top_n_pairs() -> usize {
    100
}
fn default_bottom_n_pairs() -> usize {
    100
}
fn default_monitored_coins() -> Vec<String> {
    ["BTC", "ETH", "BNB", "SOL", "XRP", "ADA"].map(String::from).to_vec()
}

impl Default for TradingConfig {
    fn default() -> Self {
        toml::from_str("").expect("all fields defaulted")
    }
}
impl Default for WhitelistConfig {
    fn default() -> Self {
        toml::from_str("").expect("all fields defaulted")
    }
}
impl Default for BlacklistConfig {
    fn default() -> Self {
        toml::from_str("").expect("all fields defaulted")
    }
}
impl Default for MonitorConfig {
    fn default() -> Self {
        toml::from_str("").expect("all fields defaulted")
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        Ok(config)
    }

    /// Load from the default location, falling back to built-in defaults
    /// when the file does not exist. A present-but-broken file is an error.
    pub fn load_default() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            Self::load(CONFIG_FILE)
        } else {
            tracing::warn!("{} not found, using built-in defaults", CONFIG_FILE);
            Ok(Self::default())
        }
    }
}

/// API credentials, read from the environment (`.env` supported).
///
/// Only the signed trade-fee endpoint needs these; public market data flows
/// work without them.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    pub fn from_env() -> Option<Self> {
        dotenv::dotenv().ok();
        let api_key = std::env::var("BINANCE_API_KEY").ok()?;
        let api_secret = std::env::var("BINANCE_API_SECRET").ok()?;
        Some(Self { api_key, api_secret })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.trading.base_currency, "USDT");
        assert_eq!(config.trading.max_cycle_length, 3);
        assert_eq!(config.trading.trading_fee, dec!(0.001));
        assert_eq!(config.whitelist.top_n_pairs, 100);
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[trading]
base_currency = "USDT"
max_cycle_length = 4
initial_investment_usd = "500"
min_profit_threshold = "0.25"
max_slippage_pct = "0.05"

[whitelist]
base_coins = ["USDT", "BTC"]
min_volume_usd = "250000"
top_n_pairs = 40

[blacklist]
bottom_n_pairs = 20

[monitor]
monitored_coins = ["BTC", "ETH"]
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.trading.max_cycle_length, 4);
        assert_eq!(config.trading.initial_investment_usd, dec!(500));
        assert_eq!(config.trading.min_profit_threshold, dec!(0.25));
        assert_eq!(config.whitelist.base_coins, vec!["USDT", "BTC"]);
        assert_eq!(config.blacklist.bottom_n_pairs, 20);
    }

    #[test]
    fn test_unknown_sections_ignored() {
        let toml_str = r#"
[balance]
check_interval_secs = 300
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.trading.base_currency, "USDT");
    }
}
