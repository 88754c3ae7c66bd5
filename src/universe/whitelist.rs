//! Whitelist generation.
//!
//! Selects the trading universe: TRADING pairs anchored in the configured
//! base coins, ranked either by 24h quote volume (liquidity strategy) or by
//! absolute 24h price change (volatility strategy), truncated to the top N.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::{WhitelistConfig, WHITELIST_FILE};
use crate::types::{SymbolInfo, Ticker24h};

use super::{ListGenerator, ListOutput};

/// Ranking strategy for whitelist candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UniverseStrategy {
    /// Top N by 24h quote volume.
    #[default]
    Liquidity,
    /// Top N by |24h price change percent|.
    Volatility,
}

/// On-disk shape of `configs/whitelist.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WhitelistFile {
    #[serde(default)]
    pub whitelist_assets: Vec<String>,
    #[serde(default)]
    pub whitelist_pairs: Vec<String>,
}

impl WhitelistFile {
    /// Load and parse the whitelist document. A missing file and a
    /// malformed file are both errors; callers decide which is fatal.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("whitelist file not found: {}", path.as_ref().display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse whitelist JSON: {}", path.as_ref().display()))
    }
}

pub struct WhitelistGenerator {
    config: WhitelistConfig,
    strategy: UniverseStrategy,
}

struct Candidate {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    quote_volume: Decimal,
    abs_change_pct: Decimal,
}

impl WhitelistGenerator {
    pub fn new(config: WhitelistConfig, strategy: UniverseStrategy) -> Self {
        Self { config, strategy }
    }

    /// A pair qualifies when it is TRADING, anchored in a base coin, and its
    /// 24h quote volume clears both the configured floor and the pair's own
    /// minimum notional.
    fn is_valid_pair(&self, info: &SymbolInfo, ticker: &Ticker24h) -> bool {
        if !info.is_trading() {
            return false;
        }
        if !self.config.base_coins.contains(&info.base_asset)
            && !self.config.base_coins.contains(&info.quote_asset)
        {
            return false;
        }
        if ticker.quote_volume < self.config.min_volume_usd {
            return false;
        }
        if let Some(min_notional) = info.min_notional {
            if min_notional > Decimal::ZERO && ticker.quote_volume < min_notional {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl ListGenerator for WhitelistGenerator {
    fn kind(&self) -> &'static str {
        "whitelist"
    }

    fn output_path(&self) -> &'static str {
        WHITELIST_FILE
    }

    async fn generate(
        &self,
        symbols: &[SymbolInfo],
        tickers: &[Ticker24h],
    ) -> Result<ListOutput> {
        if self.config.base_coins.is_empty() {
            bail!("whitelist base coins are not configured");
        }

        let ticker_map: HashMap<&str, &Ticker24h> =
            tickers.iter().map(|t| (t.symbol.as_str(), t)).collect();

        let mut candidates: Vec<Candidate> = symbols
            .iter()
            .filter_map(|info| {
                let ticker = ticker_map.get(info.symbol.as_str())?;
                self.is_valid_pair(info, ticker).then(|| Candidate {
                    symbol: info.symbol.clone(),
                    base_asset: info.base_asset.clone(),
                    quote_asset: info.quote_asset.clone(),
                    quote_volume: ticker.quote_volume,
                    abs_change_pct: ticker.price_change_percent.abs(),
                })
            })
            .collect();

        // Rank descending by the strategy metric, ties broken by symbol so
        // the same ticker input always yields the same list.
        match self.strategy {
            UniverseStrategy::Liquidity => candidates
                .sort_by(|a, b| b.quote_volume.cmp(&a.quote_volume).then(a.symbol.cmp(&b.symbol))),
            UniverseStrategy::Volatility => candidates.sort_by(|a, b| {
                b.abs_change_pct
                    .cmp(&a.abs_change_pct)
                    .then(a.symbol.cmp(&b.symbol))
            }),
        }
        candidates.truncate(self.config.top_n_pairs);

        let mut output = ListOutput::default();
        output.assets.extend(self.config.base_coins.iter().cloned());
        for candidate in candidates {
            output.pairs.insert(candidate.symbol);
            output.assets.insert(candidate.base_asset);
            output.assets.insert(candidate.quote_asset);
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sym(symbol: &str, base: &str, quote: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            status: "TRADING".to_string(),
            min_notional: None,
        }
    }

    fn ticker(symbol: &str, volume: Decimal, change: Decimal) -> Ticker24h {
        Ticker24h {
            symbol: symbol.to_string(),
            quote_volume: volume,
            price_change_percent: change,
        }
    }

    fn config(top_n: usize) -> WhitelistConfig {
        WhitelistConfig {
            base_coins: vec!["USDT".to_string()],
            min_volume_usd: dec!(100000),
            top_n_pairs: top_n,
        }
    }

    #[tokio::test]
    async fn test_top_n_by_volume_is_deterministic() {
        let generator = WhitelistGenerator::new(config(2), UniverseStrategy::Liquidity);
        let symbols = vec![
            sym("AUSDT", "A", "USDT"),
            sym("BUSDT", "B", "USDT"),
            sym("CUSDT", "C", "USDT"),
        ];
        let tickers = vec![
            ticker("AUSDT", dec!(100000), dec!(1)),
            ticker("BUSDT", dec!(500000), dec!(1)),
            ticker("CUSDT", dec!(250000), dec!(1)),
        ];
        let output = generator.generate(&symbols, &tickers).await.unwrap();
        assert_eq!(
            output.pairs.iter().cloned().collect::<Vec<_>>(),
            vec!["BUSDT", "CUSDT"]
        );
        assert!(output.assets.contains("B"));
        assert!(output.assets.contains("C"));
        assert!(output.assets.contains("USDT"));
        assert!(!output.assets.contains("A"));
    }

    #[tokio::test]
    async fn test_volume_floor_excludes_pair() {
        let generator = WhitelistGenerator::new(config(10), UniverseStrategy::Liquidity);
        let symbols = vec![sym("AUSDT", "A", "USDT")];
        let tickers = vec![ticker("AUSDT", dec!(99999), dec!(1))];
        let output = generator.generate(&symbols, &tickers).await.unwrap();
        assert!(output.pairs.is_empty());
    }

    #[tokio::test]
    async fn test_min_notional_above_volume_excludes_pair() {
        let generator = WhitelistGenerator::new(config(10), UniverseStrategy::Liquidity);
        let mut info = sym("AUSDT", "A", "USDT");
        info.min_notional = Some(dec!(200000));
        let tickers = vec![ticker("AUSDT", dec!(150000), dec!(1))];
        let output = generator.generate(&[info], &tickers).await.unwrap();
        assert!(output.pairs.is_empty());
    }

    #[tokio::test]
    async fn test_unanchored_pair_excluded() {
        let generator = WhitelistGenerator::new(config(10), UniverseStrategy::Liquidity);
        let symbols = vec![sym("ETHBTC", "ETH", "BTC")];
        let tickers = vec![ticker("ETHBTC", dec!(900000), dec!(1))];
        let output = generator.generate(&symbols, &tickers).await.unwrap();
        assert!(output.pairs.is_empty());
    }

    #[tokio::test]
    async fn test_volatility_strategy_ranks_by_abs_change() {
        let generator = WhitelistGenerator::new(config(1), UniverseStrategy::Volatility);
        let symbols = vec![sym("AUSDT", "A", "USDT"), sym("BUSDT", "B", "USDT")];
        let tickers = vec![
            ticker("AUSDT", dec!(200000), dec!(3.0)),
            ticker("BUSDT", dec!(200000), dec!(-8.5)),
        ];
        let output = generator.generate(&symbols, &tickers).await.unwrap();
        assert_eq!(output.pairs.iter().cloned().collect::<Vec<_>>(), vec!["BUSDT"]);
    }

    #[tokio::test]
    async fn test_empty_base_coins_aborts() {
        let generator = WhitelistGenerator::new(
            WhitelistConfig {
                base_coins: Vec::new(),
                min_volume_usd: dec!(0),
                top_n_pairs: 10,
            },
            UniverseStrategy::Liquidity,
        );
        assert!(generator.generate(&[], &[]).await.is_err());
    }
}
