//! Blacklist generation.
//!
//! The blacklist holds the least liquid corners of the exchange: TRADING
//! pairs outside the whitelist with nonzero volume, ranked ascending by 24h
//! quote volume and truncated to the bottom N. Downstream consumers use it
//! to suppress noise from pairs whose books are too thin to mean anything.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::config::{BlacklistConfig, BLACKLIST_FILE, WHITELIST_FILE};
use crate::types::{SymbolInfo, Ticker24h};

use super::whitelist::WhitelistFile;
use super::{ListGenerator, ListOutput};

pub struct BlacklistGenerator {
    config: BlacklistConfig,
    whitelist_path: &'static str,
}

impl BlacklistGenerator {
    pub fn new(config: BlacklistConfig) -> Self {
        Self { config, whitelist_path: WHITELIST_FILE }
    }

    /// Whitelisted pairs to exclude from consideration. A missing whitelist
    /// is survivable (the blacklist may then contain liquid pairs); a
    /// malformed one is not.
    fn whitelist_pairs(&self) -> Result<HashSet<String>> {
        if !Path::new(self.whitelist_path).exists() {
            warn!(
                "whitelist file not found at {}; blacklist may include liquid pairs",
                self.whitelist_path
            );
            return Ok(HashSet::new());
        }
        let file = WhitelistFile::load(self.whitelist_path)?;
        info!("loaded {} whitelisted pairs", file.whitelist_pairs.len());
        Ok(file.whitelist_pairs.into_iter().collect())
    }
}

#[async_trait]
impl ListGenerator for BlacklistGenerator {
    fn kind(&self) -> &'static str {
        "blacklist"
    }

    fn output_path(&self) -> &'static str {
        BLACKLIST_FILE
    }

    async fn generate(
        &self,
        symbols: &[SymbolInfo],
        tickers: &[Ticker24h],
    ) -> Result<ListOutput> {
        let whitelisted = self.whitelist_pairs()?;
        let ticker_map: HashMap<&str, &Ticker24h> =
            tickers.iter().map(|t| (t.symbol.as_str(), t)).collect();

        let mut candidates: Vec<(&SymbolInfo, Decimal)> = symbols
            .iter()
            .filter(|info| info.is_trading() && !whitelisted.contains(&info.symbol))
            .filter_map(|info| {
                let ticker = ticker_map.get(info.symbol.as_str())?;
                (ticker.quote_volume > Decimal::ZERO).then_some((info, ticker.quote_volume))
            })
            .collect();

        // Thinnest books first; ties broken by symbol for determinism.
        candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.0.symbol.cmp(&b.0.symbol)));
        candidates.truncate(self.config.bottom_n_pairs);

        let mut output = ListOutput::default();
        for (info, _) in candidates {
            output.pairs.insert(info.symbol.clone());
            output.assets.insert(info.base_asset.clone());
            output.assets.insert(info.quote_asset.clone());
        }
        Ok(output)
    }
}
