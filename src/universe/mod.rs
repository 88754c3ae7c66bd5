//! Universe selection: whitelist and blacklist generation.
//!
//! Both generators share the same skeleton — fetch exchange metadata and 24h
//! tickers, filter and rank, persist a sorted JSON document — so the
//! skeleton lives in a trait and each generator implements only its ranking
//! logic.

pub mod blacklist;
pub mod whitelist;

pub use blacklist::BlacklistGenerator;
pub use whitelist::{UniverseStrategy, WhitelistFile, WhitelistGenerator};

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use crate::binance::BinanceClient;
use crate::fsio;
use crate::types::{SymbolInfo, Ticker24h};

/// Sorted output of a generator: the selected pairs and the closure of
/// assets they reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOutput {
    pub assets: BTreeSet<String>,
    pub pairs: BTreeSet<String>,
}

/// A universe list generator (whitelist or blacklist).
#[async_trait]
pub trait ListGenerator: Send + Sync {
    /// Key prefix in the output document ("whitelist" or "blacklist").
    fn kind(&self) -> &'static str;

    /// Path of the JSON document this generator maintains.
    fn output_path(&self) -> &'static str;

    /// Select pairs and assets from the fetched market data.
    async fn generate(
        &self,
        symbols: &[SymbolInfo],
        tickers: &[Ticker24h],
    ) -> Result<ListOutput>;
}

/// Fetch market data, run the generator, and persist its output atomically.
pub async fn run_generator(client: &BinanceClient, generator: &dyn ListGenerator) -> Result<()> {
    info!("generating {}...", generator.kind());

    let symbols = client
        .exchange_info()
        .await
        .context("fetching exchange info")?;
    let tickers = client.ticker_24h().await.context("fetching 24h tickers")?;
    info!("fetched {} symbols and {} tickers", symbols.len(), tickers.len());

    let output = generator.generate(&symbols, &tickers).await?;
    info!(
        "{} generated: {} assets and {} pairs",
        generator.kind(),
        output.assets.len(),
        output.pairs.len()
    );

    let mut doc = serde_json::Map::new();
    doc.insert(
        format!("{}_assets", generator.kind()),
        serde_json::to_value(&output.assets)?,
    );
    doc.insert(
        format!("{}_pairs", generator.kind()),
        serde_json::to_value(&output.pairs)?,
    );
    fsio::write_json_atomic(generator.output_path(), &doc)
        .with_context(|| format!("saving {}", generator.output_path()))?;
    info!("{} saved to {}", generator.kind(), generator.output_path());
    Ok(())
}
