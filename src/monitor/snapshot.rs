//! Periodic profit ranking and price snapshots.
//!
//! Every two seconds the snapshotter writes the full cycle ranking
//! (`output/all_profits.{txt,json}`) and the last-seen top-of-book per pair
//! (`output/latest_prices.json`). All three documents go through atomic
//! rename; a reader never sees a torn file. Write failures are logged and
//! the in-memory state stays authoritative.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config;
use crate::fsio;
use crate::types::BookTicker;

const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(2);

/// Profit a cycle ranks with before any tick has priced it.
const UNKNOWN_PROFIT: Decimal = Decimal::NEGATIVE_ONE;

#[derive(Debug, Serialize)]
struct ProfitsDocument {
    last_updated: String,
    profits: Vec<ProfitEntry>,
}

#[derive(Debug, Serialize)]
struct ProfitEntry {
    cycle: String,
    profit_pct: String,
}

pub struct Snapshotter {
    prices: Arc<DashMap<String, BookTicker>>,
    latest_profits: Arc<DashMap<String, Decimal>>,
    /// Display strings of every monitored cycle, fixed at startup.
    cycle_names: Vec<String>,
}

impl Snapshotter {
    pub fn new(
        prices: Arc<DashMap<String, BookTicker>>,
        latest_profits: Arc<DashMap<String, Decimal>>,
        cycle_names: Vec<String>,
    ) -> Self {
        Self { prices, latest_profits, cycle_names }
    }

    pub async fn run(self) {
        loop {
            tokio::time::sleep(SNAPSHOT_INTERVAL).await;
            self.write_once();
        }
    }

    /// Produce one snapshot of all three documents.
    pub fn write_once(&self) {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let ranking = self.ranking();

        let txt: String = std::iter::once(format!("Last updated: {timestamp}\n\n"))
            .chain(
                ranking
                    .iter()
                    .map(|(cycle, profit)| format!("Cycle: {cycle}, Profit: {profit:.4}%\n")),
            )
            .collect();
        if let Err(e) = fsio::write_atomic(config::ALL_PROFITS_TXT_FILE, &txt) {
            warn!("failed to write {}: {}", config::ALL_PROFITS_TXT_FILE, e);
        }

        let doc = ProfitsDocument {
            last_updated: timestamp,
            profits: ranking
                .into_iter()
                .map(|(cycle, profit)| ProfitEntry {
                    cycle,
                    profit_pct: format!("{profit:.4}"),
                })
                .collect(),
        };
        if let Err(e) = fsio::write_json_atomic(config::ALL_PROFITS_JSON_FILE, &doc) {
            warn!("failed to write {}: {}", config::ALL_PROFITS_JSON_FILE, e);
        }

        // Ordered copy for a stable, diffable document.
        let prices: BTreeMap<String, BookTicker> = self
            .prices
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        if let Err(e) = fsio::write_json_atomic(config::LATEST_PRICES_FILE, &prices) {
            warn!("failed to write {}: {}", config::LATEST_PRICES_FILE, e);
        }

        debug!("snapshot written ({} cycles)", self.cycle_names.len());
    }

    /// Every monitored cycle with its latest profit, best first. Cycles that
    /// have never been computed rank at the bottom with -1.
    fn ranking(&self) -> Vec<(String, Decimal)> {
        let mut ranking: Vec<(String, Decimal)> = self
            .cycle_names
            .iter()
            .map(|name| {
                let profit = self
                    .latest_profits
                    .get(name)
                    .map(|entry| *entry.value())
                    .unwrap_or(UNKNOWN_PROFIT);
                (name.clone(), profit)
            })
            .collect();
        ranking.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranking
    }
}
