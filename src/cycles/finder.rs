//! Cycle enumeration over the admissible pair graph.
//!
//! Builds an undirected adjacency map from the exchange's TRADING pairs
//! restricted to the configured universe, walks it depth-first from the base
//! currency, and resolves each surviving coin sequence into concrete pair
//! steps. Results are persisted to `configs/possible_cycles.{json,txt}`.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::binance::BinanceClient;
use crate::config::{self, Config};
use crate::fsio;
use crate::types::SymbolInfo;
use crate::universe::whitelist::WhitelistFile;

use super::profit::{Cycle, Step};

/// Undirected adjacency map between assets. Ordered containers keep the
/// enumeration deterministic across runs.
pub type PairGraph = BTreeMap<String, BTreeSet<String>>;

/// Build the adjacency map from TRADING pairs whose assets are both in the
/// admissible `universe`.
pub fn build_pair_graph(symbols: &[SymbolInfo], universe: &HashSet<String>) -> PairGraph {
    let mut graph = PairGraph::new();
    for info in symbols {
        if !info.is_trading() {
            continue;
        }
        if !universe.contains(&info.base_asset) || !universe.contains(&info.quote_asset) {
            continue;
        }
        graph
            .entry(info.base_asset.clone())
            .or_default()
            .insert(info.quote_asset.clone());
        graph
            .entry(info.quote_asset.clone())
            .or_default()
            .insert(info.base_asset.clone());
    }
    graph
}

/// Enumerate simple cycles rooted at `start`: at least 3 hops, at most
/// `max_hops`, no repeated internal vertices. Reversed traversals are
/// distinct cycles (their execution differs) and are both emitted.
pub fn find_cycles(graph: &PairGraph, start: &str, max_hops: usize) -> Vec<Vec<String>> {
    let mut cycles = Vec::new();
    let mut stack: Vec<(String, Vec<String>)> = vec![(start.to_string(), vec![start.to_string()])];

    while let Some((vertex, path)) = stack.pop() {
        let Some(neighbors) = graph.get(&vertex) else {
            continue;
        };
        for neighbor in neighbors {
            if neighbor == start {
                if path.len() >= 3 {
                    let mut cycle = path.clone();
                    cycle.push(neighbor.clone());
                    cycles.push(cycle);
                }
            } else if !path.contains(neighbor) && path.len() < max_hops {
                let mut next = path.clone();
                next.push(neighbor.clone());
                stack.push((neighbor.clone(), next));
            }
        }
    }

    cycles.sort();
    cycles
}

/// Resolve each coin sequence into concrete steps against the symbol
/// metadata. For the hop `a -> b`, whichever of `ba` / `ab` exists as a
/// TRADING symbol realizes the transition; sequences with an unrealizable
/// hop are dropped. Returns the structured cycles and the union of pair
/// symbols they reference.
pub fn structure_cycles(
    cycle_coins: &[Vec<String>],
    symbols: &HashMap<String, SymbolInfo>,
) -> (Vec<Cycle>, BTreeSet<String>) {
    let mut structured = Vec::new();
    let mut all_pairs = BTreeSet::new();

    'cycles: for coins in cycle_coins {
        let mut steps = Vec::with_capacity(coins.len().saturating_sub(1));
        for window in coins.windows(2) {
            let (from, to) = (&window[0], &window[1]);
            let candidates = [format!("{to}{from}"), format!("{from}{to}")];
            let pair = candidates
                .iter()
                .find(|symbol| symbols.get(*symbol).is_some_and(|s| s.is_trading()));

            match pair {
                Some(symbol) => steps.push(Step {
                    pair: symbol.clone(),
                    from: from.clone(),
                    to: to.clone(),
                }),
                None => {
                    warn!(
                        "dropping cycle {}: no TRADING pair for {} -> {}",
                        coins.join(" -> "),
                        from,
                        to
                    );
                    continue 'cycles;
                }
            }
        }

        for step in &steps {
            all_pairs.insert(step.pair.clone());
        }
        structured.push(Cycle::new(coins.clone(), steps));
    }

    (structured, all_pairs)
}

/// Load previously enumerated cycles from `configs/possible_cycles.json`.
pub fn load_cycles() -> Result<Vec<Vec<String>>> {
    load_cycles_from(config::POSSIBLE_CYCLES_JSON_FILE)
}

pub fn load_cycles_from<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<String>>> {
    let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
        format!("Cannot find possible cycles file at {}", path.as_ref().display())
    })?;
    serde_json::from_str(&content).with_context(|| "Failed to parse possible cycles JSON")
}

/// Orchestrates universe selection, enumeration, and persistence.
pub struct CycleFinder {
    client: BinanceClient,
    config: Config,
}

impl CycleFinder {
    pub fn new(client: BinanceClient, config: Config) -> Self {
        Self { client, config }
    }

    /// The admissible asset universe: whitelist assets when a whitelist file
    /// exists, otherwise the configured monitored coins. The base currency
    /// is always included.
    fn universe(&self) -> HashSet<String> {
        let mut assets: HashSet<String> = match WhitelistFile::load(config::WHITELIST_FILE) {
            Ok(file) => {
                info!(
                    "using whitelist universe: {} assets",
                    file.whitelist_assets.len()
                );
                file.whitelist_assets.into_iter().collect()
            }
            Err(e) => {
                warn!(
                    "no usable whitelist ({e:#}); falling back to monitored coins"
                );
                self.config.monitor.monitored_coins.iter().cloned().collect()
            }
        };
        assets.insert(self.config.trading.base_currency.clone());
        assets
    }

    /// Enumerate cycles and write `possible_cycles.{json,txt}`.
    pub async fn run(&self) -> Result<Vec<Vec<String>>> {
        let symbols = self
            .client
            .exchange_info()
            .await
            .context("fetching exchange info for cycle enumeration")?;

        let universe = self.universe();
        let graph = build_pair_graph(&symbols, &universe);
        let cycles = find_cycles(
            &graph,
            &self.config.trading.base_currency,
            self.config.trading.max_cycle_length,
        );
        info!("found {} potential arbitrage cycles", cycles.len());

        // Structuring validates realizability before anything is persisted;
        // the JSON keeps only coin sequences (steps are re-derived at load).
        let symbol_map: HashMap<String, SymbolInfo> = symbols
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();
        let (structured, _pairs) = structure_cycles(&cycles, &symbol_map);
        let realizable: Vec<Vec<String>> = structured.iter().map(|c| c.coins.clone()).collect();

        fsio::write_json_atomic(config::POSSIBLE_CYCLES_JSON_FILE, &realizable)
            .context("writing possible_cycles.json")?;

        let txt: String = realizable
            .iter()
            .map(|coins| format!("{}\n", coins.join(" -> ")))
            .collect();
        fsio::write_atomic(config::POSSIBLE_CYCLES_TXT_FILE, &txt)
            .context("writing possible_cycles.txt")?;

        info!(
            "saved {} realizable cycles to {}",
            realizable.len(),
            config::POSSIBLE_CYCLES_JSON_FILE
        );
        Ok(realizable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(symbol: &str, base: &str, quote: &str, status: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: quote.to_string(),
            status: status.to_string(),
            min_notional: None,
        }
    }

    fn universe(assets: &[&str]) -> HashSet<String> {
        assets.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_graph_excludes_non_trading_and_foreign_assets() {
        let symbols = vec![
            sym("BTCUSDT", "BTC", "USDT", "TRADING"),
            sym("ETHBTC", "ETH", "BTC", "TRADING"),
            sym("XRPUSDT", "XRP", "USDT", "TRADING"), // XRP outside universe
            sym("LTCUSDT", "LTC", "USDT", "BREAK"),   // not trading
        ];
        let graph = build_pair_graph(&symbols, &universe(&["USDT", "BTC", "ETH", "LTC"]));
        assert!(graph["USDT"].contains("BTC"));
        assert!(graph["BTC"].contains("ETH"));
        assert!(!graph.contains_key("XRP"));
        assert!(!graph.contains_key("LTC"));
    }

    #[test]
    fn test_triangle_enumeration() {
        let symbols = vec![
            sym("BTCUSDT", "BTC", "USDT", "TRADING"),
            sym("ETHBTC", "ETH", "BTC", "TRADING"),
            sym("ETHUSDT", "ETH", "USDT", "TRADING"),
        ];
        let graph = build_pair_graph(&symbols, &universe(&["USDT", "BTC", "ETH"]));
        let cycles = find_cycles(&graph, "USDT", 3);
        // Both traversal directions of the triangle, nothing shorter.
        assert_eq!(
            cycles,
            vec![
                vec!["USDT", "BTC", "ETH", "USDT"],
                vec!["USDT", "ETH", "BTC", "USDT"],
            ]
            .into_iter()
            .map(|c| c.into_iter().map(String::from).collect::<Vec<_>>())
            .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_two_hop_cycles_are_not_emitted() {
        // USDT-BTC and USDT-BNB edges close at 2 hops; ETH has no way back.
        let symbols = vec![
            sym("BTCUSDT", "BTC", "USDT", "TRADING"),
            sym("BNBUSDT", "BNB", "USDT", "TRADING"),
            sym("ETHBTC", "ETH", "BTC", "TRADING"),
        ];
        let graph = build_pair_graph(&symbols, &universe(&["USDT", "BTC", "BNB", "ETH"]));
        assert!(find_cycles(&graph, "USDT", 3).is_empty());
        // Raising the hop budget cannot legalize a revisit of BTC.
        assert!(find_cycles(&graph, "USDT", 4).is_empty());
    }

    #[test]
    fn test_enumeration_is_idempotent() {
        let symbols = vec![
            sym("BTCUSDT", "BTC", "USDT", "TRADING"),
            sym("ETHBTC", "ETH", "BTC", "TRADING"),
            sym("ETHUSDT", "ETH", "USDT", "TRADING"),
            sym("BNBUSDT", "BNB", "USDT", "TRADING"),
            sym("BNBBTC", "BNB", "BTC", "TRADING"),
        ];
        let uni = universe(&["USDT", "BTC", "ETH", "BNB"]);
        let graph = build_pair_graph(&symbols, &uni);
        let first = find_cycles(&graph, "USDT", 4);
        let second = find_cycles(&graph, "USDT", 4);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_structure_resolves_directions() {
        let symbols: HashMap<String, SymbolInfo> = [
            sym("BTCUSDT", "BTC", "USDT", "TRADING"),
            sym("ETHBTC", "ETH", "BTC", "TRADING"),
            sym("ETHUSDT", "ETH", "USDT", "TRADING"),
        ]
        .into_iter()
        .map(|s| (s.symbol.clone(), s))
        .collect();

        let coins = vec![["USDT", "BTC", "ETH", "USDT"].map(String::from).to_vec()];
        let (cycles, pairs) = structure_cycles(&coins, &symbols);

        assert_eq!(cycles.len(), 1);
        let steps = &cycles[0].steps;
        assert_eq!(steps[0], Step { pair: "BTCUSDT".into(), from: "USDT".into(), to: "BTC".into() });
        assert_eq!(steps[1], Step { pair: "ETHBTC".into(), from: "BTC".into(), to: "ETH".into() });
        assert_eq!(steps[2], Step { pair: "ETHUSDT".into(), from: "ETH".into(), to: "USDT".into() });
        assert_eq!(
            pairs,
            ["BTCUSDT", "ETHBTC", "ETHUSDT"].map(String::from).into_iter().collect()
        );

        // Step chaining: each step starts where the previous one ended.
        for window in steps.windows(2) {
            assert_eq!(window[0].to, window[1].from);
        }
    }

    #[test]
    fn test_structure_drops_unrealizable_cycle() {
        let symbols: HashMap<String, SymbolInfo> = [sym("BTCUSDT", "BTC", "USDT", "TRADING")]
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        let coins = vec![["USDT", "BTC", "ETH", "USDT"].map(String::from).to_vec()];
        let (cycles, pairs) = structure_cycles(&coins, &symbols);
        assert!(cycles.is_empty());
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_structure_skips_non_trading_pair() {
        let symbols: HashMap<String, SymbolInfo> = [
            sym("BTCUSDT", "BTC", "USDT", "TRADING"),
            sym("ETHBTC", "ETH", "BTC", "BREAK"),
            sym("ETHUSDT", "ETH", "USDT", "TRADING"),
        ]
        .into_iter()
        .map(|s| (s.symbol.clone(), s))
        .collect();

        let coins = vec![["USDT", "BTC", "ETH", "USDT"].map(String::from).to_vec()];
        let (cycles, _) = structure_cycles(&coins, &symbols);
        assert!(cycles.is_empty());
    }
}
