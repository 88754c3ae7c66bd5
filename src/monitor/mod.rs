//! Streaming profit evaluator.
//!
//! Subscribes to bookTicker streams for every pair referenced by the
//! enumerated cycles, keeps the latest top-of-book in memory, and recomputes
//! the affected cycles on every tick. Profitable cycles are journaled and
//! pushed into a bounded queue for the dry-run executor.
//!
//! All ticks funnel through one evaluator task, so the price and profit maps
//! have a single writer and every enqueued opportunity carries an internally
//! consistent snapshot.

pub mod snapshot;

pub use snapshot::Snapshotter;

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::binance::{run_book_ticker_stream, BinanceClient, BookTickerEvent, FeeTable};
use crate::config::{self, Config};
use crate::cycles::{finder, Cycle};
use crate::types::{BookTicker, Opportunity, SymbolInfo};

/// Capacity of the opportunity queue. The executor does several REST round
/// trips per opportunity and will lag a busy feed; once the queue is full,
/// newer opportunities are dropped rather than stalling the tick pipeline.
const OPPORTUNITY_QUEUE_CAPACITY: usize = 64;

/// Capacity of the tick channel between listeners and the evaluator.
const TICK_CHANNEL_CAPACITY: usize = 1024;

/// Tick-driven profit evaluation state. Single writer: the evaluator task.
pub struct Evaluator {
    prices: Arc<DashMap<String, BookTicker>>,
    latest_profits: Arc<DashMap<String, Decimal>>,
    pair_to_cycles: HashMap<String, Vec<Arc<Cycle>>>,
    symbols: Arc<HashMap<String, SymbolInfo>>,
    fees: Arc<FeeTable>,
    default_fee: Decimal,
    min_profit_threshold: Decimal,
    profits_dir: PathBuf,
}

impl Evaluator {
    fn new(
        cycles: &[Arc<Cycle>],
        symbols: Arc<HashMap<String, SymbolInfo>>,
        fees: Arc<FeeTable>,
        default_fee: Decimal,
        min_profit_threshold: Decimal,
        profits_dir: PathBuf,
    ) -> Self {
        // Reverse index: pair symbol -> cycles that reference it. Built once;
        // immutable afterwards.
        let mut pair_to_cycles: HashMap<String, Vec<Arc<Cycle>>> = HashMap::new();
        for cycle in cycles {
            for step in &cycle.steps {
                pair_to_cycles
                    .entry(step.pair.clone())
                    .or_default()
                    .push(Arc::clone(cycle));
            }
        }

        Self {
            prices: Arc::new(DashMap::new()),
            latest_profits: Arc::new(DashMap::new()),
            pair_to_cycles,
            symbols,
            fees,
            default_fee,
            min_profit_threshold,
            profits_dir,
        }
    }

    pub fn prices(&self) -> Arc<DashMap<String, BookTicker>> {
        Arc::clone(&self.prices)
    }

    pub fn latest_profits(&self) -> Arc<DashMap<String, Decimal>> {
        Arc::clone(&self.latest_profits)
    }

    /// Seed the price map from a previous run's snapshot, so cycles become
    /// computable before every one of their pairs has ticked.
    pub fn warm_load_prices(&self) {
        let Ok(content) = std::fs::read_to_string(config::LATEST_PRICES_FILE) else {
            return;
        };
        match serde_json::from_str::<HashMap<String, BookTicker>>(&content) {
            Ok(saved) => {
                let count = saved.len();
                for (pair, ticker) in saved {
                    self.prices.insert(pair, ticker);
                }
                info!("warm-loaded {} prices from {}", count, config::LATEST_PRICES_FILE);
            }
            Err(e) => warn!("ignoring unreadable {}: {}", config::LATEST_PRICES_FILE, e),
        }
    }

    /// Process one top-of-book update: refresh the price map and recompute
    /// every cycle that references the pair.
    pub fn handle_tick(&self, event: BookTickerEvent, opportunities: &mpsc::Sender<Opportunity>) {
        self.prices.insert(event.symbol.clone(), event.ticker);

        let Some(cycles) = self.pair_to_cycles.get(&event.symbol) else {
            return;
        };

        for cycle in cycles {
            if !cycle.has_all_prices(self.prices.as_ref()) {
                debug!("skipping cycle {}: not all pairs priced yet", cycle);
                continue;
            }

            let profit = match cycle.calculate_profit(
                self.prices.as_ref(),
                &self.symbols,
                &self.fees,
                self.default_fee,
            ) {
                Ok(profit) => profit,
                Err(e) => {
                    debug!("skipping cycle {}: {}", cycle, e);
                    continue;
                }
            };

            self.latest_profits.insert(cycle.to_string(), profit);

            if profit > self.min_profit_threshold {
                // Pin the exact prices used: only the cycle's own pairs.
                let prices: HashMap<String, BookTicker> = cycle
                    .steps
                    .iter()
                    .filter_map(|s| {
                        self.prices.get(&s.pair).map(|p| (s.pair.clone(), *p.value()))
                    })
                    .collect();

                self.journal_profitable(cycle, profit, &prices);

                let opportunity = Opportunity {
                    cycle: Arc::clone(cycle),
                    profit_pct: profit,
                    prices,
                    detected_at: Utc::now(),
                };
                match opportunities.try_send(opportunity) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!("opportunity queue full; dropping cycle {}", cycle);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!("opportunity queue closed");
                    }
                }
            }
        }
    }

    /// Append a profitable event to the hour-sharded journals
    /// (`output/profits/YYYY-MM-DD/HH.txt` and the JSONL twin).
    fn journal_profitable(
        &self,
        cycle: &Cycle,
        profit: Decimal,
        prices: &HashMap<String, BookTicker>,
    ) {
        let now = Utc::now();
        let timestamp = now.format("%Y-%m-%d %H:%M:%S%.3f").to_string();
        info!("PROFITABLE: {} | {:.4}%", cycle, profit);

        let dir = self.profits_dir.join(now.format("%Y-%m-%d").to_string());
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("cannot create profit journal dir {}: {}", dir.display(), e);
            return;
        }
        let hour = now.format("%H").to_string();

        let txt_entry = format!(
            "[{timestamp}] SUCCESS!\nCycle: {cycle}\nPROFIT: {profit:.4}%\nPrices: {prices:?}\n---\n"
        );
        if let Err(e) = append(&dir.join(format!("{hour}.txt")), &txt_entry) {
            warn!("profit journal write failed: {}", e);
        }

        let json_entry = serde_json::json!({
            "timestamp": timestamp,
            "cycle": cycle.to_string(),
            "profit_pct": format!("{profit:.4}"),
            "prices": prices,
        });
        if let Err(e) = append(&dir.join(format!("{hour}.jsonl")), &format!("{json_entry}\n")) {
            warn!("profit journal write failed: {}", e);
        }
    }
}

fn append(path: &std::path::Path, entry: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(entry.as_bytes())
}

/// The real-time monitor: owns the listeners, the evaluator, and the
/// snapshotter for the lifetime of the process.
pub struct ProfitMonitor {
    client: BinanceClient,
    config: Config,
}

impl ProfitMonitor {
    pub fn new(client: BinanceClient, config: Config) -> Self {
        Self { client, config }
    }

    /// Bounded queue pair for handing opportunities to the executor.
    pub fn opportunity_channel() -> (mpsc::Sender<Opportunity>, mpsc::Receiver<Opportunity>) {
        mpsc::channel(OPPORTUNITY_QUEUE_CAPACITY)
    }

    /// Load cycles and metadata, then run listeners + evaluator + snapshotter
    /// until cancelled. Opportunities flow out through `opportunities`.
    pub async fn run(&self, opportunities: mpsc::Sender<Opportunity>) -> Result<()> {
        let cycle_coins = finder::load_cycles()
            .context("loading possible cycles (run find-cycles first)")?;

        let symbol_list = self
            .client
            .exchange_info()
            .await
            .context("fetching exchange info for monitoring")?;
        let symbols: Arc<HashMap<String, SymbolInfo>> = Arc::new(
            symbol_list
                .into_iter()
                .map(|s| (s.symbol.clone(), s))
                .collect(),
        );

        let (structured, all_pairs) = finder::structure_cycles(&cycle_coins, &symbols);
        if structured.is_empty() {
            bail!("no valid cycles found to monitor");
        }
        let cycles: Vec<Arc<Cycle>> = structured.into_iter().map(Arc::new).collect();

        let fees = Arc::new(self.client.trade_fees().await.unwrap_or_else(|e| {
            warn!("trade fee fetch failed ({e}); using the fallback fee");
            FeeTable::new()
        }));

        info!(
            "monitoring {} cycles involving {} pairs",
            cycles.len(),
            all_pairs.len()
        );

        let evaluator = Evaluator::new(
            &cycles,
            symbols,
            fees,
            self.config.trading.trading_fee,
            self.config.trading.min_profit_threshold,
            PathBuf::from(config::OUTPUT_DIR).join("profits"),
        );
        evaluator.warm_load_prices();

        let snapshotter = Snapshotter::new(
            evaluator.prices(),
            evaluator.latest_profits(),
            cycles.iter().map(|c| c.to_string()).collect(),
        );

        // One connection per chunk of pairs; each pair lives on exactly one
        // connection, so the price map has one writer per key even before
        // the ticks are serialized through the evaluator channel.
        let (tick_tx, mut tick_rx) = mpsc::channel::<BookTickerEvent>(TICK_CHANNEL_CAPACITY);
        let mut tasks = JoinSet::new();
        let pair_list: Vec<String> = all_pairs.into_iter().collect();
        for chunk in pair_list.chunks(config::STREAM_CHUNK_SIZE) {
            let chunk = chunk.to_vec();
            let tx = tick_tx.clone();
            tasks.spawn(async move { run_book_ticker_stream(chunk, tx).await });
        }
        drop(tick_tx);
        tasks.spawn(async move { snapshotter.run().await });

        // Evaluator loop: ends when every listener is gone.
        while let Some(event) = tick_rx.recv().await {
            evaluator.handle_tick(event, &opportunities);
        }

        tasks.shutdown().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::Step;
    use rust_decimal_macros::dec;

    fn symbols() -> Arc<HashMap<String, SymbolInfo>> {
        Arc::new(
            [
                ("BTCUSDT", "BTC", "USDT"),
                ("ETHBTC", "ETH", "BTC"),
                ("ETHUSDT", "ETH", "USDT"),
            ]
            .into_iter()
            .map(|(symbol, base, quote)| {
                (
                    symbol.to_string(),
                    SymbolInfo {
                        symbol: symbol.to_string(),
                        base_asset: base.to_string(),
                        quote_asset: quote.to_string(),
                        status: "TRADING".to_string(),
                        min_notional: None,
                    },
                )
            })
            .collect(),
        )
    }

    fn triangle() -> Arc<Cycle> {
        Arc::new(Cycle::new(
            ["USDT", "BTC", "ETH", "USDT"].map(String::from).to_vec(),
            vec![
                Step { pair: "BTCUSDT".into(), from: "USDT".into(), to: "BTC".into() },
                Step { pair: "ETHBTC".into(), from: "BTC".into(), to: "ETH".into() },
                Step { pair: "ETHUSDT".into(), from: "ETH".into(), to: "USDT".into() },
            ],
        ))
    }

    fn evaluator(threshold: Decimal) -> Evaluator {
        Evaluator::new(
            &[triangle()],
            symbols(),
            Arc::new(FeeTable::new()),
            dec!(0.001),
            threshold,
            std::env::temp_dir().join("triarb_monitor_test_profits"),
        )
    }

    fn tick(symbol: &str, bid: Decimal, ask: Decimal) -> BookTickerEvent {
        BookTickerEvent {
            symbol: symbol.to_string(),
            ticker: BookTicker::new(bid, ask),
        }
    }

    #[tokio::test]
    async fn test_no_profit_entry_until_all_pairs_priced() {
        let eval = evaluator(dec!(0.0));
        let (tx, _rx) = mpsc::channel(8);

        eval.handle_tick(tick("BTCUSDT", dec!(49999), dec!(50000)), &tx);
        assert!(eval.latest_profits.is_empty());

        eval.handle_tick(tick("ETHBTC", dec!(0.0499), dec!(0.05)), &tx);
        assert!(eval.latest_profits.is_empty());

        eval.handle_tick(tick("ETHUSDT", dec!(2550), dec!(2551)), &tx);
        assert_eq!(eval.latest_profits.len(), 1);
    }

    #[tokio::test]
    async fn test_profitable_tick_enqueues_snapshot_of_cycle_pairs_only() {
        let eval = evaluator(dec!(0.0));
        let (tx, mut rx) = mpsc::channel(8);

        // An unrelated pair in the price map must never leak into snapshots.
        eval.prices.insert("BNBUSDT".to_string(), BookTicker::new(dec!(1), dec!(1)));

        eval.handle_tick(tick("BTCUSDT", dec!(49999), dec!(50000)), &tx);
        eval.handle_tick(tick("ETHBTC", dec!(0.0499), dec!(0.05)), &tx);
        eval.handle_tick(tick("ETHUSDT", dec!(2550), dec!(2551)), &tx);

        let opportunity = rx.try_recv().expect("profitable cycle should enqueue");
        assert!(opportunity.profit_pct > Decimal::ZERO);
        assert_eq!(opportunity.prices.len(), 3);
        assert!(opportunity.prices.contains_key("BTCUSDT"));
        assert!(opportunity.prices.contains_key("ETHBTC"));
        assert!(opportunity.prices.contains_key("ETHUSDT"));
        assert!(!opportunity.prices.contains_key("BNBUSDT"));
    }

    #[tokio::test]
    async fn test_unprofitable_tick_records_but_does_not_enqueue() {
        let eval = evaluator(dec!(0.0));
        let (tx, mut rx) = mpsc::channel(8);

        eval.handle_tick(tick("BTCUSDT", dec!(49999), dec!(50000)), &tx);
        eval.handle_tick(tick("ETHBTC", dec!(0.0499), dec!(0.05)), &tx);
        eval.handle_tick(tick("ETHUSDT", dec!(2500), dec!(2501)), &tx);

        let recorded = eval.latest_profits.get("USDT -> BTC -> ETH -> USDT").unwrap();
        assert!(*recorded.value() < Decimal::ZERO);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_final_profit_independent_of_tick_interleaving() {
        let ticks = [
            tick("BTCUSDT", dec!(49999), dec!(50000)),
            tick("ETHBTC", dec!(0.0499), dec!(0.05)),
            tick("ETHUSDT", dec!(2550), dec!(2551)),
        ];

        let mut results = Vec::new();
        // Any arrival order that ends in the same price map must converge
        // to the same profit.
        for order in [[0usize, 1, 2], [2, 1, 0], [1, 2, 0]] {
            let eval = evaluator(dec!(1000)); // high threshold: no queue traffic
            let (tx, _rx) = mpsc::channel(8);
            for i in order {
                eval.handle_tick(ticks[i].clone(), &tx);
            }
            let profit = *eval
                .latest_profits
                .get("USDT -> BTC -> ETH -> USDT")
                .unwrap()
                .value();
            results.push(profit);
        }
        assert_eq!(results[0], results[1]);
        assert_eq!(results[1], results[2]);
    }

    #[tokio::test]
    async fn test_full_queue_drops_instead_of_blocking() {
        let eval = evaluator(dec!(0.0));
        let (tx, mut rx) = mpsc::channel(1);

        eval.handle_tick(tick("BTCUSDT", dec!(49999), dec!(50000)), &tx);
        eval.handle_tick(tick("ETHBTC", dec!(0.0499), dec!(0.05)), &tx);
        // Two profitable recomputations; the second overflows capacity 1.
        eval.handle_tick(tick("ETHUSDT", dec!(2550), dec!(2551)), &tx);
        eval.handle_tick(tick("ETHUSDT", dec!(2552), dec!(2553)), &tx);

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unknown_pair_tick_is_ignored() {
        let eval = evaluator(dec!(0.0));
        let (tx, _rx) = mpsc::channel(8);
        eval.handle_tick(tick("DOGEUSDT", dec!(1), dec!(1)), &tx);
        assert!(eval.latest_profits.is_empty());
    }
}
