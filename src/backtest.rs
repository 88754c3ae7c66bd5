//! Historical backtest over 1-minute klines.
//!
//! Second consumer of the cycle/profit kernel: replays close prices through
//! `calculate_profit` minute by minute with `bid = ask = close` (klines have
//! no spread) and logs every result above the profit threshold.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::binance::{BinanceClient, FeeTable};
use crate::config::{self, Config};
use crate::cycles::{finder, Cycle};
use crate::types::{BookTicker, SymbolInfo};

const KLINE_INTERVAL: &str = "1m";
const KLINE_PAGE_LIMIT: u32 = 1000;
const MINUTE_MS: i64 = 60_000;

/// One above-threshold result from the replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestHit {
    pub minute_ts: i64,
    pub cycle: String,
    pub profit_pct: Decimal,
}

/// Prices grouped by minute: `minute -> pair -> close-as-top-of-book`.
pub type AlignedPrices = BTreeMap<i64, HashMap<String, BookTicker>>;

/// Replay every minute through the profit kernel in timestamp order.
pub fn simulate(
    cycles: &[Cycle],
    aligned: &AlignedPrices,
    symbols: &HashMap<String, SymbolInfo>,
    fees: &FeeTable,
    default_fee: Decimal,
    min_profit_threshold: Decimal,
) -> Vec<BacktestHit> {
    let mut hits = Vec::new();

    for (&minute_ts, prices) in aligned {
        for cycle in cycles {
            if !cycle.has_all_prices(prices) {
                continue;
            }
            let Ok(profit) = cycle.calculate_profit(prices, symbols, fees, default_fee) else {
                continue;
            };
            if profit > min_profit_threshold {
                hits.push(BacktestHit {
                    minute_ts,
                    cycle: cycle.to_string(),
                    profit_pct: profit,
                });
            }
        }
    }

    hits
}

pub struct Backtester {
    client: BinanceClient,
    config: Config,
}

impl Backtester {
    pub fn new(client: BinanceClient, config: Config) -> Self {
        Self { client, config }
    }

    /// Run the backtest over `[start_date, end_date]` (inclusive days,
    /// `YYYY-MM-DD`). Results go to `logs/backtest_results.log`.
    pub async fn run(&self, start_date: &str, end_date: &str) -> Result<()> {
        let (start_ms, end_ms) = parse_window(start_date, end_date)?;
        info!("--- starting backtest {} .. {} ---", start_date, end_date);

        let cycle_coins = finder::load_cycles()
            .context("loading possible cycles (run find-cycles first)")?;
        let symbols: HashMap<String, SymbolInfo> = self
            .client
            .exchange_info()
            .await
            .context("fetching exchange info for backtest")?
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        let (cycles, all_pairs) = finder::structure_cycles(&cycle_coins, &symbols);
        if cycles.is_empty() {
            bail!("no valid cycles to backtest");
        }

        let fees = self.client.trade_fees().await.unwrap_or_else(|e| {
            warn!("trade fee fetch failed ({e}); using the fallback fee");
            FeeTable::new()
        });

        let mut aligned = AlignedPrices::new();
        for pair in &all_pairs {
            info!("fetching {} klines for {}...", KLINE_INTERVAL, pair);
            let mut cursor = start_ms;
            loop {
                let rows = self
                    .client
                    .klines(pair, KLINE_INTERVAL, cursor, end_ms, KLINE_PAGE_LIMIT)
                    .await
                    .with_context(|| format!("fetching klines for {pair}"))?;
                let Some(&(last_open, _)) = rows.last() else {
                    break;
                };
                for (open_time, close) in &rows {
                    aligned
                        .entry(open_time / MINUTE_MS)
                        .or_default()
                        .insert(pair.clone(), BookTicker::new(*close, *close));
                }
                if rows.len() < KLINE_PAGE_LIMIT as usize {
                    break;
                }
                cursor = last_open + MINUTE_MS;
            }
        }
        info!("aligned price data for {} minutes", aligned.len());

        let hits = simulate(
            &cycles,
            &aligned,
            &symbols,
            &fees,
            self.config.trading.trading_fee,
            self.config.trading.min_profit_threshold,
        );

        self.write_results(start_date, end_date, &hits)?;
        info!(
            "simulation finished: {} profitable opportunities; results in {}/backtest_results.log",
            hits.len(),
            config::LOG_DIR
        );
        Ok(())
    }

    fn write_results(&self, start_date: &str, end_date: &str, hits: &[BacktestHit]) -> Result<()> {
        std::fs::create_dir_all(config::LOG_DIR).context("creating log directory")?;
        let path = Path::new(config::LOG_DIR).join("backtest_results.log");
        let mut file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;

        writeln!(file, "Backtest from {start_date} to {end_date}\n---")?;
        for hit in hits {
            let when: DateTime<Utc> = DateTime::from_timestamp(hit.minute_ts * 60, 0)
                .unwrap_or_default();
            writeln!(
                file,
                "[{}] SUCCESS!\nCycle: {}\nPROFIT: {:.4}%\n---",
                when.format("%Y-%m-%d %H:%M:%S"),
                hit.cycle,
                hit.profit_pct
            )?;
        }
        Ok(())
    }
}

/// Parse the date window into millisecond bounds; the end date is inclusive.
fn parse_window(start_date: &str, end_date: &str) -> Result<(i64, i64)> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d")
        .with_context(|| format!("invalid start date '{start_date}', expected YYYY-MM-DD"))?;
    let end = NaiveDate::parse_from_str(end_date, "%Y-%m-%d")
        .with_context(|| format!("invalid end date '{end_date}', expected YYYY-MM-DD"))?;
    if end < start {
        bail!("end date {end_date} is before start date {start_date}");
    }

    let start_ms = start
        .and_hms_opt(0, 0, 0)
        .expect("midnight always exists")
        .and_utc()
        .timestamp_millis();
    let end_ms = end
        .and_hms_opt(23, 59, 59)
        .expect("valid time")
        .and_utc()
        .timestamp_millis();
    Ok((start_ms, end_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycles::Step;
    use rust_decimal_macros::dec;

    fn symbols() -> HashMap<String, SymbolInfo> {
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
        .collect()
    }

    fn triangle() -> Cycle {
        Cycle::new(
            ["USDT", "BTC", "ETH", "USDT"].map(String::from).to_vec(),
            vec![
                Step { pair: "BTCUSDT".into(), from: "USDT".into(), to: "BTC".into() },
                Step { pair: "ETHBTC".into(), from: "BTC".into(), to: "ETH".into() },
                Step { pair: "ETHUSDT".into(), from: "ETH".into(), to: "USDT".into() },
            ],
        )
    }

    fn minute(prices: &[(&str, Decimal)]) -> HashMap<String, BookTicker> {
        prices
            .iter()
            .map(|&(pair, close)| (pair.to_string(), BookTicker::new(close, close)))
            .collect()
    }

    #[test]
    fn test_simulation_finds_profitable_minute() {
        let mut aligned = AlignedPrices::new();
        // Minute 0: spread wide enough to clear three 0.1% fees.
        aligned.insert(
            0,
            minute(&[
                ("BTCUSDT", dec!(50000)),
                ("ETHBTC", dec!(0.05)),
                ("ETHUSDT", dec!(2550)),
            ]),
        );
        // Minute 1: priced exactly at parity, fees make it a loss.
        aligned.insert(
            1,
            minute(&[
                ("BTCUSDT", dec!(50000)),
                ("ETHBTC", dec!(0.05)),
                ("ETHUSDT", dec!(2500)),
            ]),
        );

        let hits = simulate(
            &[triangle()],
            &aligned,
            &symbols(),
            &FeeTable::new(),
            dec!(0.001),
            dec!(0.0),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].minute_ts, 0);
        assert!(hits[0].profit_pct > Decimal::ZERO);
    }

    #[test]
    fn test_simulation_skips_minutes_with_missing_pairs() {
        let mut aligned = AlignedPrices::new();
        aligned.insert(0, minute(&[("BTCUSDT", dec!(50000))]));

        let hits = simulate(
            &[triangle()],
            &aligned,
            &symbols(),
            &FeeTable::new(),
            dec!(0.001),
            dec!(0.0),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_parse_window_validates_format_and_order() {
        assert!(parse_window("2026-01-01", "2026-01-02").is_ok());
        assert!(parse_window("01/01/2026", "2026-01-02").is_err());
        assert!(parse_window("2026-01-02", "2026-01-01").is_err());
    }
}
