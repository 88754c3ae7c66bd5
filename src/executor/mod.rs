//! Dry-run trade executor.
//!
//! Consumes opportunities from the monitor and simulates each cycle against
//! live order books: a 24h-volume liquidity gate, first-leg sizing capped by
//! per-level slippage, then a full depth walk of every leg. No orders are
//! ever placed; outcomes land in the hour-sharded CSV journal.

pub mod journal;

pub use journal::TradeJournal;

use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::binance::BinanceClient;
use crate::config::Config;
use crate::types::{Opportunity, OrderBook, Side, SymbolInfo, TradeRecord};

/// Depth levels requested per book fetch.
const BOOK_DEPTH: u32 = 100;

/// Outcome of walking one leg's book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegFill {
    /// Volume-weighted average fill price.
    pub avg_price: Decimal,
    /// Base quantity filled on a BUY; quote quantity received on a SELL.
    pub amount_out: Decimal,
}

/// Size the first leg from the top of the book: accept levels while their
/// slippage against the best price stays within `max_slippage_pct`, stop at
/// the first level beyond it. Returns the accepted notional — quote units
/// (`price * qty`) for a BUY, base units (`qty`) for a SELL.
pub fn size_first_leg(book: &OrderBook, side: Side, max_slippage_pct: Decimal) -> Decimal {
    let levels = book.levels(side);
    let Some(top) = levels.first() else {
        return Decimal::ZERO;
    };
    if top.price.is_zero() {
        return Decimal::ZERO;
    }

    let mut sized = Decimal::ZERO;
    for level in levels {
        let slippage_pct =
            ((level.price - top.price) / top.price * Decimal::ONE_HUNDRED).abs();
        if slippage_pct > max_slippage_pct {
            break;
        }
        sized += match side {
            Side::Buy => level.price * level.qty,
            Side::Sell => level.qty,
        };
    }
    sized
}

/// Walk the book to fill `amount` (quote units for BUY, base units for
/// SELL). Returns `None` when the book is empty or too shallow to absorb
/// the amount.
pub fn walk_book(book: &OrderBook, side: Side, amount: Decimal) -> Option<LegFill> {
    let levels = book.levels(side);
    if levels.is_empty() || amount <= Decimal::ZERO {
        return None;
    }

    match side {
        Side::Buy => {
            let mut remaining_quote = amount;
            let mut spent = Decimal::ZERO;
            let mut filled = Decimal::ZERO;
            for level in levels {
                if level.price.is_zero() {
                    return None;
                }
                let level_notional = level.price * level.qty;
                if remaining_quote >= level_notional {
                    spent += level_notional;
                    filled += level.qty;
                    remaining_quote -= level_notional;
                } else {
                    filled += remaining_quote / level.price;
                    spent += remaining_quote;
                    remaining_quote = Decimal::ZERO;
                }
                if remaining_quote.is_zero() {
                    break;
                }
            }
            if !remaining_quote.is_zero() || filled.is_zero() {
                return None;
            }
            Some(LegFill { avg_price: spent / filled, amount_out: filled })
        }
        Side::Sell => {
            let mut remaining_base = amount;
            let mut sold = Decimal::ZERO;
            let mut received = Decimal::ZERO;
            for level in levels {
                if remaining_base >= level.qty {
                    received += level.qty * level.price;
                    sold += level.qty;
                    remaining_base -= level.qty;
                } else {
                    received += remaining_base * level.price;
                    sold += remaining_base;
                    remaining_base = Decimal::ZERO;
                }
                if remaining_base.is_zero() {
                    break;
                }
            }
            if !remaining_base.is_zero() || sold.is_zero() {
                return None;
            }
            Some(LegFill { avg_price: received / sold, amount_out: received })
        }
    }
}

/// Simulates cycle execution against live books and journals the results.
pub struct DryRunExecutor {
    client: BinanceClient,
    symbols: HashMap<String, SymbolInfo>,
    initial_investment: Decimal,
    min_volume_threshold: Decimal,
    max_slippage_pct: Decimal,
    journal: TradeJournal,
}

impl DryRunExecutor {
    /// Build the executor; fetches symbol metadata once up front.
    pub async fn new(client: BinanceClient, config: &Config) -> Result<Self> {
        let symbols = client
            .exchange_info()
            .await
            .context("fetching exchange info for the executor")?
            .into_iter()
            .map(|s| (s.symbol.clone(), s))
            .collect();

        Ok(Self {
            client,
            symbols,
            initial_investment: config.trading.initial_investment_usd,
            min_volume_threshold: config.trading.min_trade_volume_usd,
            max_slippage_pct: config.trading.max_slippage_pct,
            journal: TradeJournal::new("output/trades"),
        })
    }

    /// Drain the opportunity queue until the monitor closes it. Per-cycle
    /// failures are logged and never terminate the loop.
    pub async fn run(&self, mut opportunities: mpsc::Receiver<Opportunity>) {
        info!("dry-run executor started");
        while let Some(opportunity) = opportunities.recv().await {
            if let Err(e) = self.execute_cycle(&opportunity).await {
                error!("dry run aborted for cycle {}: {e:#}", opportunity.cycle);
            }
        }
        info!("opportunity queue closed; executor stopping");
    }

    /// Simulate one cycle end to end.
    pub async fn execute_cycle(&self, opportunity: &Opportunity) -> Result<()> {
        let cycle = &opportunity.cycle;

        if !self.passes_liquidity_gate(opportunity).await? {
            return Ok(());
        }

        let first_step = cycle
            .steps
            .first()
            .ok_or_else(|| anyhow!("cycle has no steps"))?;
        let initial_asset = first_step.from.clone();

        // Size the first leg against its current book.
        let first_info = self
            .symbols
            .get(&first_step.pair)
            .ok_or_else(|| anyhow!("unknown pair {}", first_step.pair))?;
        let first_side = Side::for_step(&first_step.from, &first_step.to, first_info)
            .ok_or_else(|| anyhow!("undefined trade direction for step {:?}", first_step))?;
        let first_book = self.client.order_book(&first_step.pair, BOOK_DEPTH).await?;
        let sized_notional = size_first_leg(&first_book, first_side, self.max_slippage_pct);
        if sized_notional.is_zero() {
            bail!("empty first-leg book for {}", first_step.pair);
        }

        let starting_amount = self.initial_investment.min(sized_notional);
        info!("=== DRY RUN: {} | trigger profit {:.4}% ===", cycle, opportunity.profit_pct);
        info!(
            "sized first leg {} to {:.8} (cap {:.8}), starting with {:.8} {}",
            first_step.pair, sized_notional, self.initial_investment, starting_amount, initial_asset
        );

        // Replay every leg against a fresh book.
        let mut current_amount = starting_amount;
        let mut current_asset = initial_asset.clone();

        for (i, step) in cycle.steps.iter().enumerate() {
            if current_asset != step.from {
                bail!(
                    "asset mismatch at step {}: holding {} but step consumes {}",
                    i + 1,
                    current_asset,
                    step.from
                );
            }
            let info = self
                .symbols
                .get(&step.pair)
                .ok_or_else(|| anyhow!("unknown pair {}", step.pair))?;
            let side = Side::for_step(&step.from, &step.to, info)
                .ok_or_else(|| anyhow!("undefined trade direction for step {:?}", step))?;

            let book = self.client.order_book(&step.pair, BOOK_DEPTH).await?;
            let fill = walk_book(&book, side, current_amount)
                .ok_or_else(|| anyhow!("book for {} cannot absorb {:.8}", step.pair, current_amount))?;

            info!(
                "step {}: {} {:.8} {} on {} @ avg {:.8} -> {:.8} {}",
                i + 1,
                side,
                current_amount,
                step.from,
                step.pair,
                fill.avg_price,
                fill.amount_out,
                step.to
            );

            current_amount = fill.amount_out;
            current_asset = step.to.clone();
        }

        info!("expected final balance: {:.8} {}", current_amount, current_asset);

        let record = TradeRecord {
            timestamp: Utc::now(),
            cycle: cycle.to_string(),
            profit_pct: opportunity.profit_pct,
            initial_asset,
            initial_amount: starting_amount,
            final_asset: current_asset,
            final_amount: current_amount,
        };
        let path = self.journal.log(&record).context("appending trade record")?;
        info!("trade journaled to {}", path.display());
        Ok(())
    }

    /// Re-verify 24h liquidity for every pair in the cycle. A pair below
    /// the threshold skips the cycle with a warning (returns `Ok(false)`).
    async fn passes_liquidity_gate(&self, opportunity: &Opportunity) -> Result<bool> {
        let mut seen = std::collections::HashSet::new();
        let pairs: Vec<String> = opportunity
            .cycle
            .pairs()
            .filter(|pair| seen.insert(pair.to_string()))
            .map(str::to_string)
            .collect();

        let tickers = self
            .client
            .tickers_for_symbols(&pairs)
            .await
            .context("liquidity check ticker fetch")?;

        if tickers.len() != pairs.len() {
            warn!(
                "liquidity check: got {} tickers for {} pairs; skipping cycle {}",
                tickers.len(),
                pairs.len(),
                opportunity.cycle
            );
            return Ok(false);
        }

        for ticker in &tickers {
            if ticker.quote_volume < self.min_volume_threshold {
                warn!(
                    "liquidity check: {} volume {:.2} below threshold {:.2}; skipping cycle {}",
                    ticker.symbol, ticker.quote_volume, self.min_volume_threshold, opportunity.cycle
                );
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BookLevel;
    use rust_decimal_macros::dec;

    fn asks(levels: &[(Decimal, Decimal)]) -> OrderBook {
        OrderBook {
            bids: Vec::new(),
            asks: levels
                .iter()
                .map(|&(price, qty)| BookLevel { price, qty })
                .collect(),
        }
    }

    fn bids(levels: &[(Decimal, Decimal)]) -> OrderBook {
        OrderBook {
            bids: levels
                .iter()
                .map(|&(price, qty)| BookLevel { price, qty })
                .collect(),
            asks: Vec::new(),
        }
    }

    #[test]
    fn test_sizing_stops_at_first_level_over_cap() {
        let book = asks(&[
            (dec!(10), dec!(1)),
            (dec!(10.005), dec!(1)),
            (dec!(10.02), dec!(1)),
        ]);
        // Slippages: 0%, 0.05%, 0.2% — the third level is excluded.
        let sized = size_first_leg(&book, Side::Buy, dec!(0.1));
        assert_eq!(sized, dec!(20.005));
    }

    #[test]
    fn test_sizing_sell_sums_quantities() {
        let book = bids(&[
            (dec!(100), dec!(2)),
            (dec!(99.95), dec!(3)),
            (dec!(99), dec!(5)), // 1% away, excluded
        ]);
        let sized = size_first_leg(&book, Side::Sell, dec!(0.1));
        assert_eq!(sized, dec!(5));
    }

    #[test]
    fn test_sizing_empty_book_is_zero() {
        assert_eq!(size_first_leg(&asks(&[]), Side::Buy, dec!(0.1)), Decimal::ZERO);
    }

    #[test]
    fn test_buy_walk_partial_level() {
        let book = asks(&[(dec!(10), dec!(1)), (dec!(20), dec!(1))]);
        // 15 quote: full first level (10), then 5/20 = 0.25 of the second.
        let fill = walk_book(&book, Side::Buy, dec!(15)).unwrap();
        assert_eq!(fill.amount_out, dec!(1.25));
        assert_eq!(fill.avg_price, dec!(12));
    }

    #[test]
    fn test_buy_walk_exact_level_boundary() {
        let book = asks(&[(dec!(10), dec!(1)), (dec!(20), dec!(1))]);
        let fill = walk_book(&book, Side::Buy, dec!(10)).unwrap();
        assert_eq!(fill.amount_out, dec!(1));
        assert_eq!(fill.avg_price, dec!(10));
    }

    #[test]
    fn test_sell_walk_partial_level() {
        let book = bids(&[(dec!(100), dec!(1)), (dec!(90), dec!(2))]);
        // Sell 2 base: 1 @ 100, then 1 @ 90.
        let fill = walk_book(&book, Side::Sell, dec!(2)).unwrap();
        assert_eq!(fill.amount_out, dec!(190));
        assert_eq!(fill.avg_price, dec!(95));
    }

    #[test]
    fn test_walk_empty_book_fails() {
        assert!(walk_book(&asks(&[]), Side::Buy, dec!(10)).is_none());
        assert!(walk_book(&bids(&[]), Side::Sell, dec!(1)).is_none());
    }

    #[test]
    fn test_walk_insufficient_depth_fails() {
        let book = asks(&[(dec!(10), dec!(1))]);
        assert!(walk_book(&book, Side::Buy, dec!(100)).is_none());
        let book = bids(&[(dec!(10), dec!(1))]);
        assert!(walk_book(&book, Side::Sell, dec!(5)).is_none());
    }

    #[test]
    fn test_walk_zero_amount_fails() {
        let book = asks(&[(dec!(10), dec!(1))]);
        assert!(walk_book(&book, Side::Buy, Decimal::ZERO).is_none());
    }
}
