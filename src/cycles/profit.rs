//! Cycle value type and the fee-aware profit function.
//!
//! `calculate_profit` is a pure function of the cycle, a price view, the
//! symbol metadata, and the fee table. It holds no state of its own, which
//! keeps the streaming evaluator and the backtester byte-identical in their
//! math.

use std::collections::HashMap;
use std::fmt;

use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::binance::FeeTable;
use crate::types::{BookTicker, SymbolInfo};

/// One hop of a cycle: trade `from` into `to` on `pair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub pair: String,
    pub from: String,
    pub to: String,
}

/// An arbitrage cycle: an ordered coin list starting and ending at the base
/// currency, with one resolved step per adjacent transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle {
    pub coins: Vec<String>,
    pub steps: Vec<Step>,
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.coins.join(" -> "))
    }
}

/// Recoverable per-tick failures of the profit computation. The offending
/// cycle is skipped for the tick; nothing else is affected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfitError {
    #[error("no price for pair {0}")]
    MissingPrice(String),
    #[error("no symbol metadata for pair {0}")]
    MissingSymbol(String),
}

/// Read-only view over the latest top-of-book quotes.
///
/// The monitor evaluates against its live concurrent map while tests and the
/// backtester use plain `HashMap` snapshots; the profit function does not
/// care which.
pub trait PriceView {
    fn price(&self, pair: &str) -> Option<BookTicker>;
}

impl PriceView for HashMap<String, BookTicker> {
    fn price(&self, pair: &str) -> Option<BookTicker> {
        self.get(pair).copied()
    }
}

impl PriceView for DashMap<String, BookTicker> {
    fn price(&self, pair: &str) -> Option<BookTicker> {
        self.get(pair).map(|entry| *entry.value())
    }
}

impl Cycle {
    pub fn new(coins: Vec<String>, steps: Vec<Step>) -> Self {
        Self { coins, steps }
    }

    /// Pair symbols referenced by this cycle, in execution order.
    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|s| s.pair.as_str())
    }

    /// True when `prices` has a quote for every step.
    pub fn has_all_prices<P: PriceView>(&self, prices: &P) -> bool {
        self.steps.iter().all(|s| prices.price(&s.pair).is_some())
    }

    /// Per-unit return of the cycle in percent.
    ///
    /// Walks the steps left to right starting from 1 unit of the first
    /// `from` asset. A BUY step (spending the pair's quote asset) divides by
    /// the ask; a SELL step multiplies by the bid; each step pays its taker
    /// fee. A zero ask yields exactly `0` rather than a division error.
    pub fn calculate_profit<P: PriceView>(
        &self,
        prices: &P,
        symbols: &HashMap<String, SymbolInfo>,
        fees: &FeeTable,
        default_fee: Decimal,
    ) -> Result<Decimal, ProfitError> {
        let mut amount = Decimal::ONE;

        for step in &self.steps {
            let info = symbols
                .get(&step.pair)
                .ok_or_else(|| ProfitError::MissingSymbol(step.pair.clone()))?;
            let quote = prices
                .price(&step.pair)
                .ok_or_else(|| ProfitError::MissingPrice(step.pair.clone()))?;
            let fee = fees.get(&step.pair).copied().unwrap_or(default_fee);

            if step.from == info.quote_asset {
                // Buying the base asset at the ask.
                if quote.ask.is_zero() {
                    return Ok(Decimal::ZERO);
                }
                amount /= quote.ask;
            } else {
                // Selling the base asset at the bid.
                amount *= quote.bid;
            }

            amount *= Decimal::ONE - fee;
        }

        Ok((amount - Decimal::ONE) * Decimal::ONE_HUNDRED)
    }
}
