//! Core data structures shared across the bot.
//!
//! Everything price- or amount-shaped is `rust_decimal::Decimal`; the venue
//! sends prices and volumes as JSON strings and binary floats would corrupt
//! the profit math downstream.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::cycles::Cycle;

/// Trading pair metadata from the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub status: String,
    /// Minimum order notional from the exchange filters, when published.
    pub min_notional: Option<Decimal>,
}

impl SymbolInfo {
    pub fn is_trading(&self) -> bool {
        self.status == "TRADING"
    }
}

/// 24-hour rolling ticker statistics for one pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    /// 24h traded value denominated in the quote asset.
    pub quote_volume: Decimal,
    /// Signed 24h price change in percent.
    pub price_change_percent: Decimal,
}

/// Latest top-of-book quote for one pair.
///
/// Serialized with the venue's single-letter keys so the on-disk
/// `latest_prices.json` snapshot matches the wire format and survives warm
/// restarts of older runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookTicker {
    #[serde(rename = "b")]
    pub bid: Decimal,
    #[serde(rename = "a")]
    pub ask: Decimal,
}

impl BookTicker {
    pub fn new(bid: Decimal, ask: Decimal) -> Self {
        Self { bid, ask }
    }
}

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookLevel {
    pub price: Decimal,
    pub qty: Decimal,
}

/// L2 order book snapshot.
///
/// Level ordering is the venue's: bids descending by price, asks ascending.
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    /// Levels for the given trade side: asks are consumed when buying,
    /// bids when selling.
    pub fn levels(&self, side: Side) -> &[BookLevel] {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }
}

/// Direction of a single cycle step against its pair.
///
/// BUY consumes the quote asset and produces the base asset; SELL is the
/// inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Derive the side of a step from the pair it trades against.
    /// Returns `None` when the step's assets do not match the pair.
    pub fn for_step(from_asset: &str, to_asset: &str, pair: &SymbolInfo) -> Option<Side> {
        if from_asset == pair.quote_asset && to_asset == pair.base_asset {
            Some(Side::Buy)
        } else if from_asset == pair.base_asset && to_asset == pair.quote_asset {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A profitable cycle detected by the monitor, handed to the executor.
///
/// `prices` pins the exact top-of-book used for the triggering computation:
/// only the pairs referenced by the cycle's steps appear in it.
#[derive(Debug, Clone)]
pub struct Opportunity {
    pub cycle: Arc<Cycle>,
    pub profit_pct: Decimal,
    pub prices: HashMap<String, BookTicker>,
    pub detected_at: DateTime<Utc>,
}

/// Result of one simulated cycle execution, persisted append-only.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub timestamp: DateTime<Utc>,
    pub cycle: String,
    pub profit_pct: Decimal,
    pub initial_asset: String,
    pub initial_amount: Decimal,
    pub final_asset: String,
    pub final_amount: Decimal,
}
