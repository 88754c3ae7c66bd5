//! Triangular Arbitrage Monitor Library
//!
//! Provides components for multi-hop arbitrage detection on Binance spot
//! and dry-run execution against live order books.

pub mod backtest;
pub mod binance;
pub mod config;
pub mod cycles;
pub mod executor;
pub mod fsio;
pub mod monitor;
pub mod types;
pub mod universe;

// Re-export commonly used types
pub use backtest::Backtester;
pub use binance::{BinanceClient, BinanceError, FeeTable};
pub use config::{Config, Credentials};
pub use cycles::{Cycle, CycleFinder, ProfitError, Step};
pub use executor::DryRunExecutor;
pub use monitor::ProfitMonitor;
pub use types::{BookTicker, Opportunity, OrderBook, Side, SymbolInfo, TradeRecord};
pub use universe::{BlacklistGenerator, UniverseStrategy, WhitelistGenerator};
