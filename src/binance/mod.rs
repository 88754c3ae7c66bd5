//! Binance exchange adapter.
//!
//! Read-only client over the venue's REST and WebSocket surfaces. All REST
//! calls go through the retry combinator; stream subscriptions reconnect
//! on their own.

pub mod client;
pub mod retry;
pub mod stream;

pub use client::{BinanceClient, BinanceError, FeeTable};
pub use retry::RetryPolicy;
pub use stream::{run_book_ticker_stream, BookTickerEvent};
