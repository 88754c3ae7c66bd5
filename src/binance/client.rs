//! Binance REST client.
//!
//! Thin, retried, read-only interface over the venue's market-data endpoints
//! plus the one signed endpoint the bot needs (account trade fees). The
//! secret key is used exclusively for HMAC signing and never logged.

use std::collections::HashMap;
use std::sync::Arc;

use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::types::{BookLevel, OrderBook, SymbolInfo, Ticker24h};

use super::retry::{retry, RetryPolicy};

type HmacSha256 = Hmac<Sha256>;

/// Taker fee per pair symbol.
pub type FeeTable = HashMap<String, Decimal>;

const BASE_URL: &str = "https://api.binance.com";

/// Venue error code for an unknown trading symbol.
const CODE_INVALID_SYMBOL: i64 = -1121;

/// Typed failure modes of the exchange adapter.
#[derive(Debug, thiserror::Error)]
pub enum BinanceError {
    /// Socket-level failure (reset, DNS, timeout). Retryable.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Venue-side 5xx. Retryable.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    /// Venue rejected the request (4xx with an error payload). Not retryable.
    #[error("api error {code}: {msg}")]
    Api { code: i64, msg: String },

    /// Request referenced a symbol the venue does not know.
    #[error("invalid symbol: {0}")]
    InvalidSymbol(String),

    /// Authentication failure (bad key, bad signature, missing credentials).
    #[error("auth error: {0}")]
    Auth(String),

    /// Response did not match the documented shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl BinanceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BinanceError::Transport(_) | BinanceError::Server { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: i64,
    msg: String,
}

// ---------------------------------------------------------------------------
// Wire payload shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawExchangeInfo {
    symbols: Vec<RawSymbol>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSymbol {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    status: String,
    #[serde(default)]
    filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    filter_type: String,
    #[serde(default)]
    min_notional: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker {
    symbol: String,
    quote_volume: Decimal,
    price_change_percent: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawDepth {
    bids: Vec<(Decimal, Decimal)>,
    asks: Vec<(Decimal, Decimal)>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTradeFee {
    symbol: String,
    taker_commission: Decimal,
}

impl From<RawSymbol> for SymbolInfo {
    fn from(raw: RawSymbol) -> Self {
        let min_notional = raw
            .filters
            .iter()
            .find(|f| f.filter_type == "MIN_NOTIONAL" || f.filter_type == "NOTIONAL")
            .and_then(|f| f.min_notional);
        SymbolInfo {
            symbol: raw.symbol,
            base_asset: raw.base_asset,
            quote_asset: raw.quote_asset,
            status: raw.status,
            min_notional,
        }
    }
}

impl From<RawTicker> for Ticker24h {
    fn from(raw: RawTicker) -> Self {
        Ticker24h {
            symbol: raw.symbol,
            quote_volume: raw.quote_volume,
            price_change_percent: raw.price_change_percent,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Retried Binance REST client. Cheap to clone; the fee cache is shared.
#[derive(Clone)]
pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
    policy: RetryPolicy,
    /// Taker fees, populated on first use and cached for the process
    /// lifetime. `None` until the bulk fetch has run.
    fees: Arc<Mutex<Option<FeeTable>>>,
}

impl BinanceClient {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self::with_base_url(BASE_URL, credentials)
    }

    pub fn with_base_url(base_url: impl Into<String>, credentials: Option<Credentials>) -> Self {
        let mut default_headers = HeaderMap::new();
        if let Some(creds) = &credentials {
            if let Ok(val) = HeaderValue::from_str(&creds.api_key) {
                default_headers.insert("X-MBX-APIKEY", val);
            }
        }

        let http = reqwest::Client::builder()
            .default_headers(default_headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            http,
            base_url: base_url.into(),
            credentials,
            policy: RetryPolicy::default(),
            fees: Arc::new(Mutex::new(None)),
        }
    }

    // -----------------------------------------------------------------------
    // Signing helpers
    // -----------------------------------------------------------------------

    fn sign(&self, secret: &str, query: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before UNIX epoch")
            .as_millis() as u64
    }

    fn signed_query(&self, params: &str) -> Result<String, BinanceError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| BinanceError::Auth("no API credentials configured".into()))?;
        let ts = Self::timestamp_ms();
        let base = if params.is_empty() {
            format!("timestamp={ts}&recvWindow=5000")
        } else {
            format!("{params}&timestamp={ts}&recvWindow=5000")
        };
        let sig = self.sign(&creds.api_secret, &base);
        Ok(format!("{base}&signature={sig}"))
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Issue one GET and map the response into the error taxonomy.
    async fn get_once<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &str,
    ) -> Result<T, BinanceError> {
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if status.is_server_error() {
            return Err(BinanceError::Server { status: status.as_u16(), body });
        }
        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiErrorBody>(&body) {
                if err.code == CODE_INVALID_SYMBOL {
                    return Err(BinanceError::InvalidSymbol(err.msg));
                }
                if status.as_u16() == 401 || status.as_u16() == 403 {
                    return Err(BinanceError::Auth(err.msg));
                }
                return Err(BinanceError::Api { code: err.code, msg: err.msg });
            }
            return Err(BinanceError::Api { code: status.as_u16() as i64, msg: body });
        }

        serde_json::from_str(&body)
            .map_err(|e| BinanceError::Protocol(format!("{path}: {e}")))
    }

    async fn get_retried<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: String,
    ) -> Result<T, BinanceError> {
        retry(&self.policy, path, || self.get_once(path, &query)).await
    }

    // -----------------------------------------------------------------------
    // Market data
    // -----------------------------------------------------------------------

    /// GET /api/v3/exchangeInfo — symbol metadata with filters.
    pub async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, BinanceError> {
        let raw: RawExchangeInfo = self
            .get_retried("/api/v3/exchangeInfo", String::new())
            .await?;
        debug!("exchange info: {} symbols", raw.symbols.len());
        Ok(raw.symbols.into_iter().map(SymbolInfo::from).collect())
    }

    /// GET /api/v3/ticker/24hr — rolling statistics for every pair.
    pub async fn ticker_24h(&self) -> Result<Vec<Ticker24h>, BinanceError> {
        let raw: Vec<RawTicker> = self
            .get_retried("/api/v3/ticker/24hr", String::new())
            .await?;
        Ok(raw.into_iter().map(Ticker24h::from).collect())
    }

    /// GET /api/v3/ticker/24hr?symbols=[...] — statistics for a subset.
    pub async fn tickers_for_symbols(
        &self,
        symbols: &[String],
    ) -> Result<Vec<Ticker24h>, BinanceError> {
        let list = serde_json::to_string(symbols)
            .map_err(|e| BinanceError::Protocol(e.to_string()))?;
        // The venue wants the JSON array URL-encoded into a single parameter.
        let query = format!(
            "symbols={}",
            list.replace('"', "%22").replace('[', "%5B").replace(']', "%5D")
        );
        let raw: Vec<RawTicker> = self.get_retried("/api/v3/ticker/24hr", query).await?;
        Ok(raw.into_iter().map(Ticker24h::from).collect())
    }

    /// GET /api/v3/depth — L2 order book, up to `limit` levels per side.
    pub async fn order_book(&self, symbol: &str, limit: u32) -> Result<OrderBook, BinanceError> {
        let query = format!("symbol={symbol}&limit={limit}");
        let raw: RawDepth = self.get_retried("/api/v3/depth", query).await?;
        Ok(OrderBook {
            bids: raw
                .bids
                .into_iter()
                .map(|(price, qty)| BookLevel { price, qty })
                .collect(),
            asks: raw
                .asks
                .into_iter()
                .map(|(price, qty)| BookLevel { price, qty })
                .collect(),
        })
    }

    /// GET /api/v3/klines — `(open_time_ms, close_price)` per interval.
    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
        limit: u32,
    ) -> Result<Vec<(i64, Decimal)>, BinanceError> {
        let query = format!(
            "symbol={symbol}&interval={interval}&startTime={start_ms}&endTime={end_ms}&limit={limit}"
        );
        let rows: Vec<Vec<serde_json::Value>> = self.get_retried("/api/v3/klines", query).await?;

        rows.into_iter()
            .map(|row| {
                let open_time = row
                    .first()
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| BinanceError::Protocol("kline missing open time".into()))?;
                let close = row
                    .get(4)
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| BinanceError::Protocol("kline missing close price".into()))?
                    .parse::<Decimal>()
                    .map_err(|e| BinanceError::Protocol(format!("bad kline close: {e}")))?;
                Ok((open_time, close))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // Trade fees (signed)
    // -----------------------------------------------------------------------

    /// Taker fees for all pairs, fetched once and cached.
    ///
    /// Without credentials the table is empty and callers fall back to the
    /// configured default fee; monitoring should not require an account.
    pub async fn trade_fees(&self) -> Result<FeeTable, BinanceError> {
        let mut cache = self.fees.lock().await;
        if let Some(table) = cache.as_ref() {
            return Ok(table.clone());
        }

        if self.credentials.is_none() {
            warn!("no API credentials; using the configured fallback fee for every pair");
            let empty = FeeTable::new();
            *cache = Some(empty.clone());
            return Ok(empty);
        }

        let query = self.signed_query("")?;
        let raw: Vec<RawTradeFee> = self.get_retried("/sapi/v1/asset/tradeFee", query).await?;
        let table: FeeTable = raw
            .into_iter()
            .map(|f| (f.symbol, f.taker_commission))
            .collect();
        info!("trade fees loaded for {} pairs", table.len());
        *cache = Some(table.clone());
        Ok(table)
    }

    /// Taker fee for one pair; falls through to a per-symbol signed fetch
    /// when the bulk table has no entry.
    pub async fn trade_fee(&self, symbol: &str) -> Result<Option<Decimal>, BinanceError> {
        if let Some(fee) = self.trade_fees().await?.get(symbol) {
            return Ok(Some(*fee));
        }
        if self.credentials.is_none() {
            return Ok(None);
        }

        let query = self.signed_query(&format!("symbol={symbol}"))?;
        let raw: Vec<RawTradeFee> = self.get_retried("/sapi/v1/asset/tradeFee", query).await?;
        let fee = raw.first().map(|f| f.taker_commission);
        if let Some(fee) = fee {
            let mut cache = self.fees.lock().await;
            if let Some(table) = cache.as_mut() {
                table.insert(symbol.to_string(), fee);
            }
        }
        Ok(fee)
    }
}
