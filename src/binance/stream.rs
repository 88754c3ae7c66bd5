//! Combined bookTicker WebSocket streams.
//!
//! One connection carries every `@bookTicker` topic of its chunk. The
//! connection lifecycle is an explicit state machine so that a task that is
//! being torn down can never keep publishing into the price map: events only
//! flow while the state is `Subscribed`, and a closed receiver moves the
//! machine straight to `Stopped`.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::types::BookTicker;

const STREAM_BASE_URL: &str = "wss://stream.binance.com:9443/stream";

/// Idle cap: the venue pings every few minutes; a minute of silence means
/// the connection is dead.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

const RECONNECT_INITIAL: Duration = Duration::from_secs(5);
const RECONNECT_MAX: Duration = Duration::from_secs(60);

/// One top-of-book update from the stream.
#[derive(Debug, Clone)]
pub struct BookTickerEvent {
    pub symbol: String,
    pub ticker: BookTicker,
}

/// Connection lifecycle of one chunk's listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connecting,
    Subscribed,
    Reconnecting,
    Stopped,
}

#[derive(Debug, Deserialize)]
struct CombinedFrame {
    data: RawBookTicker,
}

#[derive(Debug, Deserialize)]
struct RawBookTicker {
    s: String,
    b: Decimal,
    a: Decimal,
}

/// Build the combined-stream URL for a chunk of pair symbols.
fn stream_url(chunk: &[String]) -> String {
    let topics: Vec<String> = chunk
        .iter()
        .map(|pair| format!("{}@bookTicker", pair.to_lowercase()))
        .collect();
    format!("{}?streams={}", STREAM_BASE_URL, topics.join("/"))
}

/// Parse one text frame into an event. Non-bookTicker frames (subscription
/// acks and the like) yield `None`; malformed bookTicker frames are a
/// protocol error and are surfaced.
fn parse_frame(text: &str) -> Result<Option<BookTickerEvent>, serde_json::Error> {
    if !text.contains("\"data\"") {
        return Ok(None);
    }
    let frame: CombinedFrame = serde_json::from_str(text)?;
    Ok(Some(BookTickerEvent {
        symbol: frame.data.s,
        ticker: BookTicker::new(frame.data.b, frame.data.a),
    }))
}

/// Listen on one chunk forever, forwarding events to `tx`.
///
/// Reconnects with exponential backoff (5 s doubling to 60 s, reset after a
/// successful subscription) and re-subscribes the same chunk each time.
/// Returns when the receiving side of `tx` is dropped.
pub async fn run_book_ticker_stream(chunk: Vec<String>, tx: mpsc::Sender<BookTickerEvent>) {
    let url = stream_url(&chunk);
    let mut state = ConnState::Connecting;
    let mut backoff = RECONNECT_INITIAL;
    let mut conn = None;

    loop {
        match state {
            ConnState::Connecting => match connect_async(&url).await {
                Ok((ws, _resp)) => {
                    info!("connected to stream for {} pairs", chunk.len());
                    backoff = RECONNECT_INITIAL;
                    conn = Some(ws);
                    state = ConnState::Subscribed;
                }
                Err(e) => {
                    warn!("stream connect failed: {}", e);
                    state = ConnState::Reconnecting;
                }
            },
            ConnState::Subscribed => match conn.take() {
                Some(ws) => state = listen(ws, &tx).await,
                None => state = ConnState::Reconnecting,
            },
            ConnState::Reconnecting => {
                debug!("reconnecting in {:?}", backoff);
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RECONNECT_MAX);
                state = ConnState::Connecting;
            }
            ConnState::Stopped => {
                info!("stream listener stopped ({} pairs)", chunk.len());
                return;
            }
        }
    }
}

/// Drive one live connection until it drops. Returns the next state.
async fn listen<S>(
    ws: tokio_tungstenite::WebSocketStream<S>,
    tx: &mpsc::Sender<BookTickerEvent>,
) -> ConnState
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut write, mut read) = ws.split();

    loop {
        let msg = match tokio::time::timeout(IDLE_TIMEOUT, read.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                warn!("stream read error: {}", e);
                return ConnState::Reconnecting;
            }
            Ok(None) => {
                warn!("stream closed by venue");
                return ConnState::Reconnecting;
            }
            Err(_) => {
                warn!("stream idle for {:?}, dropping connection", IDLE_TIMEOUT);
                return ConnState::Reconnecting;
            }
        };

        match msg {
            Message::Text(text) => match parse_frame(&text) {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        // Evaluator is gone; stop cleanly instead of
                        // reconnecting into the void.
                        return ConnState::Stopped;
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    error!("malformed bookTicker frame: {} ({})", e, text);
                    return ConnState::Reconnecting;
                }
            },
            Message::Ping(payload) => {
                if write.send(Message::Pong(payload)).await.is_err() {
                    return ConnState::Reconnecting;
                }
            }
            Message::Close(_) => {
                warn!("close frame received");
                return ConnState::Reconnecting;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stream_url_lowercases_topics() {
        let url = stream_url(&["BTCUSDT".to_string(), "ETHBTC".to_string()]);
        assert_eq!(
            url,
            "wss://stream.binance.com:9443/stream?streams=btcusdt@bookTicker/ethbtc@bookTicker"
        );
    }

    #[test]
    fn test_parse_book_ticker_frame() {
        let text = r#"{"stream":"btcusdt@bookTicker","data":{"u":400900217,"s":"BTCUSDT","b":"49999.00","B":"31.2","a":"50000.00","A":"40.6"}}"#;
        let event = parse_frame(text).unwrap().unwrap();
        assert_eq!(event.symbol, "BTCUSDT");
        assert_eq!(event.ticker.bid, dec!(49999.00));
        assert_eq!(event.ticker.ask, dec!(50000.00));
    }

    #[test]
    fn test_parse_ack_frame_is_skipped() {
        let text = r#"{"result":null,"id":1}"#;
        assert!(parse_frame(text).unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed_frame_errors() {
        let text = r#"{"stream":"x","data":{"s":"BTCUSDT","b":"not-a-number","a":"1"}}"#;
        assert!(parse_frame(text).is_err());
    }
}
