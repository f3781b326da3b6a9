//! OKX WebSocket feeds for trades and order-book depth
//!
//! Both feeds validate every wire payload before it reaches a consumer:
//! non-numeric prices, non-positive sizes and unknown sides are dropped
//! with a warning and never surface as values.

use super::{BookFeed, Side, Trade, TradeFeed};
use crate::book::{BookLevel, OrderBookSnapshot};
use crate::ws::{WsClient, WsConfig, WsMessage};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// OKX channel name for the trade tape
const TRADES_CHANNEL: &str = "trades";
/// OKX channel name for 5-level depth snapshots
const BOOKS_CHANNEL: &str = "books5";

/// Envelope wrapping every OKX push message
#[derive(Debug, Deserialize)]
struct OkxEnvelope {
    /// Present on subscription confirmations and errors
    event: Option<String>,
    #[serde(default)]
    data: Vec<serde_json::Value>,
}

/// One trade entry from the `trades` channel
#[derive(Debug, Deserialize)]
struct OkxTradeData {
    #[serde(rename = "instId")]
    inst_id: String,
    px: String,
    sz: String,
    side: String,
    ts: String,
}

/// One depth entry from the `books5` channel
#[derive(Debug, Deserialize)]
struct OkxBookData {
    #[serde(rename = "instId")]
    inst_id: String,
    ts: String,
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
}

/// Build the OKX subscribe op for a channel and symbol list
fn subscribe_payload(channel: &str, symbols: &[String]) -> String {
    let args: Vec<serde_json::Value> = symbols
        .iter()
        .map(|s| serde_json::json!({ "channel": channel, "instId": s }))
        .collect();
    serde_json::json!({ "op": "subscribe", "args": args }).to_string()
}

/// Shared WebSocket settings for both OKX feeds
fn ws_config(url: &str, payload: String) -> WsConfig {
    WsConfig::new(url)
        .max_reconnects(10)
        .initial_delay(Duration::from_secs(1))
        .max_delay(Duration::from_secs(60))
        .ping_interval(Duration::from_secs(20))
        .idle_timeout(Duration::from_secs(45))
        .subscribe(payload)
}

fn parse_ts_millis(raw: &str) -> Option<DateTime<Utc>> {
    let ms: i64 = raw.parse().ok()?;
    Utc.timestamp_millis_opt(ms).single()
}

/// Parse and validate one trade entry; invalid entries are dropped with a warning
fn parse_trade(item: &serde_json::Value) -> Option<Trade> {
    let data: OkxTradeData = match serde_json::from_value(item.clone()) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed trade entry, dropping");
            return None;
        }
    };

    let price = match Decimal::from_str(&data.px) {
        Ok(p) if p > Decimal::ZERO => p,
        _ => {
            tracing::warn!(symbol = %data.inst_id, px = %data.px, "Invalid trade price, dropping");
            return None;
        }
    };

    let size = match Decimal::from_str(&data.sz) {
        Ok(s) if s > Decimal::ZERO => s,
        _ => {
            tracing::warn!(symbol = %data.inst_id, sz = %data.sz, "Invalid trade size, dropping");
            return None;
        }
    };

    let side = match data.side.as_str() {
        "buy" => Side::Buy,
        "sell" => Side::Sell,
        other => {
            tracing::warn!(symbol = %data.inst_id, side = %other, "Unrecognized trade side, dropping");
            return None;
        }
    };

    let ts = match parse_ts_millis(&data.ts) {
        Some(ts) => ts,
        None => {
            tracing::warn!(symbol = %data.inst_id, ts = %data.ts, "Invalid trade timestamp, dropping");
            return None;
        }
    };

    Some(Trade {
        ts,
        symbol: data.inst_id,
        price,
        size,
        side,
    })
}

/// Parse one depth level `[price, size, ...]`; invalid levels are skipped
fn parse_level(entry: &[String]) -> Option<BookLevel> {
    let price = Decimal::from_str(entry.first()?).ok()?;
    let size = Decimal::from_str(entry.get(1)?).ok()?;
    if price <= Decimal::ZERO || size < Decimal::ZERO {
        tracing::warn!(%price, %size, "Invalid book level, skipping");
        return None;
    }
    Some(BookLevel { price, size })
}

/// Parse and validate one depth entry into a snapshot
fn parse_book(item: &serde_json::Value) -> Option<OrderBookSnapshot> {
    let data: OkxBookData = match serde_json::from_value(item.clone()) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed book entry, dropping");
            return None;
        }
    };

    let bids: Vec<BookLevel> = data.bids.iter().filter_map(|e| parse_level(e)).collect();
    let asks: Vec<BookLevel> = data.asks.iter().filter_map(|e| parse_level(e)).collect();

    // A one-sided book is not usable downstream
    if bids.is_empty() || asks.is_empty() {
        tracing::debug!(symbol = %data.inst_id, "Empty book side, dropping snapshot");
        return None;
    }

    let ts = match parse_ts_millis(&data.ts) {
        Some(ts) => ts,
        None => {
            tracing::warn!(symbol = %data.inst_id, ts = %data.ts, "Invalid book timestamp, dropping");
            return None;
        }
    };

    Some(OrderBookSnapshot {
        ts,
        symbol: data.inst_id,
        best_bid: bids[0].price,
        best_ask: asks[0].price,
        bids,
        asks,
    })
}

/// OKX trade tape feed
pub struct OkxTradeFeed {
    url: String,
    symbols: Vec<String>,
}

impl OkxTradeFeed {
    /// Create a feed for the given endpoint and symbol list
    pub fn new(url: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            url: url.into(),
            symbols,
        }
    }

    /// Run the message processing loop
    async fn run_message_loop(mut ws_rx: mpsc::Receiver<WsMessage>, tx: mpsc::Sender<Trade>) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    let envelope: OkxEnvelope = match serde_json::from_str(&text) {
                        Ok(env) => env,
                        Err(e) => {
                            tracing::warn!(error = %e, "Malformed trade message, dropping");
                            continue;
                        }
                    };

                    if let Some(event) = envelope.event {
                        if event == "error" {
                            tracing::error!(message = %text, "Trade subscription error");
                        } else {
                            tracing::debug!(%event, "Trade channel event");
                        }
                        continue;
                    }

                    for item in &envelope.data {
                        if let Some(trade) = parse_trade(item) {
                            if tx.send(trade).await.is_err() {
                                tracing::debug!("Trade receiver dropped, stopping feed");
                                return;
                            }
                        }
                    }
                }
                WsMessage::Connected => {
                    tracing::info!("OKX trade feed connected");
                }
                WsMessage::Disconnected => {
                    tracing::warn!("OKX trade feed disconnected");
                    break;
                }
                WsMessage::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "OKX trade feed reconnecting...");
                }
                WsMessage::Binary(_) => {}
            }
        }
    }
}

#[async_trait]
impl TradeFeed for OkxTradeFeed {
    async fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<mpsc::Receiver<Trade>> {
        let (tx, rx) = mpsc::channel(1024);

        tracing::info!(symbols = ?self.symbols, "Subscribing to OKX trades");

        let payload = subscribe_payload(TRADES_CHANNEL, &self.symbols);
        let client = WsClient::new(ws_config(&self.url, payload));
        let ws_rx = client.connect(shutdown);

        tokio::spawn(async move {
            Self::run_message_loop(ws_rx, tx).await;
        });

        Ok(rx)
    }
}

/// OKX 5-level order book feed
pub struct OkxBookFeed {
    url: String,
    symbols: Vec<String>,
}

impl OkxBookFeed {
    /// Create a feed for the given endpoint and symbol list
    pub fn new(url: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            url: url.into(),
            symbols,
        }
    }

    /// Run the message processing loop
    async fn run_message_loop(
        mut ws_rx: mpsc::Receiver<WsMessage>,
        tx: mpsc::Sender<OrderBookSnapshot>,
    ) {
        while let Some(msg) = ws_rx.recv().await {
            match msg {
                WsMessage::Text(text) => {
                    let envelope: OkxEnvelope = match serde_json::from_str(&text) {
                        Ok(env) => env,
                        Err(e) => {
                            tracing::warn!(error = %e, "Malformed book message, dropping");
                            continue;
                        }
                    };

                    if let Some(event) = envelope.event {
                        if event == "error" {
                            tracing::error!(message = %text, "Book subscription error");
                        } else {
                            tracing::debug!(%event, "Book channel event");
                        }
                        continue;
                    }

                    for item in &envelope.data {
                        if let Some(snapshot) = parse_book(item) {
                            if tx.send(snapshot).await.is_err() {
                                tracing::debug!("Book receiver dropped, stopping feed");
                                return;
                            }
                        }
                    }
                }
                WsMessage::Connected => {
                    tracing::info!("OKX book feed connected");
                }
                WsMessage::Disconnected => {
                    tracing::warn!("OKX book feed disconnected");
                    break;
                }
                WsMessage::Reconnecting { attempt } => {
                    tracing::warn!(attempt, "OKX book feed reconnecting...");
                }
                WsMessage::Binary(_) => {}
            }
        }
    }
}

#[async_trait]
impl BookFeed for OkxBookFeed {
    async fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<mpsc::Receiver<OrderBookSnapshot>> {
        let (tx, rx) = mpsc::channel(1024);

        tracing::info!(symbols = ?self.symbols, "Subscribing to OKX books5");

        let payload = subscribe_payload(BOOKS_CHANNEL, &self.symbols);
        let client = WsClient::new(ws_config(&self.url, payload));
        let ws_rx = client.connect(shutdown);

        tokio::spawn(async move {
            Self::run_message_loop(ws_rx, tx).await;
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_payload_format() {
        let payload = subscribe_payload(
            TRADES_CHANNEL,
            &["BTC-USDT".to_string(), "ETH-USDT".to_string()],
        );
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["args"][0]["channel"], "trades");
        assert_eq!(value["args"][1]["instId"], "ETH-USDT");
    }

    #[test]
    fn test_parse_valid_trade() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "tradeId": "123456",
            "px": "99000.5",
            "sz": "0.01",
            "side": "buy",
            "ts": "1704067200123"
        });

        let trade = parse_trade(&item).unwrap();
        assert_eq!(trade.symbol, "BTC-USDT");
        assert_eq!(trade.price, dec!(99000.5));
        assert_eq!(trade.size, dec!(0.01));
        assert_eq!(trade.side, Side::Buy);
    }

    #[test]
    fn test_parse_trade_rejects_bad_price() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "px": "not_a_number",
            "sz": "0.01",
            "side": "buy",
            "ts": "1704067200123"
        });
        assert!(parse_trade(&item).is_none());

        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "px": "-5",
            "sz": "0.01",
            "side": "buy",
            "ts": "1704067200123"
        });
        assert!(parse_trade(&item).is_none());
    }

    #[test]
    fn test_parse_trade_rejects_zero_size() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "px": "99000.5",
            "sz": "0",
            "side": "sell",
            "ts": "1704067200123"
        });
        assert!(parse_trade(&item).is_none());
    }

    #[test]
    fn test_parse_trade_rejects_unknown_side() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "px": "99000.5",
            "sz": "0.01",
            "side": "hold",
            "ts": "1704067200123"
        });
        assert!(parse_trade(&item).is_none());
    }

    #[test]
    fn test_parse_book_snapshot() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "ts": "1704067200123",
            "bids": [["91290", "0.5", "0", "3"], ["91280", "0.3", "0", "1"]],
            "asks": [["91310", "0.4", "0", "2"], ["91320", "0.2", "0", "1"]]
        });

        let snap = parse_book(&item).unwrap();
        assert_eq!(snap.symbol, "BTC-USDT");
        assert_eq!(snap.best_bid, dec!(91290));
        assert_eq!(snap.best_ask, dec!(91310));
        assert_eq!(snap.bids.len(), 2);
        assert_eq!(snap.mid_price(), dec!(91300));
    }

    #[test]
    fn test_parse_book_skips_invalid_levels() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "ts": "1704067200123",
            "bids": [["0", "0.5", "0", "3"], ["91280", "0.3", "0", "1"]],
            "asks": [["91310", "0.4", "0", "2"]]
        });

        let snap = parse_book(&item).unwrap();
        assert_eq!(snap.bids.len(), 1);
        assert_eq!(snap.best_bid, dec!(91280));
    }

    #[test]
    fn test_parse_book_rejects_one_sided() {
        let item = serde_json::json!({
            "instId": "BTC-USDT",
            "ts": "1704067200123",
            "bids": [["91290", "0.5", "0", "3"]],
            "asks": []
        });
        assert!(parse_book(&item).is_none());
    }

    #[tokio::test]
    async fn test_trade_message_loop() {
        let (ws_tx, ws_rx) = mpsc::channel(10);
        let (tx, mut rx) = mpsc::channel(10);

        let handle = tokio::spawn(async move {
            OkxTradeFeed::run_message_loop(ws_rx, tx).await;
        });

        // Subscription confirmation is skipped
        ws_tx
            .send(WsMessage::Text(
                r#"{"event":"subscribe","arg":{"channel":"trades","instId":"BTC-USDT"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();

        // Invalid then valid message: only the valid one surfaces
        ws_tx
            .send(WsMessage::Text("not json".to_string()))
            .await
            .unwrap();
        ws_tx
            .send(WsMessage::Text(
                r#"{"arg":{"channel":"trades","instId":"BTC-USDT"},"data":[{"instId":"BTC-USDT","px":"42500.50","sz":"0.001","side":"buy","ts":"1704067200123"}]}"#.to_string(),
            ))
            .await
            .unwrap();

        let trade = rx.recv().await.unwrap();
        assert_eq!(trade.price, dec!(42500.50));

        ws_tx.send(WsMessage::Disconnected).await.unwrap();
        handle.await.unwrap();
    }
}
