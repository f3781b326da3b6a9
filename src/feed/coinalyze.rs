//! Coinalyze derivatives poller
//!
//! Fetches open interest, funding rate and liquidation history. Every call
//! carries a bounded timeout; a failed or timed-out call is a soft failure
//! that yields nothing for this cycle.

use chrono::{DateTime, Timelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const BASE_URL: &str = "https://api.coinalyze.net/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Open-interest delta between the two most recent OI candles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OiSnapshot {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub oi_open: f64,
    pub oi_close: f64,
    pub delta_oi: f64,
}

/// Current and predicted funding rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub funding_rate_now: f64,
    pub funding_rate_next: f64,
    pub next_funding_ts: DateTime<Utc>,
}

/// Liquidated side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LiqSide {
    Long,
    Short,
}

/// One liquidation burst from the history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub side: LiqSide,
    pub volume: f64,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
struct HistoryEnvelope<T> {
    #[serde(default = "Vec::new")]
    history: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct OiCandle {
    t: i64,
    o: f64,
    c: f64,
}

#[derive(Debug, Deserialize)]
struct FundingRecord {
    #[serde(default)]
    value: f64,
    predicted: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LiqCandle {
    t: i64,
    #[serde(rename = "l", default)]
    long: f64,
    #[serde(rename = "s", default)]
    short: f64,
}

/// Coinalyze REST client
pub struct CoinalyzeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl CoinalyzeClient {
    /// Create a client; the API key may be empty for unauthenticated use
    pub fn new(api_key: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: BASE_URL.to_string(),
        })
    }

    /// Map an OKX instrument id to the Coinalyze aggregated-perp symbol
    fn convert_symbol(symbol: &str) -> String {
        let base = symbol.split('-').next().unwrap_or(symbol);
        format!("{}USDT_PERP.A", base)
    }

    async fn get(&self, path: &str, params: &[(&str, String)]) -> Option<serde_json::Value> {
        let mut request = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(params);
        if !self.api_key.is_empty() {
            request = request.header("api_key", &self.api_key);
        }

        match request.send().await {
            Ok(resp) if resp.status().is_success() => match resp.json().await {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, path, "Coinalyze response decode failed");
                    None
                }
            },
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), path, "Coinalyze request failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, path, "Coinalyze request error");
                None
            }
        }
    }

    /// Fetch the latest open-interest delta, or None on any failure
    pub async fn fetch_open_interest(&self, symbol: &str) -> Option<OiSnapshot> {
        let now = Utc::now().timestamp();
        let params = [
            ("symbols", Self::convert_symbol(symbol)),
            ("interval", "5min".to_string()),
            ("from", (now - 900).to_string()),
            ("to", now.to_string()),
        ];

        let value = self.get("/open-interest-history", &params).await?;
        let envelopes: Vec<HistoryEnvelope<OiCandle>> = serde_json::from_value(value).ok()?;
        let records = &envelopes.first()?.history;

        if records.len() >= 2 {
            let prev = &records[records.len() - 2];
            let curr = &records[records.len() - 1];
            Some(OiSnapshot {
                ts: Utc.timestamp_millis_opt(curr.t).single()?,
                symbol: symbol.to_string(),
                oi_open: prev.c,
                oi_close: curr.c,
                delta_oi: curr.c - prev.c,
            })
        } else if records.len() == 1 {
            let curr = &records[0];
            Some(OiSnapshot {
                ts: Utc.timestamp_millis_opt(curr.t).single()?,
                symbol: symbol.to_string(),
                oi_open: curr.o,
                oi_close: curr.c,
                delta_oi: curr.c - curr.o,
            })
        } else {
            None
        }
    }

    /// Fetch the current funding rate, or None on any failure
    pub async fn fetch_funding_rate(&self, symbol: &str) -> Option<FundingSnapshot> {
        let params = [("symbols", Self::convert_symbol(symbol))];
        let value = self.get("/funding-rate", &params).await?;
        let records: Vec<FundingRecord> = serde_json::from_value(value).ok()?;
        let record = records.first()?;

        let now = Utc::now();
        Some(FundingSnapshot {
            ts: now,
            symbol: symbol.to_string(),
            // Coinalyze reports percentages
            funding_rate_now: record.value / 100.0,
            funding_rate_next: record.predicted.unwrap_or(record.value) / 100.0,
            next_funding_ts: next_funding_time(now),
        })
    }

    /// Fetch recent liquidation bursts; empty on any failure
    pub async fn fetch_liquidations(
        &self,
        symbol: &str,
        lookback_minutes: i64,
    ) -> Vec<LiquidationEvent> {
        let now = Utc::now().timestamp();
        let params = [
            ("symbols", Self::convert_symbol(symbol)),
            ("interval", "5min".to_string()),
            ("from", (now - lookback_minutes * 60).to_string()),
            ("to", now.to_string()),
        ];

        let Some(value) = self.get("/liquidation-history", &params).await else {
            return Vec::new();
        };
        let Ok(envelopes) =
            serde_json::from_value::<Vec<HistoryEnvelope<LiqCandle>>>(value)
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for record in envelopes.into_iter().flat_map(|e| e.history) {
            let Some(ts) = Utc.timestamp_millis_opt(record.t).single() else {
                continue;
            };
            if record.long > 0.0 {
                events.push(LiquidationEvent {
                    ts,
                    symbol: symbol.to_string(),
                    side: LiqSide::Long,
                    volume: record.long,
                    // Price is not exposed by this endpoint
                    price: 0.0,
                });
            }
            if record.short > 0.0 {
                events.push(LiquidationEvent {
                    ts,
                    symbol: symbol.to_string(),
                    side: LiqSide::Short,
                    volume: record.short,
                    price: 0.0,
                });
            }
        }
        events
    }
}

/// Next 8-hour funding boundary (00:00 / 08:00 / 16:00 UTC) after `now`
fn next_funding_time(now: DateTime<Utc>) -> DateTime<Utc> {
    let truncated = now.with_nanosecond(0).unwrap_or(now);
    let secs_into_period = (truncated.hour() % 8) as i64 * 3600
        + truncated.minute() as i64 * 60
        + truncated.second() as i64;
    truncated - chrono::Duration::seconds(secs_into_period) + chrono::Duration::hours(8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_conversion() {
        assert_eq!(
            CoinalyzeClient::convert_symbol("BTC-USDT"),
            "BTCUSDT_PERP.A"
        );
        assert_eq!(
            CoinalyzeClient::convert_symbol("SOL-USDT-SWAP"),
            "SOLUSDT_PERP.A"
        );
        assert_eq!(CoinalyzeClient::convert_symbol("ETH"), "ETHUSDT_PERP.A");
    }

    #[test]
    fn test_next_funding_time_boundaries() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 3, 30, 15).unwrap();
        let next = next_funding_time(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap());

        // Late in the day rolls over to next midnight
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 22, 59, 59).unwrap();
        let next = next_funding_time(now);
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 6, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_oi_candle_parsing() {
        let raw = serde_json::json!([
            {"symbol": "BTCUSDT_PERP.A", "history": [
                {"t": 1704067200, "o": 100.0, "h": 110.0, "l": 95.0, "c": 105.0},
                {"t": 1704067500, "o": 105.0, "h": 112.0, "l": 101.0, "c": 110.0}
            ]}
        ]);
        let envelopes: Vec<HistoryEnvelope<OiCandle>> = serde_json::from_value(raw).unwrap();
        assert_eq!(envelopes[0].history.len(), 2);
        assert_eq!(envelopes[0].history[1].c, 110.0);
    }

    #[test]
    fn test_liq_candle_parsing() {
        let raw = serde_json::json!({"t": 1704067200, "l": 12000.0, "s": 0.0});
        let candle: LiqCandle = serde_json::from_value(raw).unwrap();
        assert_eq!(candle.long, 12000.0);
        assert_eq!(candle.short, 0.0);
    }
}
