//! CoinGecko macro dominance monitor
//!
//! Polls global market-cap percentages on a fixed cadence and maintains a
//! shared dominance snapshot with a one-hour trend classification. Failed
//! polls skip the cycle; the last good snapshot stays in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

const BASE_URL: &str = "https://api.coingecko.com/api/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Dominance history horizon used for the trend slope
const TREND_WINDOW_SECS: i64 = 3600;

/// Direction of the USDT dominance trend over the last hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Neutral,
}

/// Shared macro dominance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
pub struct MacroState {
    pub usdt_dominance: f64,
    pub btc_dominance: f64,
    pub usdt_trend: Trend,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GlobalResponse {
    data: GlobalData,
}

#[derive(Debug, Deserialize)]
struct GlobalData {
    #[serde(default)]
    market_cap_percentage: HashMap<String, f64>,
}

/// Polls CoinGecko global metrics and maintains `MacroState`
pub struct MacroMonitor {
    http: reqwest::Client,
    api_key: String,
    poll_interval: Duration,
    state: Arc<RwLock<MacroState>>,
    history: Vec<(i64, f64)>,
}

impl MacroMonitor {
    pub fn new(api_key: impl Into<String>, poll_interval: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            poll_interval,
            state: Arc::new(RwLock::new(MacroState::default())),
            history: Vec::new(),
        })
    }

    /// Shared handle to the latest dominance snapshot
    pub fn state_handle(&self) -> Arc<RwLock<MacroState>> {
        self.state.clone()
    }

    /// Run the poll loop until shutdown
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Macro monitor started");
        loop {
            if let Err(e) = self.update_metrics().await {
                tracing::warn!(error = %e, "Macro poll failed, skipping cycle");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Macro monitor stopped");
    }

    async fn update_metrics(&mut self) -> anyhow::Result<()> {
        let mut request = self.http.get(format!("{}/global", BASE_URL));
        if !self.api_key.is_empty() {
            request = request.header("x-cg-demo-api-key", &self.api_key);
        }

        let response: GlobalResponse = request.send().await?.error_for_status()?.json().await?;
        let pct = response.data.market_cap_percentage;

        let usdt = pct.get("usdt").copied().unwrap_or(0.0);
        let btc = pct.get("btc").copied().unwrap_or(0.0);
        let now = Utc::now();
        let trend = self.update_trend(now.timestamp(), usdt);

        let mut state = self.state.write().await;
        state.usdt_dominance = usdt;
        state.btc_dominance = btc;
        state.usdt_trend = trend;
        state.last_update = Some(now);

        tracing::info!(
            usdt_dominance = usdt,
            btc_dominance = btc,
            trend = ?trend,
            "Macro metrics updated"
        );
        Ok(())
    }

    /// Classify the trend from the bounded dominance history
    fn update_trend(&mut self, now: i64, usdt_dominance: f64) -> Trend {
        self.history.push((now, usdt_dominance));
        let cutoff = now - TREND_WINDOW_SECS;
        self.history.retain(|(ts, _)| *ts > cutoff);

        if self.history.len() < 2 {
            return Trend::Neutral;
        }

        let start = self.history[0].1;
        let end = self.history[self.history.len() - 1].1;

        if end > start * 1.01 {
            Trend::Up // risk off
        } else if end < start * 0.99 {
            Trend::Down // risk on
        } else {
            Trend::Neutral
        }
    }
}
