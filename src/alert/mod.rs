//! Best-effort webhook alerting with per-(symbol, side) cooldowns
//!
//! Alert delivery is never allowed to fail the pipeline: send errors are
//! logged and reported as "not sent". Cooldown state lives only in memory.

use crate::wick::WickSide;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;

/// HTTP timeout for a single webhook post
const SEND_TIMEOUT: StdDuration = StdDuration::from_secs(10);

/// Payload handed to the notification sink
#[derive(Debug, Clone)]
pub struct WickAlert {
    pub symbol: String,
    pub side: WickSide,
    pub high: f64,
    pub low: f64,
    pub magnet_score: f64,
    pub confidence: f64,
    pub breakdown: BTreeMap<String, f64>,
    pub wick_ratio: f64,
    pub delta: f64,
    pub depth_imbalance: f64,
    pub funding_rate: f64,
}

/// Trait for notification sinks
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver an alert, best effort; returns whether it was actually sent
    async fn notify(&self, alert: &WickAlert) -> bool;
}

/// Discord-style webhook notifier
pub struct WebhookNotifier {
    http: reqwest::Client,
    webhook_url: String,
    cooldown: Duration,
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl WebhookNotifier {
    pub fn new(webhook_url: impl Into<String>, cooldown_secs: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.into(),
            cooldown: Duration::seconds(cooldown_secs as i64),
            cooldowns: Mutex::new(HashMap::new()),
        })
    }

    fn cooldown_key(alert: &WickAlert) -> String {
        format!("{}_{}", alert.symbol, alert.side.as_str())
    }

    /// True when the key is off cooldown
    async fn off_cooldown(&self, key: &str, now: DateTime<Utc>) -> bool {
        let cooldowns = self.cooldowns.lock().await;
        match cooldowns.get(key) {
            Some(last) => now - *last >= self.cooldown,
            None => true,
        }
    }

    async fn arm_cooldown(&self, key: String, now: DateTime<Utc>) {
        self.cooldowns.lock().await.insert(key, now);
    }

    /// Build the Discord embed payload
    fn build_payload(&self, alert: &WickAlert) -> serde_json::Value {
        let (direction, color) = match alert.side {
            WickSide::Lower => ("BULL", 0x00FF00),
            WickSide::Upper => ("BEAR", 0xFF0000),
        };

        serde_json::json!({
            "embeds": [{
                "title": format!("{} WICK - {}", direction, alert.symbol),
                "color": color,
                "timestamp": Utc::now().to_rfc3339(),
                "fields": [
                    { "name": "High", "value": format!("${:.2}", alert.high), "inline": true },
                    { "name": "Low", "value": format!("${:.2}", alert.low), "inline": true },
                    { "name": "Wick Ratio", "value": format!("{:.2}", alert.wick_ratio), "inline": true },
                    { "name": "Magnet Score", "value": format!("{:.1}/100", alert.magnet_score), "inline": true },
                    { "name": "Confidence", "value": format!("{:.0}%", alert.confidence), "inline": true },
                    { "name": "Delta", "value": format!("{:+.4}", alert.delta), "inline": true },
                    { "name": "Depth Imbal", "value": format!("{:+.2}%", alert.depth_imbalance * 100.0), "inline": true },
                    { "name": "Funding", "value": format!("{:.4}%", alert.funding_rate * 100.0), "inline": true },
                ],
            }]
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, alert: &WickAlert) -> bool {
        let key = Self::cooldown_key(alert);
        let now = Utc::now();

        if !self.off_cooldown(&key, now).await {
            tracing::debug!(%key, "Alert suppressed by cooldown");
            return false;
        }

        let payload = self.build_payload(alert);
        match self.http.post(&self.webhook_url).json(&payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                self.arm_cooldown(key, now).await;
                tracing::info!(symbol = %alert.symbol, side = alert.side.as_str(), "Alert sent");
                true
            }
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "Webhook rejected alert");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "Webhook send failed");
                false
            }
        }
    }
}
