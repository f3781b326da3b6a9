//! Order book snapshot type and latest-snapshot cache

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One resting price level
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Decimal,
}

/// Immutable top-N order book snapshot for one instrument
///
/// Bids are sorted best (highest) to worst, asks best (lowest) to worst.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBookSnapshot {
    /// Mid price between best bid and best ask
    pub fn mid_price(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    /// Best ask minus best bid
    pub fn spread(&self) -> Decimal {
        self.best_ask - self.best_bid
    }
}

/// Per-symbol cache holding only the latest snapshot
///
/// Single writer (the book feed task), many readers. Each update replaces
/// the whole `Arc`'d value, so a reader never observes a partially built
/// snapshot.
#[derive(Default)]
pub struct BookCache {
    inner: RwLock<HashMap<String, Arc<OrderBookSnapshot>>>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot for the snapshot's symbol
    pub async fn insert(&self, snapshot: OrderBookSnapshot) {
        let mut inner = self.inner.write().await;
        inner.insert(snapshot.symbol.clone(), Arc::new(snapshot));
    }

    /// Latest snapshot for a symbol, if any has arrived
    pub async fn latest(&self, symbol: &str) -> Option<Arc<OrderBookSnapshot>> {
        let inner = self.inner.read().await;
        inner.get(symbol).cloned()
    }

    /// Age in seconds of the freshest snapshot across all symbols
    pub async fn freshest_age_secs(&self, now: DateTime<Utc>) -> Option<i64> {
        let inner = self.inner.read().await;
        inner
            .values()
            .map(|snap| (now - snap.ts).num_seconds())
            .min()
    }
}
