//! Market data feeds
//!
//! Push feeds (OKX trades and order-book depth) plus pull pollers
//! (Coinalyze derivatives, CoinGecko macro dominance). Pollers are soft:
//! they deliver a typed snapshot or nothing, never an error into core logic.

mod coinalyze;
mod coingecko;
mod okx;
mod types;

pub use coinalyze::{CoinalyzeClient, FundingSnapshot, LiqSide, LiquidationEvent, OiSnapshot};
pub use coingecko::{MacroMonitor, MacroState, Trend};
pub use okx::{OkxBookFeed, OkxTradeFeed};
pub use types::{Side, Trade};

use crate::book::OrderBookSnapshot;
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// Trait for trade tape feed implementations
#[async_trait]
pub trait TradeFeed: Send + Sync {
    /// Subscribe to validated trades
    async fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<mpsc::Receiver<Trade>>;
}

/// Trait for order-book feed implementations
#[async_trait]
pub trait BookFeed: Send + Sync {
    /// Subscribe to validated book snapshots
    async fn subscribe(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<mpsc::Receiver<OrderBookSnapshot>>;
}
