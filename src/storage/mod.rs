//! Persistence boundary
//!
//! Append-only JSONL audit log with size-based rotation plus an atomic
//! status snapshot. Every persisted type implements serde's `Serialize`,
//! the single serialization interface here. Write failures surface as
//! typed errors; an audit log must never lose data silently.

mod jsonl;
mod status;

pub use jsonl::JsonlWriter;
pub use status::{StatusSnapshot, StatusWriter, SymbolStatus};

use crate::book::OrderBookSnapshot;
use crate::features::FeatureVector;
use crate::score::ScoreResult;
use crate::wick::WickSide;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Persistence errors, surfaced to the caller
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Order book embedded in an event record: mid price plus top-20 levels
/// per side, enough for downstream microstructure re-analysis
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedBook {
    pub symbol: String,
    pub ts: DateTime<Utc>,
    pub mid_price: Decimal,
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

/// Levels kept per side in the embedded book
const EMBEDDED_LEVELS: usize = 20;

impl EmbeddedBook {
    /// Capture the top levels of a snapshot
    pub fn from_snapshot(snapshot: &OrderBookSnapshot) -> Self {
        Self {
            symbol: snapshot.symbol.clone(),
            ts: snapshot.ts,
            mid_price: snapshot.mid_price(),
            bids: snapshot
                .bids
                .iter()
                .take(EMBEDDED_LEVELS)
                .map(|l| (l.price, l.size))
                .collect(),
            asks: snapshot
                .asks
                .iter()
                .take(EMBEDDED_LEVELS)
                .map(|l| (l.price, l.size))
                .collect(),
        }
    }
}

/// One fully scored wick event, as appended to the audit log
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub event_id: Uuid,
    pub ts: DateTime<Utc>,
    pub symbol: String,
    pub timeframe: String,
    pub wick_side: WickSide,
    pub wick_high: Decimal,
    pub wick_low: Decimal,
    pub features: FeatureVector,
    pub score: ScoreResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orderbook: Option<EmbeddedBook>,
}
