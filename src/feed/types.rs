//! Market data feed types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Aggressor side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

/// A single validated trade from the tape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange timestamp
    pub ts: DateTime<Utc>,
    /// Instrument id (e.g. "BTC-USDT")
    pub symbol: String,
    /// Trade price, always positive
    pub price: Decimal,
    /// Trade size, always positive
    pub size: Decimal,
    /// Aggressor side
    pub side: Side,
}
