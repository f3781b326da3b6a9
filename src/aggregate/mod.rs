//! Tumbling-window bar aggregation
//!
//! Folds the trade tape into fixed-interval OHLCV bars, one aggregator per
//! symbol. Buckets with no trades produce no bars. Trades whose bucket lies
//! behind the open one (clock skew, out-of-order delivery) are dropped and
//! counted rather than merged into the wrong bar.

use crate::feed::{Side, Trade};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// Fixed-interval OHLCV bar
///
/// Mutable while its window is open; finalized and handed downstream
/// exactly once when the window rolls over.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub start_ts: DateTime<Utc>,
    pub end_ts: DateTime<Utc>,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub buy_volume: Decimal,
    pub sell_volume: Decimal,
    /// Constituent trades, kept for order-flow analysis
    pub trades: Vec<Trade>,
}

impl Bar {
    /// High minus low
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// Absolute body size
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// Window duration in seconds
    pub fn duration_secs(&self) -> i64 {
        (self.end_ts - self.start_ts).num_seconds()
    }
}

/// Per-symbol tumbling-window aggregator
#[derive(Debug)]
pub struct BarAggregator {
    interval_secs: i64,
    bucket_start: Option<DateTime<Utc>>,
    current: Option<Bar>,
    late_drops: u64,
}

impl BarAggregator {
    /// Create an aggregator with the given window size
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs: interval_secs as i64,
            bucket_start: None,
            current: None,
            late_drops: 0,
        }
    }

    /// Ingest a trade; returns the finalized prior bar on window rollover
    pub fn process(&mut self, trade: &Trade) -> Option<Bar> {
        let bucket_ts = trade.ts.timestamp().div_euclid(self.interval_secs) * self.interval_secs;
        let bucket_start = Utc.timestamp_opt(bucket_ts, 0).single()?;

        match self.bucket_start {
            None => {
                self.seed_bar(bucket_start, trade);
                None
            }
            Some(current_start) if bucket_start > current_start => {
                // Finalize the open bar before seeding the new one
                let mut closed = self.current.take()?;
                closed.end_ts = current_start + chrono::Duration::seconds(self.interval_secs);
                self.seed_bar(bucket_start, trade);
                Some(closed)
            }
            Some(current_start) if bucket_start < current_start => {
                // Out-of-order trade behind the open bucket: drop it
                self.late_drops += 1;
                tracing::debug!(
                    symbol = %trade.symbol,
                    trade_ts = %trade.ts,
                    bucket = %current_start,
                    "Dropping late trade behind open bucket"
                );
                None
            }
            Some(_) => {
                self.update_bar(trade);
                None
            }
        }
    }

    /// The bar currently being built, if any
    pub fn open_bar(&self) -> Option<&Bar> {
        self.current.as_ref()
    }

    /// Number of out-of-order trades dropped so far
    pub fn late_drops(&self) -> u64 {
        self.late_drops
    }

    fn seed_bar(&mut self, start_ts: DateTime<Utc>, trade: &Trade) {
        let (buy_volume, sell_volume) = match trade.side {
            Side::Buy => (trade.size, Decimal::ZERO),
            Side::Sell => (Decimal::ZERO, trade.size),
        };

        self.bucket_start = Some(start_ts);
        self.current = Some(Bar {
            start_ts,
            // Provisional; fixed up at rollover
            end_ts: start_ts + chrono::Duration::seconds(self.interval_secs),
            symbol: trade.symbol.clone(),
            open: trade.price,
            high: trade.price,
            low: trade.price,
            close: trade.price,
            volume: trade.size,
            buy_volume,
            sell_volume,
            trades: vec![trade.clone()],
        });
    }

    fn update_bar(&mut self, trade: &Trade) {
        if let Some(bar) = self.current.as_mut() {
            bar.high = bar.high.max(trade.price);
            bar.low = bar.low.min(trade.price);
            bar.close = trade.price;
            bar.volume += trade.size;
            match trade.side {
                Side::Buy => bar.buy_volume += trade.size,
                Side::Sell => bar.sell_volume += trade.size,
            }
            bar.trades.push(trade.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade_at(secs: i64, price: Decimal, size: Decimal, side: Side) -> Trade {
        Trade {
            ts: Utc.timestamp_opt(secs, 0).unwrap(),
            symbol: "BTC-USDT".to_string(),
            price,
            size,
            side,
        }
    }

    #[test]
    fn test_aggregation_rollover_scenario() {
        // Trades at t=0s, 30s, 61s with a 60s interval: the first two calls
        // return no closed bar; the t=61 call returns the [0, 60) bar built
        // from the first two trades and opens a new bar at t=61.
        let mut agg = BarAggregator::new(60);

        assert!(agg
            .process(&trade_at(0, dec!(100), dec!(1), Side::Buy))
            .is_none());
        assert!(agg
            .process(&trade_at(30, dec!(105), dec!(2), Side::Sell))
            .is_none());

        let closed = agg
            .process(&trade_at(61, dec!(103), dec!(1), Side::Buy))
            .expect("bar should close");

        assert_eq!(closed.start_ts, Utc.timestamp_opt(0, 0).unwrap());
        assert_eq!(closed.end_ts, Utc.timestamp_opt(60, 0).unwrap());
        assert_eq!(closed.open, dec!(100));
        assert_eq!(closed.high, dec!(105));
        assert_eq!(closed.low, dec!(100));
        assert_eq!(closed.close, dec!(105));
        assert_eq!(closed.volume, dec!(3));
        assert_eq!(closed.buy_volume, dec!(1));
        assert_eq!(closed.sell_volume, dec!(2));
        assert_eq!(closed.trades.len(), 2);

        let open = agg.open_bar().expect("new bar open");
        assert_eq!(open.start_ts, Utc.timestamp_opt(60, 0).unwrap());
        assert_eq!(open.open, dec!(103));
    }

    #[test]
    fn test_gap_buckets_are_absent() {
        // A trade three windows later closes the old bar directly; no bars
        // are synthesized for the empty buckets in between.
        let mut agg = BarAggregator::new(60);
        agg.process(&trade_at(10, dec!(100), dec!(1), Side::Buy));

        let closed = agg
            .process(&trade_at(190, dec!(101), dec!(1), Side::Buy))
            .expect("old bar closes");
        assert_eq!(closed.end_ts, Utc.timestamp_opt(60, 0).unwrap());
        assert_eq!(
            agg.open_bar().unwrap().start_ts,
            Utc.timestamp_opt(180, 0).unwrap()
        );
    }

    #[test]
    fn test_late_trade_is_dropped() {
        let mut agg = BarAggregator::new(60);
        agg.process(&trade_at(70, dec!(100), dec!(1), Side::Buy));

        // Trade from the previous bucket arrives late
        let result = agg.process(&trade_at(50, dec!(999), dec!(5), Side::Buy));
        assert!(result.is_none());
        assert_eq!(agg.late_drops(), 1);

        // The open bar is untouched by the late trade
        let open = agg.open_bar().unwrap();
        assert_eq!(open.high, dec!(100));
        assert_eq!(open.volume, dec!(1));
        assert_eq!(open.trades.len(), 1);
    }

    #[test]
    fn test_ohlc_updates_within_bucket() {
        let mut agg = BarAggregator::new(60);
        agg.process(&trade_at(0, dec!(100), dec!(1), Side::Buy));
        agg.process(&trade_at(10, dec!(110), dec!(1), Side::Buy));
        agg.process(&trade_at(20, dec!(95), dec!(1), Side::Sell));
        agg.process(&trade_at(30, dec!(102), dec!(1), Side::Sell));

        let bar = agg.open_bar().unwrap();
        assert_eq!(bar.open, dec!(100));
        assert_eq!(bar.high, dec!(110));
        assert_eq!(bar.low, dec!(95));
        assert_eq!(bar.close, dec!(102));
        assert_eq!(bar.buy_volume, dec!(2));
        assert_eq!(bar.sell_volume, dec!(2));
    }

    #[test]
    fn test_bar_helpers() {
        let mut agg = BarAggregator::new(60);
        agg.process(&trade_at(0, dec!(100), dec!(1), Side::Buy));
        agg.process(&trade_at(5, dec!(110), dec!(1), Side::Buy));
        let bar = agg
            .process(&trade_at(65, dec!(100), dec!(1), Side::Buy))
            .unwrap();

        assert_eq!(bar.range(), dec!(10));
        assert_eq!(bar.body(), dec!(10));
        assert_eq!(bar.duration_secs(), 60);
    }
}
