//! Derivatives features from polled OI, funding and liquidation data

use super::vector::FeatureVector;
use crate::feed::{FundingSnapshot, LiquidationEvent, OiSnapshot};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Snapshot history caps
const MAX_OI_SNAPSHOTS: usize = 100;
const MAX_FUNDING_SNAPSHOTS: usize = 100;
const MAX_LIQUIDATION_EVENTS: usize = 1000;

/// Window scanned backwards from the wick timestamp
const LOOKBACK_MINUTES: i64 = 15;
/// Summed liquidation volume above this sets the flag
const LIQUIDATION_FLAG_THRESHOLD: f64 = 1.0;

/// Per-symbol derivatives state: bounded snapshot histories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DerivativesState {
    oi_snapshots: VecDeque<OiSnapshot>,
    funding_snapshots: VecDeque<FundingSnapshot>,
    liquidation_events: VecDeque<LiquidationEvent>,
}

impl DerivativesState {
    /// Record an open-interest snapshot
    pub fn record_oi(&mut self, snapshot: OiSnapshot) {
        push_bounded(&mut self.oi_snapshots, snapshot, MAX_OI_SNAPSHOTS);
    }

    /// Record a funding snapshot
    pub fn record_funding(&mut self, snapshot: FundingSnapshot) {
        push_bounded(&mut self.funding_snapshots, snapshot, MAX_FUNDING_SNAPSHOTS);
    }

    /// Record a liquidation event
    pub fn record_liquidation(&mut self, event: LiquidationEvent) {
        push_bounded(&mut self.liquidation_events, event, MAX_LIQUIDATION_EVENTS);
    }

    /// Fill the derivatives block for a wick at `wick_ts`
    pub fn apply(&self, vector: &mut FeatureVector, wick_ts: DateTime<Utc>) {
        let cutoff = wick_ts - chrono::Duration::minutes(LOOKBACK_MINUTES);

        self.apply_oi(vector, cutoff);
        self.apply_liquidations(vector, cutoff);
        self.apply_funding(vector, wick_ts);
    }

    fn apply_oi(&self, vector: &mut FeatureVector, cutoff: DateTime<Utc>) {
        if self.oi_snapshots.len() < 2 {
            return;
        }

        let mut sorted: Vec<&OiSnapshot> = self.oi_snapshots.iter().collect();
        sorted.sort_by_key(|s| s.ts);
        let relevant: Vec<&OiSnapshot> = sorted.into_iter().filter(|s| s.ts >= cutoff).collect();

        match relevant.len() {
            0 => {}
            1 => {
                // Single snapshot in window: fall back to its own open/close
                let snap = relevant[0];
                if snap.oi_open > 0.0 {
                    vector.oi_change_pct = (snap.oi_close - snap.oi_open) / snap.oi_open;
                    vector.oi_direction = direction(snap.oi_close, snap.oi_open);
                }
            }
            _ => {
                let start = relevant[0].oi_open;
                let end = relevant[relevant.len() - 1].oi_close;
                if start > 0.0 {
                    vector.oi_change_pct = (end - start) / start;
                    vector.oi_direction = direction(end, start);
                }
            }
        }
    }

    fn apply_liquidations(&self, vector: &mut FeatureVector, cutoff: DateTime<Utc>) {
        if self.liquidation_events.is_empty() {
            return;
        }
        let total: f64 = self
            .liquidation_events
            .iter()
            .filter(|e| e.ts >= cutoff)
            .map(|e| e.volume)
            .sum();

        vector.liquidation_density = total;
        vector.oi_liquidation_flag = total > LIQUIDATION_FLAG_THRESHOLD;
    }

    fn apply_funding(&self, vector: &mut FeatureVector, wick_ts: DateTime<Utc>) {
        let Some(latest) = self.funding_snapshots.iter().max_by_key(|s| s.ts) else {
            return;
        };

        vector.funding_rate_now = latest.funding_rate_now;
        vector.funding_rate_next = latest.funding_rate_next;

        if latest.next_funding_ts > wick_ts {
            let delta = latest.next_funding_ts - wick_ts;
            vector.funding_distance_to_timestamp = delta.num_seconds() as f64 / 60.0;
        }
    }
}

fn direction(end: f64, start: f64) -> String {
    if end > start { "inc" } else { "dec" }.to_string()
}

fn push_bounded<T>(deque: &mut VecDeque<T>, value: T, cap: usize) {
    deque.push_back(value);
    while deque.len() > cap {
        deque.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::LiqSide;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn oi(at: i64, open: f64, close: f64) -> OiSnapshot {
        OiSnapshot {
            ts: ts(at),
            symbol: "BTC-USDT".to_string(),
            oi_open: open,
            oi_close: close,
            delta_oi: close - open,
        }
    }

    fn liq(at: i64, volume: f64) -> LiquidationEvent {
        LiquidationEvent {
            ts: ts(at),
            symbol: "BTC-USDT".to_string(),
            side: LiqSide::Long,
            volume,
            price: 0.0,
        }
    }

    #[test]
    fn test_no_data_stays_neutral() {
        let state = DerivativesState::default();
        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(600));
        assert_eq!(v, FeatureVector::default());
    }

    #[test]
    fn test_oi_change_over_window() {
        let mut state = DerivativesState::default();
        state.record_oi(oi(0, 1000.0, 1010.0));
        state.record_oi(oi(300, 1010.0, 1050.0));
        state.record_oi(oi(600, 1050.0, 1100.0));

        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(700));

        // First open in window is 1000, last close is 1100
        assert!((v.oi_change_pct - 0.1).abs() < 1e-9);
        assert_eq!(v.oi_direction, "inc");
    }

    #[test]
    fn test_oi_single_snapshot_fallback() {
        let mut state = DerivativesState::default();
        // Old snapshot far outside the window plus one inside it
        state.record_oi(oi(-7200, 900.0, 950.0));
        state.record_oi(oi(600, 1000.0, 950.0));

        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(700));

        assert!((v.oi_change_pct - (-0.05)).abs() < 1e-9);
        assert_eq!(v.oi_direction, "dec");
    }

    #[test]
    fn test_liquidation_density_and_flag() {
        let mut state = DerivativesState::default();
        state.record_liquidation(liq(0, 0.4));
        state.record_liquidation(liq(100, 0.8));
        // Outside the 15-minute lookback
        state.record_liquidation(liq(-3600, 50.0));

        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(200));

        assert!((v.liquidation_density - 1.2).abs() < 1e-9);
        assert!(v.oi_liquidation_flag);
    }

    #[test]
    fn test_small_liquidations_do_not_flag() {
        let mut state = DerivativesState::default();
        state.record_liquidation(liq(0, 0.5));

        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(100));
        assert!(!v.oi_liquidation_flag);
        assert!((v.liquidation_density - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_funding_minutes_to_next() {
        let mut state = DerivativesState::default();
        state.record_funding(FundingSnapshot {
            ts: ts(0),
            symbol: "BTC-USDT".to_string(),
            funding_rate_now: 0.0001,
            funding_rate_next: 0.0002,
            next_funding_ts: ts(1800),
        });

        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(600));

        assert_eq!(v.funding_rate_now, 0.0001);
        assert_eq!(v.funding_rate_next, 0.0002);
        // 1200 seconds away
        assert!((v.funding_distance_to_timestamp - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_past_funding_timestamp_is_zero() {
        let mut state = DerivativesState::default();
        state.record_funding(FundingSnapshot {
            ts: ts(0),
            symbol: "BTC-USDT".to_string(),
            funding_rate_now: 0.0001,
            funding_rate_next: 0.0002,
            next_funding_ts: ts(100),
        });

        let mut v = FeatureVector::default();
        state.apply(&mut v, ts(600));
        assert_eq!(v.funding_distance_to_timestamp, 0.0);
    }

    #[test]
    fn test_histories_are_bounded() {
        let mut state = DerivativesState::default();
        for i in 0..1200 {
            state.record_liquidation(liq(i, 1.0));
        }
        assert_eq!(state.liquidation_events.len(), MAX_LIQUIDATION_EVENTS);

        for i in 0..150 {
            state.record_oi(oi(i, 100.0, 101.0));
        }
        assert_eq!(state.oi_snapshots.len(), MAX_OI_SNAPSHOTS);
    }
}
