//! VWAP features over per-symbol accumulators
//!
//! Each accumulator stores Σ(p·v), Σv and Σ(p²·v), which is enough to
//! derive the running mean and variance in O(1) per update without keeping
//! raw prices around.

use super::dec_f64;
use super::vector::FeatureVector;
use crate::aggregate::Bar;
use std::collections::HashMap;

/// Sigma level that maps to a full 100-point reversion score
const FULL_SCORE_SIGMA: f64 = 3.0;

/// Online VWAP/variance accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VwapAccumulator {
    sum_pv: f64,
    sum_v: f64,
    sum_pv2: f64,
}

impl VwapAccumulator {
    /// Fold one trade into the accumulator
    pub fn add(&mut self, price: f64, volume: f64) {
        self.sum_pv += price * volume;
        self.sum_v += volume;
        self.sum_pv2 += price * price * volume;
    }

    /// Volume-weighted average price, zero before any volume
    pub fn vwap(&self) -> f64 {
        if self.sum_v <= 0.0 {
            return 0.0;
        }
        self.sum_pv / self.sum_v
    }

    /// Volume-weighted price variance: E[X²] − E[X]²
    pub fn variance(&self) -> f64 {
        if self.sum_v <= 0.0 {
            return 0.0;
        }
        let mean = self.vwap();
        let e_x2 = self.sum_pv2 / self.sum_v;
        (e_x2 - mean * mean).max(0.0)
    }

    /// Volume-weighted standard deviation
    pub fn stdev(&self) -> f64 {
        self.variance().sqrt()
    }
}

/// Per-symbol VWAP state: one global accumulator plus one per session label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VwapState {
    global: VwapAccumulator,
    sessions: HashMap<String, VwapAccumulator>,
}

impl VwapState {
    /// Fold the bar's trades into the accumulators and fill the VWAP block
    ///
    /// Re-querying with no new trades at an unchanged price leaves every
    /// output unchanged.
    pub fn apply(&mut self, vector: &mut FeatureVector, bar: &Bar, session_label: &str) {
        for trade in &bar.trades {
            let price = dec_f64(trade.price);
            let size = dec_f64(trade.size);
            self.global.add(price, size);
            self.sessions
                .entry(session_label.to_string())
                .or_default()
                .add(price, size);
        }

        let last_price = dec_f64(bar.close);
        let global_vwap = self.global.vwap();
        let session_vwap = self
            .sessions
            .get(session_label)
            .map(|acc| acc.vwap())
            .filter(|v| *v > 0.0)
            .unwrap_or(global_vwap);

        vector.global_vwap_distance = if global_vwap > 0.0 {
            (last_price - global_vwap) / global_vwap
        } else {
            0.0
        };
        vector.session_vwap_distance = if session_vwap > 0.0 {
            (last_price - session_vwap) / session_vwap
        } else {
            0.0
        };

        let stdev = self.global.stdev();
        if stdev > 0.0 {
            let z = (last_price - global_vwap) / stdev;
            vector.vwap_band_flag_1sd = z.abs() >= 1.0;
            vector.vwap_band_flag_2sd = z.abs() >= 2.0;

            // Sign points toward the mean: negative above VWAP, positive below
            let magnitude = (z.abs() / FULL_SCORE_SIGMA * 100.0).min(100.0);
            vector.vwap_mean_reversion_score = if z < 0.0 { magnitude } else { -magnitude };
        }
    }

    /// Global accumulator, for status/report consumers
    pub fn global(&self) -> &VwapAccumulator {
        &self.global
    }
}
