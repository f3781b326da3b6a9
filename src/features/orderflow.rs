//! Order-flow features over per-symbol rolling state

use super::dec_f64;
use super::vector::FeatureVector;
use crate::aggregate::Bar;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};

/// Rolling history cap per series
const MAX_HISTORY: usize = 100;
/// Samples needed before frequency statistics fire
const FREQUENCY_WINDOW: usize = 20;
/// CVD regression window
const SLOPE_WINDOW: usize = 10;
/// Trades at one identical price that mark an iceberg
const ICEBERG_MIN_PRINTS: usize = 5;

/// Per-symbol order-flow state: CVD accumulator plus bounded histories
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFlowState {
    cvd: f64,
    cvd_history: VecDeque<f64>,
    delta_history: VecDeque<f64>,
    trade_count_history: VecDeque<usize>,
}

impl OrderFlowState {
    /// Fold a finalized bar into the state and fill the order-flow block
    pub fn apply(&mut self, vector: &mut FeatureVector, bar: &Bar) {
        let buy_volume = dec_f64(bar.buy_volume);
        let sell_volume = dec_f64(bar.sell_volume);
        let delta = buy_volume - sell_volume;
        let trade_count = bar.trades.len();

        self.cvd += delta;
        push_bounded(&mut self.cvd_history, self.cvd, MAX_HISTORY);
        push_bounded(&mut self.delta_history, delta, MAX_HISTORY);
        push_bounded(&mut self.trade_count_history, trade_count, MAX_HISTORY);

        vector.delta_at_wick = delta;

        // Previous bar's delta (the just-pushed entry is the current one)
        if self.delta_history.len() >= 2 {
            vector.delta_prev_pivot = self.delta_history[self.delta_history.len() - 2];
        }

        vector.cvd_slope_10 = self.cvd_slope();

        let open = dec_f64(bar.open);
        let close = dec_f64(bar.close);
        let price_change = close - open;
        vector.delta_divergence_flag =
            (price_change > 0.0 && delta < 0.0) || (price_change < 0.0 && delta > 0.0);

        let total_volume = buy_volume + sell_volume;
        let range = dec_f64(bar.range());
        vector.absorption_flag = self.detect_absorption(
            total_volume,
            range,
            price_change,
            trade_count,
        );

        vector.exhaustion_flag = self.detect_exhaustion();
        vector.trade_frequency_spike = self.frequency_z_score(trade_count);

        let duration = bar.duration_secs();
        vector.bid_ask_refresh_rate = if trade_count > 0 && duration > 0 {
            trade_count as f64 / duration as f64
        } else {
            0.0
        };

        vector.iceberg_flag = detect_iceberg(bar);
    }

    /// Current cumulative volume delta
    pub fn cvd(&self) -> f64 {
        self.cvd
    }

    /// OLS slope of CVD against sample index over the last window
    fn cvd_slope(&self) -> f64 {
        if self.cvd_history.len() < 2 {
            return 0.0;
        }
        let start = self.cvd_history.len().saturating_sub(SLOPE_WINDOW);
        let recent: Vec<f64> = self.cvd_history.iter().skip(start).copied().collect();

        let n = recent.len();
        let x_mean = (n - 1) as f64 / 2.0;
        let y_mean = recent.iter().sum::<f64>() / n as f64;

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for (i, y) in recent.iter().enumerate() {
            let dx = i as f64 - x_mean;
            numerator += dx * (y - y_mean);
            denominator += dx * dx;
        }

        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    }

    /// High trade count with little directional progress
    fn detect_absorption(
        &self,
        total_volume: f64,
        range: f64,
        price_change: f64,
        trade_count: usize,
    ) -> bool {
        if total_volume <= 0.0 || range <= 0.0 {
            return false;
        }
        if self.trade_count_history.len() < FREQUENCY_WINDOW {
            return false;
        }
        let avg = self.recent_count_mean();
        trade_count as f64 > avg * 2.0 && (price_change.abs() / range) < 0.3
    }

    /// Three consecutive same-signed deltas with strictly shrinking magnitude
    fn detect_exhaustion(&self) -> bool {
        if self.delta_history.len() < 3 {
            return false;
        }
        let n = self.delta_history.len();
        let d1 = self.delta_history[n - 3];
        let d2 = self.delta_history[n - 2];
        let d3 = self.delta_history[n - 1];

        let same_sign = (d1 > 0.0 && d2 > 0.0 && d3 > 0.0) || (d1 < 0.0 && d2 < 0.0 && d3 < 0.0);
        same_sign && d3.abs() < d2.abs() && d2.abs() < d1.abs()
    }

    /// Trade-count z-score over the frequency window; zero below the window
    /// size or with zero variance
    fn frequency_z_score(&self, trade_count: usize) -> f64 {
        if self.trade_count_history.len() < FREQUENCY_WINDOW {
            return 0.0;
        }
        let counts: Vec<f64> = self
            .trade_count_history
            .iter()
            .skip(self.trade_count_history.len() - FREQUENCY_WINDOW)
            .map(|c| *c as f64)
            .collect();

        let mean = counts.iter().sum::<f64>() / counts.len() as f64;
        let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>()
            / (counts.len() - 1) as f64;
        let stdev = variance.sqrt();

        if stdev > 0.0 {
            (trade_count as f64 - mean) / stdev
        } else {
            0.0
        }
    }

    fn recent_count_mean(&self) -> f64 {
        let start = self.trade_count_history.len().saturating_sub(FREQUENCY_WINDOW);
        let window: Vec<usize> = self.trade_count_history.iter().skip(start).copied().collect();
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<usize>() as f64 / window.len() as f64
    }
}

/// Many prints at one identical price inside the bar
fn detect_iceberg(bar: &Bar) -> bool {
    if bar.trades.len() < ICEBERG_MIN_PRINTS {
        return false;
    }
    let mut counts: HashMap<Decimal, usize> = HashMap::new();
    for trade in &bar.trades {
        *counts.entry(trade.price).or_insert(0) += 1;
    }
    counts.values().any(|c| *c >= ICEBERG_MIN_PRINTS)
}

fn push_bounded<T>(deque: &mut VecDeque<T>, value: T, cap: usize) {
    deque.push_back(value);
    while deque.len() > cap {
        deque.pop_front();
    }
}
