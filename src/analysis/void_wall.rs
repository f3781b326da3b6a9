//! Void band and stacked wall detection
//!
//! The region outward from mid-price is partitioned into equal-width
//! basis-point bands per direction. Band notionals and level notionals feed
//! per-symbol rolling histories; the thresholds are percentiles of those
//! histories, so the detector auto-scales across instruments of very
//! different notional magnitude. Until a symbol has enough samples a fixed
//! bootstrap threshold applies.

use crate::book::OrderBookSnapshot;
use crate::config::MicroConfig;
use crate::features;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

/// Bootstrap thresholds used below this many calibration samples
const MIN_CALIBRATION_SAMPLES: usize = 10;
/// Default void threshold in quote notional
const DEFAULT_VOID_THRESHOLD: f64 = 50_000.0;
/// Default wall threshold in quote notional
const DEFAULT_STACK_THRESHOLD: f64 = 500_000.0;
/// Bands separated by up to this many band-widths merge
const MERGE_GAP_FACTOR: f64 = 1.5;

/// Which side of mid-price a void band sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VoidDirection {
    Above,
    Below,
}

/// Side of the book a wall rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WallSide {
    Bid,
    Ask,
}

/// A contiguous price region with abnormally low resting depth
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoidBand {
    pub start_price: f64,
    pub end_price: f64,
    pub width_bps: f64,
    pub cum_depth: f64,
    pub direction: VoidDirection,
}

/// A resting level with abnormally high notional
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StackedWall {
    pub price: f64,
    pub size: f64,
    pub notional: f64,
    pub distance_bps: f64,
    pub side: WallSide,
}

/// Result of one full analysis call
#[derive(Debug, Clone, Default, Serialize)]
pub struct MicroReport {
    pub voids_above: Vec<VoidBand>,
    pub voids_below: Vec<VoidBand>,
    pub bid_walls: Vec<StackedWall>,
    pub ask_walls: Vec<StackedWall>,
    pub has_void: bool,
    pub has_stack: bool,
}

/// Detects void bands and stacked walls from order-book snapshots
pub struct VoidWallDetector {
    config: MicroConfig,
    /// Rolling band-notional history per symbol
    depth_history: HashMap<String, VecDeque<f64>>,
    /// Rolling level-notional history per symbol
    wall_history: HashMap<String, VecDeque<f64>>,
}

impl VoidWallDetector {
    pub fn new(config: MicroConfig) -> Self {
        Self {
            config,
            depth_history: HashMap::new(),
            wall_history: HashMap::new(),
        }
    }

    /// Full analysis: voids plus walls, nearest-first per direction
    pub fn analyze(&mut self, book: &OrderBookSnapshot) -> MicroReport {
        let ref_price = features::dec_f64(book.mid_price());
        if ref_price <= 0.0 {
            return MicroReport::default();
        }

        let voids = self.detect_void_bands(book);
        let (bid_walls, ask_walls) = self.detect_stacked_walls(book);

        let (voids_above, voids_below): (Vec<VoidBand>, Vec<VoidBand>) = voids
            .into_iter()
            .partition(|v| v.direction == VoidDirection::Above);

        let has_void = !voids_above.is_empty() || !voids_below.is_empty();
        let has_stack = !bid_walls.is_empty() || !ask_walls.is_empty();

        MicroReport {
            voids_above,
            voids_below,
            bid_walls,
            ask_walls,
            has_void,
            has_stack,
        }
    }

    /// Detect void bands in both directions, ordered by distance from mid
    pub fn detect_void_bands(&mut self, book: &OrderBookSnapshot) -> Vec<VoidBand> {
        let ref_price = features::dec_f64(book.mid_price());
        if ref_price <= 0.0 {
            return Vec::new();
        }

        // Threshold is computed before this call's bands feed the history
        let threshold = self.void_threshold(&book.symbol);

        let asks = to_f64_levels(&book.asks);
        let bids = to_f64_levels(&book.bids);

        let mut voids =
            self.scan_for_voids(&book.symbol, &asks, ref_price, threshold, VoidDirection::Above);
        voids.extend(self.scan_for_voids(
            &book.symbol,
            &bids,
            ref_price,
            threshold,
            VoidDirection::Below,
        ));
        voids
    }

    /// Detect stacked walls on both sides, top-N by notional
    pub fn detect_stacked_walls(
        &mut self,
        book: &OrderBookSnapshot,
    ) -> (Vec<StackedWall>, Vec<StackedWall>) {
        let ref_price = features::dec_f64(book.mid_price());
        if ref_price <= 0.0 {
            return (Vec::new(), Vec::new());
        }

        let threshold = self.stack_threshold(&book.symbol);

        let bid_walls = self.scan_for_walls(
            &book.symbol,
            &to_f64_levels(&book.bids),
            ref_price,
            threshold,
            WallSide::Bid,
        );
        let ask_walls = self.scan_for_walls(
            &book.symbol,
            &to_f64_levels(&book.asks),
            ref_price,
            threshold,
            WallSide::Ask,
        );

        (bid_walls, ask_walls)
    }

    /// Drop the calibration history for one symbol
    pub fn reset_symbol(&mut self, symbol: &str) {
        self.depth_history.remove(symbol);
        self.wall_history.remove(symbol);
    }

    fn void_threshold(&self, symbol: &str) -> f64 {
        match self.depth_history.get(symbol) {
            Some(history) if history.len() >= MIN_CALIBRATION_SAMPLES => {
                percentile(history, self.config.void_percentile)
            }
            _ => DEFAULT_VOID_THRESHOLD,
        }
    }

    fn stack_threshold(&self, symbol: &str) -> f64 {
        match self.wall_history.get(symbol) {
            Some(history) if history.len() >= MIN_CALIBRATION_SAMPLES => {
                percentile(history, self.config.stack_percentile)
            }
            _ => DEFAULT_STACK_THRESHOLD,
        }
    }

    fn scan_for_voids(
        &mut self,
        symbol: &str,
        levels: &[(f64, f64)],
        ref_price: f64,
        threshold: f64,
        direction: VoidDirection,
    ) -> Vec<VoidBand> {
        if levels.is_empty() {
            return Vec::new();
        }

        let width = self.config.band_width_bps;
        let mut sub_threshold = Vec::new();

        for i in 0..self.config.max_bands {
            let (band_start, band_end) = match direction {
                VoidDirection::Above => (
                    bps_to_price(i as f64 * width, ref_price),
                    bps_to_price((i + 1) as f64 * width, ref_price),
                ),
                VoidDirection::Below => (
                    bps_to_price(-(i as f64) * width, ref_price),
                    bps_to_price(-((i + 1) as f64) * width, ref_price),
                ),
            };

            let depth = band_depth(levels, band_start, band_end);

            // Every observed band feeds the symbol's calibration history
            push_bounded(
                self.depth_history.entry(symbol.to_string()).or_default(),
                depth,
                self.config.history_size,
            );

            if depth < threshold {
                sub_threshold.push((band_start, band_end, depth));
            }
        }

        merge_adjacent_bands(sub_threshold, ref_price, width, direction)
    }

    fn scan_for_walls(
        &mut self,
        symbol: &str,
        levels: &[(f64, f64)],
        ref_price: f64,
        threshold: f64,
        side: WallSide,
    ) -> Vec<StackedWall> {
        let mut walls = Vec::new();

        for (price, size) in levels {
            let notional = price * size;
            push_bounded(
                self.wall_history.entry(symbol.to_string()).or_default(),
                notional,
                self.config.history_size,
            );

            if notional >= threshold {
                walls.push(StackedWall {
                    price: *price,
                    size: *size,
                    notional,
                    distance_bps: price_to_bps(*price, ref_price),
                    side,
                });
            }
        }

        walls.sort_by(|a, b| b.notional.total_cmp(&a.notional));
        walls.truncate(self.config.top_n_walls);
        walls
    }
}

/// Merge sub-threshold bands separated by at most 1.5 band-widths
///
/// Bands are walked nearest-first (ascending start for "above", descending
/// for "below"); merging sums depth and widens the bounds, so the union of
/// merged ranges equals the union of the constituent bands and no two
/// outputs overlap.
fn merge_adjacent_bands(
    bands: Vec<(f64, f64, f64)>,
    ref_price: f64,
    band_width_bps: f64,
    direction: VoidDirection,
) -> Vec<VoidBand> {
    if bands.is_empty() {
        return Vec::new();
    }

    let mut sorted = bands;
    match direction {
        VoidDirection::Above => sorted.sort_by(|a, b| a.0.total_cmp(&b.0)),
        VoidDirection::Below => sorted.sort_by(|a, b| b.0.total_cmp(&a.0)),
    }

    let merge_gap =
        (bps_to_price(band_width_bps * MERGE_GAP_FACTOR, ref_price) - ref_price).abs();

    let mut merged = Vec::new();
    let (mut current_start, mut current_end, mut current_depth) = sorted[0];

    for (band_start, band_end, depth) in sorted.into_iter().skip(1) {
        let gap = (band_start - current_end).abs();
        if gap <= merge_gap {
            current_end = band_end;
            current_depth += depth;
        } else {
            merged.push(make_band(
                current_start,
                current_end,
                current_depth,
                ref_price,
                direction,
            ));
            current_start = band_start;
            current_end = band_end;
            current_depth = depth;
        }
    }
    merged.push(make_band(
        current_start,
        current_end,
        current_depth,
        ref_price,
        direction,
    ));

    merged
}

fn make_band(
    start: f64,
    end: f64,
    depth: f64,
    ref_price: f64,
    direction: VoidDirection,
) -> VoidBand {
    let width_bps = (price_to_bps(end, ref_price) - price_to_bps(start, ref_price)).abs();
    VoidBand {
        start_price: start.min(end),
        end_price: start.max(end),
        width_bps,
        cum_depth: depth,
        direction,
    }
}

/// Total resting notional inside a price band (bounds inclusive)
fn band_depth(levels: &[(f64, f64)], band_start: f64, band_end: f64) -> f64 {
    let lo = band_start.min(band_end);
    let hi = band_start.max(band_end);
    levels
        .iter()
        .filter(|(price, _)| *price >= lo && *price <= hi)
        .map(|(price, size)| price * size)
        .sum()
}

/// Signed distance from the reference price in basis points
fn price_to_bps(price: f64, ref_price: f64) -> f64 {
    if ref_price == 0.0 {
        return 0.0;
    }
    (price - ref_price) / ref_price * 10_000.0
}

/// Price at a signed basis-point offset from the reference
fn bps_to_price(bps: f64, ref_price: f64) -> f64 {
    ref_price * (1.0 + bps / 10_000.0)
}

/// Linear-interpolation percentile over an unsorted history
fn percentile(values: &VecDeque<f64>, p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(f64::total_cmp);

    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = rank - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

fn push_bounded(deque: &mut VecDeque<f64>, value: f64, cap: usize) {
    deque.push_back(value);
    while deque.len() > cap {
        deque.pop_front();
    }
}

fn to_f64_levels(levels: &[crate::book::BookLevel]) -> Vec<(f64, f64)> {
    levels
        .iter()
        .map(|l| (features::dec_f64(l.price), features::dec_f64(l.size)))
        .collect()
}
