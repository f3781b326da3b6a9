//! Event scoring
//!
//! Reduces a feature vector and wick side to a bounded magnet score and
//! confidence, each built from an additive, itemized breakdown of named
//! rules. A rule whose input is missing or zero contributes exactly zero
//! points; totals clip to [0, 100].

use crate::features::FeatureVector;
use crate::wick::WickSide;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Depth imbalance magnitude that counts as meaningful
const IMBALANCE_THRESHOLD: f64 = 0.3;

/// Scored event output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// Bounded heuristic score for the wick price being revisited
    pub magnet_score: f64,
    /// How much supporting evidence was actually available
    pub confidence: f64,
    /// Named magnet-score components
    pub breakdown: BTreeMap<String, f64>,
    /// Named confidence components
    pub confidence_breakdown: BTreeMap<String, f64>,
}

/// Additive rule-based wick scorer
#[derive(Debug, Clone, Default)]
pub struct WickScorer;

impl WickScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one wick event
    pub fn score(&self, features: &FeatureVector, side: WickSide) -> ScoreResult {
        let mut breakdown = BTreeMap::new();

        breakdown.insert("ratio_tier".to_string(), ratio_tier(features));
        breakdown.insert("vwap_extremity".to_string(), vwap_extremity(features));
        breakdown.insert("liquidity_depth".to_string(), liquidity_depth(features));
        breakdown.insert(
            "depth_imbalance".to_string(),
            depth_imbalance(features, side),
        );
        breakdown.insert(
            "rejection_velocity".to_string(),
            rejection_velocity(features),
        );
        breakdown.insert(
            "void_flag".to_string(),
            if features.liquidity_void_flag { 10.0 } else { 0.0 },
        );
        breakdown.insert(
            "stacked_flag".to_string(),
            if features.stacked_imbalance_nearby {
                5.0
            } else {
                0.0
            },
        );
        breakdown.insert("oi_conviction".to_string(), oi_conviction(features));
        breakdown.insert("delta_magnitude".to_string(), delta_magnitude(features));

        let magnet_score = breakdown.values().sum::<f64>().clamp(0.0, 100.0);

        let mut confidence_breakdown = BTreeMap::new();
        confidence_breakdown.insert("book_present".to_string(), book_present(features));
        confidence_breakdown.insert(
            "derivatives_present".to_string(),
            derivatives_present(features),
        );
        confidence_breakdown.insert("vwap_established".to_string(), vwap_established(features));
        confidence_breakdown.insert(
            "orderflow_history".to_string(),
            orderflow_history(features),
        );

        let confidence = confidence_breakdown.values().sum::<f64>().clamp(0.0, 100.0);

        ScoreResult {
            magnet_score,
            confidence,
            breakdown,
            confidence_breakdown,
        }
    }
}

/// Wick:body ratio tier
fn ratio_tier(f: &FeatureVector) -> f64 {
    let r = f.wick_to_body_ratio;
    if r >= 3.0 {
        25.0
    } else if r >= 2.0 {
        18.0
    } else if r >= 1.5 {
        10.0
    } else {
        0.0
    }
}

/// VWAP band extremity tier
fn vwap_extremity(f: &FeatureVector) -> f64 {
    if f.vwap_band_flag_2sd {
        20.0
    } else if f.vwap_band_flag_1sd {
        10.0
    } else {
        0.0
    }
}

/// Resting depth visible on both sides
fn liquidity_depth(f: &FeatureVector) -> f64 {
    if f.l5_depth_bid > 0.0 && f.l5_depth_ask > 0.0 {
        5.0
    } else {
        0.0
    }
}

/// Depth imbalance aligned with the rejected side
fn depth_imbalance(f: &FeatureVector, side: WickSide) -> f64 {
    if f.depth_imbalance.abs() < IMBALANCE_THRESHOLD {
        return 0.0;
    }
    let aligned = match side {
        // Lower wick: bid-heavy books support the level
        WickSide::Lower => f.depth_imbalance > 0.0,
        // Upper wick: ask-heavy books cap the level
        WickSide::Upper => f.depth_imbalance < 0.0,
    };
    if aligned {
        10.0
    } else {
        0.0
    }
}

/// Velocity of the rejection, scaled by the displacement index
fn rejection_velocity(f: &FeatureVector) -> f64 {
    if f.rejection_velocity <= 0.0 {
        return 0.0;
    }
    (f.displacement_idx * 20.0).min(10.0)
}

/// Open-interest conviction tier
fn oi_conviction(f: &FeatureVector) -> f64 {
    let change = f.oi_change_pct.abs();
    if change >= 0.02 {
        10.0
    } else if change >= 0.005 {
        5.0
    } else {
        0.0
    }
}

/// Delta magnitude relative to the previous pivot's delta
fn delta_magnitude(f: &FeatureVector) -> f64 {
    let delta = f.delta_at_wick.abs();
    let prev = f.delta_prev_pivot.abs();
    if delta <= 0.0 || prev <= 0.0 {
        // No basis for comparison yet
        return 0.0;
    }
    if delta > prev * 2.0 {
        10.0
    } else if delta > prev {
        5.0
    } else {
        0.0
    }
}

fn book_present(f: &FeatureVector) -> f64 {
    if f.l1_depth_bid > 0.0 || f.l1_depth_ask > 0.0 || f.spread > 0.0 {
        25.0
    } else {
        0.0
    }
}

fn derivatives_present(f: &FeatureVector) -> f64 {
    if f.funding_rate_now != 0.0 || f.oi_change_pct != 0.0 || f.liquidation_density > 0.0 {
        25.0
    } else {
        0.0
    }
}

fn vwap_established(f: &FeatureVector) -> f64 {
    if f.vwap_mean_reversion_score != 0.0 || f.global_vwap_distance != 0.0 {
        25.0
    } else {
        0.0
    }
}

fn orderflow_history(f: &FeatureVector) -> f64 {
    if f.cvd_slope_10 != 0.0 || f.trade_frequency_spike != 0.0 || f.delta_prev_pivot != 0.0 {
        25.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maxed_vector() -> FeatureVector {
        FeatureVector {
            wick_to_body_ratio: 4.0,
            wick_size_pct: 0.8,
            displacement_idx: 3.2,
            rejection_velocity: 0.5,
            vwap_band_flag_1sd: true,
            vwap_band_flag_2sd: true,
            vwap_mean_reversion_score: -90.0,
            global_vwap_distance: 0.02,
            l5_depth_bid: 100.0,
            l5_depth_ask: 10.0,
            l1_depth_bid: 20.0,
            l1_depth_ask: 2.0,
            spread: 0.5,
            depth_imbalance: 0.82,
            liquidity_void_flag: true,
            stacked_imbalance_nearby: true,
            oi_change_pct: 0.05,
            funding_rate_now: 0.0003,
            delta_at_wick: -50.0,
            delta_prev_pivot: 10.0,
            cvd_slope_10: 4.2,
            trade_frequency_spike: 2.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_all_neutral_scores_zero() {
        let scorer = WickScorer::new();
        let result = scorer.score(&FeatureVector::default(), WickSide::Upper);

        assert_eq!(result.magnet_score, 0.0);
        assert_eq!(result.confidence, 0.0);
        assert!(result.breakdown.values().all(|p| *p == 0.0));
        assert!(result.confidence_breakdown.values().all(|p| *p == 0.0));
    }

    #[test]
    fn test_scores_stay_bounded() {
        let scorer = WickScorer::new();
        let result = scorer.score(&maxed_vector(), WickSide::Lower);

        assert!(result.magnet_score >= 0.0 && result.magnet_score <= 100.0);
        assert!(result.confidence >= 0.0 && result.confidence <= 100.0);
        // This vector trips enough rules that both clip at the top
        assert_eq!(result.magnet_score, 100.0);
        assert_eq!(result.confidence, 100.0);
    }

    #[test]
    fn test_ratio_tiers() {
        let scorer = WickScorer::new();
        let mut v = FeatureVector::default();

        v.wick_to_body_ratio = 1.4;
        assert_eq!(scorer.score(&v, WickSide::Upper).breakdown["ratio_tier"], 0.0);

        v.wick_to_body_ratio = 1.5;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["ratio_tier"],
            10.0
        );

        v.wick_to_body_ratio = 2.5;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["ratio_tier"],
            18.0
        );

        v.wick_to_body_ratio = 3.0;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["ratio_tier"],
            25.0
        );
    }

    #[test]
    fn test_depth_imbalance_alignment() {
        let scorer = WickScorer::new();
        let mut v = FeatureVector::default();
        v.depth_imbalance = 0.5; // bid heavy

        // Supports a lower wick, not an upper one
        assert_eq!(
            scorer.score(&v, WickSide::Lower).breakdown["depth_imbalance"],
            10.0
        );
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["depth_imbalance"],
            0.0
        );

        v.depth_imbalance = -0.5; // ask heavy
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["depth_imbalance"],
            10.0
        );

        // Below the threshold nothing fires
        v.depth_imbalance = 0.2;
        assert_eq!(
            scorer.score(&v, WickSide::Lower).breakdown["depth_imbalance"],
            0.0
        );
    }

    #[test]
    fn test_vwap_extremity_tiers() {
        let scorer = WickScorer::new();
        let mut v = FeatureVector::default();

        v.vwap_band_flag_1sd = true;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["vwap_extremity"],
            10.0
        );

        v.vwap_band_flag_2sd = true;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["vwap_extremity"],
            20.0
        );
    }

    #[test]
    fn test_delta_magnitude_needs_prior_pivot() {
        let scorer = WickScorer::new();
        let mut v = FeatureVector::default();

        // Large delta with no prior pivot contributes nothing
        v.delta_at_wick = 500.0;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["delta_magnitude"],
            0.0
        );

        v.delta_prev_pivot = 100.0;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["delta_magnitude"],
            10.0
        );

        v.delta_at_wick = 150.0;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["delta_magnitude"],
            5.0
        );
    }

    #[test]
    fn test_oi_conviction_tiers() {
        let scorer = WickScorer::new();
        let mut v = FeatureVector::default();

        v.oi_change_pct = -0.03;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["oi_conviction"],
            10.0
        );

        v.oi_change_pct = 0.01;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["oi_conviction"],
            5.0
        );

        v.oi_change_pct = 0.001;
        assert_eq!(
            scorer.score(&v, WickSide::Upper).breakdown["oi_conviction"],
            0.0
        );
    }

    #[test]
    fn test_confidence_components_fire_independently() {
        let scorer = WickScorer::new();
        let mut v = FeatureVector::default();
        v.spread = 0.5;

        let result = scorer.score(&v, WickSide::Upper);
        assert_eq!(result.confidence, 25.0);
        assert_eq!(result.confidence_breakdown["book_present"], 25.0);
        assert_eq!(result.confidence_breakdown["derivatives_present"], 0.0);
    }

    #[test]
    fn test_score_serializes_with_breakdown() {
        let scorer = WickScorer::new();
        let result = scorer.score(&maxed_vector(), WickSide::Lower);

        let raw = serde_json::to_string(&result).unwrap();
        let back: ScoreResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(back, result);
        assert!(raw.contains("ratio_tier"));
    }
}
