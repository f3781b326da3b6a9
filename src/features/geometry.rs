//! Wick geometry features (stateless)

use super::dec_f64;
use super::vector::FeatureVector;
use crate::aggregate::Bar;
use crate::wick::WickSide;

/// Body sizes below this count as dojis
const BODY_EPSILON: f64 = 1e-8;
/// Volumes below this trigger the zero-print flag
const ZERO_PRINT_VOLUME: f64 = 0.001;

/// Fill the geometry block of the feature vector for one wick
pub fn apply(vector: &mut FeatureVector, bar: &Bar, side: WickSide) {
    let high = dec_f64(bar.high);
    let low = dec_f64(bar.low);
    let open = dec_f64(bar.open);
    let close = dec_f64(bar.close);

    let range = high - low;
    if range <= 0.0 {
        return;
    }

    let body_top = open.max(close);
    let body_bottom = open.min(close);
    let body = body_top - body_bottom;

    let wick = match side {
        WickSide::Upper => high - body_top,
        WickSide::Lower => body_bottom - low,
    };

    let wick_pct = wick / range;
    let body_pct = body / range;

    let ratio = if body > BODY_EPSILON {
        wick / body
    } else if wick > 0.0 {
        // Doji: treat the wick as highly significant
        wick * 100.0
    } else {
        0.0
    };

    vector.wick_size_pct = wick_pct;
    vector.body_size_pct = body_pct;
    vector.wick_to_body_ratio = ratio;
    vector.protrusion_pct = wick_pct;

    let duration = bar.duration_secs();
    vector.rejection_velocity = if duration > 0 {
        wick / duration as f64
    } else {
        0.0
    };

    vector.displacement_idx = wick_pct * ratio;

    let buy_vol = dec_f64(bar.buy_volume);
    let sell_vol = dec_f64(bar.sell_volume);
    let total_vol = buy_vol + sell_vol;

    // Trap score: directional volume share at the rejected extreme, scaled
    // by the wick ratio
    vector.imbalance_trap_score = if total_vol > 0.0 {
        let imbalance = match side {
            WickSide::Upper => buy_vol / total_vol,
            WickSide::Lower => sell_vol / total_vol,
        };
        (imbalance * 100.0 * ratio).min(100.0)
    } else {
        0.0
    };

    vector.finished_auction = ratio >= 2.0 && total_vol > 0.0 && wick_pct >= 0.3;
    vector.unfinished_business = (1.0..2.0).contains(&ratio) && wick_pct >= 0.2;
    vector.zero_print_flag = total_vol < ZERO_PRINT_VOLUME && wick_pct > 0.1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn bar(
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        buy_vol: Decimal,
        sell_vol: Decimal,
    ) -> Bar {
        Bar {
            start_ts: Utc.timestamp_opt(0, 0).unwrap(),
            end_ts: Utc.timestamp_opt(60, 0).unwrap(),
            symbol: "BTC-USDT".to_string(),
            open,
            high,
            low,
            close,
            volume: buy_vol + sell_vol,
            buy_volume: buy_vol,
            sell_volume: sell_vol,
            trades: Vec::new(),
        }
    }

    #[test]
    fn test_upper_wick_fractions() {
        // Range 10, body 2 (100->102), upper wick 8
        let b = bar(dec!(100), dec!(110), dec!(100), dec!(102), dec!(5), dec!(5));
        let mut v = FeatureVector::default();
        apply(&mut v, &b, WickSide::Upper);

        assert!((v.wick_size_pct - 0.8).abs() < 1e-9);
        assert!((v.body_size_pct - 0.2).abs() < 1e-9);
        assert!((v.wick_to_body_ratio - 4.0).abs() < 1e-9);
        // 8 price units over 60 seconds
        assert!((v.rejection_velocity - 8.0 / 60.0).abs() < 1e-9);
        assert!((v.displacement_idx - 0.8 * 4.0).abs() < 1e-9);
        assert!(v.finished_auction);
        assert!(!v.unfinished_business);
    }

    #[test]
    fn test_unfinished_business_band() {
        // Body 4 (100->104), upper wick 6: ratio 1.5, wick_pct 0.6
        let b = bar(dec!(100), dec!(110), dec!(100), dec!(104), dec!(5), dec!(5));
        let mut v = FeatureVector::default();
        apply(&mut v, &b, WickSide::Upper);

        assert!((v.wick_to_body_ratio - 1.5).abs() < 1e-9);
        assert!(v.unfinished_business);
        assert!(!v.finished_auction);
    }

    #[test]
    fn test_zero_range_stays_neutral() {
        let b = bar(dec!(100), dec!(100), dec!(100), dec!(100), dec!(1), dec!(1));
        let mut v = FeatureVector::default();
        apply(&mut v, &b, WickSide::Upper);
        assert_eq!(v, FeatureVector::default());
    }

    #[test]
    fn test_doji_ratio_scaling() {
        // Zero body, lower wick of 5
        let b = bar(dec!(100), dec!(101), dec!(95), dec!(100), dec!(2), dec!(2));
        let mut v = FeatureVector::default();
        apply(&mut v, &b, WickSide::Lower);
        assert!((v.wick_to_body_ratio - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_print_flag() {
        let b = bar(
            dec!(100),
            dec!(110),
            dec!(100),
            dec!(102),
            dec!(0.0001),
            dec!(0.0002),
        );
        let mut v = FeatureVector::default();
        apply(&mut v, &b, WickSide::Upper);
        assert!(v.zero_print_flag);
    }

    #[test]
    fn test_trap_score_is_capped() {
        // Heavily buy-dominant upper wick with a huge ratio
        let b = bar(
            dec!(100),
            dec!(120),
            dec!(100),
            dec!(100.5),
            dec!(9),
            dec!(1),
        );
        let mut v = FeatureVector::default();
        apply(&mut v, &b, WickSide::Upper);
        assert_eq!(v.imbalance_trap_score, 100.0);
    }
}
