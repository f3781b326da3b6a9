//! Wick detection on finalized bars

use crate::aggregate::Bar;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bodies below this are treated as dojis
const BODY_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 8); // 1e-8

/// Which extremity of the bar was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WickSide {
    Upper,
    Lower,
}

impl WickSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            WickSide::Upper => "upper",
            WickSide::Lower => "lower",
        }
    }
}

/// A qualifying price rejection on one side of a bar
///
/// Ephemeral: triggers the feature/score/persist sequence synchronously and
/// is never retained on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct WickOccurrence {
    pub side: WickSide,
    pub high: Decimal,
    pub low: Decimal,
}

/// Classify a finalized bar's extremities against a wick:body ratio
///
/// A side qualifies when wick/body >= `min_ratio`. Doji bars (body below
/// epsilon) qualify on any side with a non-zero wick. Zero-range bars
/// produce no detections.
pub fn detect(bar: &Bar, min_ratio: Decimal) -> Vec<WickOccurrence> {
    let mut occurrences = Vec::new();

    if bar.range() <= Decimal::ZERO {
        return occurrences;
    }

    let body_top = bar.open.max(bar.close);
    let body_bottom = bar.open.min(bar.close);
    let body = body_top - body_bottom;

    let wick_upper = bar.high - body_top;
    let wick_lower = body_bottom - bar.low;

    if qualifies(wick_upper, body, min_ratio) {
        occurrences.push(WickOccurrence {
            side: WickSide::Upper,
            high: bar.high,
            low: bar.low,
        });
    }
    if qualifies(wick_lower, body, min_ratio) {
        occurrences.push(WickOccurrence {
            side: WickSide::Lower,
            high: bar.high,
            low: bar.low,
        });
    }

    occurrences
}

fn qualifies(wick: Decimal, body: Decimal, min_ratio: Decimal) -> bool {
    if wick <= Decimal::ZERO {
        return false;
    }
    if body <= BODY_EPSILON {
        // Doji fallback: any non-zero wick is significant
        return true;
    }
    wick / body >= min_ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Side, Trade};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn bar(open: Decimal, high: Decimal, low: Decimal, close: Decimal) -> Bar {
        Bar {
            start_ts: Utc.timestamp_opt(0, 0).unwrap(),
            end_ts: Utc.timestamp_opt(60, 0).unwrap(),
            symbol: "BTC-USDT".to_string(),
            open,
            high,
            low,
            close,
            volume: dec!(10),
            buy_volume: dec!(5),
            sell_volume: dec!(5),
            trades: Vec::<Trade>::new(),
        }
    }

    #[test]
    fn test_ratio_boundary() {
        // Body = 4, upper wick = 6 => ratio 1.5: detected at min_ratio 1.5,
        // not detected at 2.0
        let b = bar(dec!(100), dec!(110), dec!(100), dec!(104));

        let hits = detect(&b, dec!(1.5));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].side, WickSide::Upper);
        assert_eq!(hits[0].high, dec!(110));
        assert_eq!(hits[0].low, dec!(100));

        assert!(detect(&b, dec!(2.0)).is_empty());
    }

    #[test]
    fn test_lower_wick_detection() {
        // Body = 2 (100->102), lower wick = 10 (low 90)
        let b = bar(dec!(100), dec!(102), dec!(90), dec!(102));
        let hits = detect(&b, dec!(2.0));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].side, WickSide::Lower);
    }

    #[test]
    fn test_both_sides_qualify() {
        // Doji-ish body with wicks both ways
        let b = bar(dec!(100), dec!(106), dec!(94), dec!(101));
        let hits = detect(&b, dec!(3.0));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].side, WickSide::Upper);
        assert_eq!(hits[1].side, WickSide::Lower);
    }

    #[test]
    fn test_doji_fallback() {
        // Zero body: any non-zero wick qualifies regardless of ratio
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(100));
        let hits = detect(&b, dec!(1000));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_zero_range_bar_yields_nothing() {
        let b = bar(dec!(100), dec!(100), dec!(100), dec!(100));
        assert!(detect(&b, dec!(0.05)).is_empty());
    }

    #[test]
    fn test_no_wick_no_detection() {
        // Full-body bar, no wicks at all
        let b = bar(dec!(100), dec!(110), dec!(100), dec!(110));
        assert!(detect(&b, dec!(0.05)).is_empty());
    }
}
