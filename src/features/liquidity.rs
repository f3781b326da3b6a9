//! Liquidity features from the latest order-book snapshot

use super::dec_f64;
use super::vector::FeatureVector;
use crate::book::OrderBookSnapshot;

/// Depth levels summed for the L5 figures
const DEPTH_LEVELS: usize = 5;
/// A gap this many times the smallest gap flags a void
const VOID_GAP_FACTOR: f64 = 5.0;
/// One side holding this multiple of the other flags a stacked imbalance
const STACK_RATIO: f64 = 3.0;

/// Fill the liquidity block; a missing snapshot leaves everything neutral
pub fn apply(vector: &mut FeatureVector, book: Option<&OrderBookSnapshot>) {
    let Some(book) = book else {
        return;
    };

    let bids: Vec<(f64, f64)> = book
        .bids
        .iter()
        .map(|l| (dec_f64(l.price), dec_f64(l.size)))
        .collect();
    let asks: Vec<(f64, f64)> = book
        .asks
        .iter()
        .map(|l| (dec_f64(l.price), dec_f64(l.size)))
        .collect();

    if let (Some(bid), Some(ask)) = (bids.first(), asks.first()) {
        vector.spread = ask.0 - bid.0;
        vector.l1_depth_bid = bid.1;
        vector.l1_depth_ask = ask.1;
    }

    let l5_bid: f64 = bids.iter().take(DEPTH_LEVELS).map(|(_, s)| s).sum();
    let l5_ask: f64 = asks.iter().take(DEPTH_LEVELS).map(|(_, s)| s).sum();
    vector.l5_depth_bid = l5_bid;
    vector.l5_depth_ask = l5_ask;

    let total = l5_bid + l5_ask;
    vector.depth_imbalance = if total > 0.0 {
        (l5_bid - l5_ask) / total
    } else {
        0.0
    };

    vector.liquidity_void_flag = detect_void(&bids, &asks);
    vector.stacked_imbalance_nearby = detect_stacked_imbalance(l5_bid, l5_ask);
}

/// Void when the largest inter-level gap dwarfs the smallest
///
/// Requires at least two positive gaps across both sides.
fn detect_void(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> bool {
    let mut gaps = Vec::new();

    // Bids are sorted descending by price
    for pair in bids.windows(2) {
        let gap = pair[0].0 - pair[1].0;
        if gap > 0.0 {
            gaps.push(gap);
        }
    }
    // Asks are sorted ascending by price
    for pair in asks.windows(2) {
        let gap = pair[1].0 - pair[0].0;
        if gap > 0.0 {
            gaps.push(gap);
        }
    }

    if gaps.len() < 2 {
        return false;
    }

    let min_gap = gaps.iter().cloned().fold(f64::INFINITY, f64::min);
    let max_gap = gaps.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

    min_gap > 0.0 && max_gap >= VOID_GAP_FACTOR * min_gap
}

/// One side holding several times the other side's depth
fn detect_stacked_imbalance(bid_depth: f64, ask_depth: f64) -> bool {
    if bid_depth <= 0.0 && ask_depth <= 0.0 {
        return false;
    }
    if bid_depth <= 0.0 {
        return ask_depth > 0.0;
    }
    if ask_depth <= 0.0 {
        return bid_depth > 0.0;
    }

    let ratio = (bid_depth / ask_depth).max(ask_depth / bid_depth);
    ratio >= STACK_RATIO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::BookLevel;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn level(price: Decimal, size: Decimal) -> BookLevel {
        BookLevel { price, size }
    }

    fn snapshot(bids: Vec<BookLevel>, asks: Vec<BookLevel>) -> OrderBookSnapshot {
        OrderBookSnapshot {
            ts: Utc::now(),
            symbol: "BTC-USDT".to_string(),
            best_bid: bids.first().map(|l| l.price).unwrap_or_default(),
            best_ask: asks.first().map(|l| l.price).unwrap_or_default(),
            bids,
            asks,
        }
    }

    #[test]
    fn test_missing_book_stays_neutral() {
        let mut v = FeatureVector::default();
        apply(&mut v, None);
        assert_eq!(v, FeatureVector::default());
    }

    #[test]
    fn test_spread_and_depth() {
        let book = snapshot(
            vec![level(dec!(100), dec!(2)), level(dec!(99), dec!(3))],
            vec![level(dec!(101), dec!(1)), level(dec!(102), dec!(4))],
        );
        let mut v = FeatureVector::default();
        apply(&mut v, Some(&book));

        assert!((v.spread - 1.0).abs() < 1e-9);
        assert_eq!(v.l1_depth_bid, 2.0);
        assert_eq!(v.l1_depth_ask, 1.0);
        assert_eq!(v.l5_depth_bid, 5.0);
        assert_eq!(v.l5_depth_ask, 5.0);
        assert_eq!(v.depth_imbalance, 0.0);
    }

    #[test]
    fn test_depth_imbalance_sign() {
        let book = snapshot(
            vec![level(dec!(100), dec!(9))],
            vec![level(dec!(101), dec!(1))],
        );
        let mut v = FeatureVector::default();
        apply(&mut v, Some(&book));
        // (9 - 1) / 10
        assert!((v.depth_imbalance - 0.8).abs() < 1e-9);
        assert!(v.stacked_imbalance_nearby);
    }

    #[test]
    fn test_void_gap_scenario() {
        // Bid gaps [1, 1], ask gaps [1, 19]: min 1, max 19 >= 5x1 => void
        let book = snapshot(
            vec![
                level(dec!(100), dec!(1)),
                level(dec!(99), dec!(1)),
                level(dec!(98), dec!(1)),
            ],
            vec![
                level(dec!(101), dec!(1)),
                level(dec!(102), dec!(1)),
                level(dec!(121), dec!(1)),
            ],
        );
        let mut v = FeatureVector::default();
        apply(&mut v, Some(&book));
        assert!(v.liquidity_void_flag);
    }

    #[test]
    fn test_uniform_gaps_no_void() {
        let book = snapshot(
            vec![
                level(dec!(100), dec!(1)),
                level(dec!(99), dec!(1)),
                level(dec!(98), dec!(1)),
            ],
            vec![
                level(dec!(101), dec!(1)),
                level(dec!(102), dec!(1)),
                level(dec!(103), dec!(1)),
            ],
        );
        let mut v = FeatureVector::default();
        apply(&mut v, Some(&book));
        assert!(!v.liquidity_void_flag);
    }

    #[test]
    fn test_single_gap_insufficient_for_void() {
        let book = snapshot(
            vec![level(dec!(100), dec!(1)), level(dec!(80), dec!(1))],
            vec![level(dec!(101), dec!(1))],
        );
        let mut v = FeatureVector::default();
        apply(&mut v, Some(&book));
        assert!(!v.liquidity_void_flag);
    }

    #[test]
    fn test_stacked_imbalance_zero_depth_side() {
        assert!(detect_stacked_imbalance(0.0, 5.0));
        assert!(detect_stacked_imbalance(5.0, 0.0));
        assert!(!detect_stacked_imbalance(0.0, 0.0));
        assert!(!detect_stacked_imbalance(4.0, 5.0));
        assert!(detect_stacked_imbalance(15.0, 5.0));
    }
}
