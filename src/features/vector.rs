//! Flat per-event feature vector
//!
//! Every field carries a neutral default so a complete vector can always be
//! built even when upstream data is missing. Unknown fields on the wire land
//! in the bounded `extra` side-map instead of failing deserialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Cap on experimental side-map entries
pub const MAX_EXTRA_FIELDS: usize = 32;

/// Complete feature set for a wick event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureVector {
    // Wick geometry
    pub wick_size_pct: f64,
    pub body_size_pct: f64,
    pub wick_to_body_ratio: f64,
    pub protrusion_pct: f64,
    pub rejection_velocity: f64,
    pub displacement_idx: f64,
    pub finished_auction: bool,
    pub unfinished_business: bool,
    pub zero_print_flag: bool,
    pub imbalance_trap_score: f64,

    // Order flow
    pub delta_at_wick: f64,
    pub delta_prev_pivot: f64,
    pub delta_divergence_flag: bool,
    pub cvd_slope_10: f64,
    pub absorption_flag: bool,
    pub exhaustion_flag: bool,
    pub trade_frequency_spike: f64,
    pub bid_ask_refresh_rate: f64,
    pub iceberg_flag: bool,

    // Liquidity
    pub spread: f64,
    pub l1_depth_bid: f64,
    pub l1_depth_ask: f64,
    pub l5_depth_bid: f64,
    pub l5_depth_ask: f64,
    pub depth_imbalance: f64,
    pub liquidity_void_flag: bool,
    pub stacked_imbalance_nearby: bool,

    // Derivatives
    pub oi_change_pct: f64,
    pub oi_direction: String,
    pub oi_liquidation_flag: bool,
    pub liquidation_density: f64,
    pub funding_rate_now: f64,
    pub funding_rate_next: f64,
    pub funding_distance_to_timestamp: f64,

    // VWAP
    pub session_vwap_distance: f64,
    pub global_vwap_distance: f64,
    pub vwap_band_flag_1sd: bool,
    pub vwap_band_flag_2sd: bool,
    pub vwap_mean_reversion_score: f64,

    // Regime
    pub hurst_exponent: f64,
    pub adx_14: f64,
    pub atr_14: f64,
    pub trend_strength: f64,
    pub btc_d: f64,
    pub usdt_d: f64,
    pub eth_btc_trend: f64,
    pub rolling_beta_btc_30: f64,
    pub rolling_beta_btc_90: f64,
    pub correlation_drift: f64,

    // Session
    pub session_label: String,
    pub minutes_into_session: i64,
    pub minutes_until_session_close: i64,
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub weekend_flag: bool,
    pub cme_close_proximity: f64,

    // Market profile
    pub fresh_sd_zone_flag: bool,
    pub sd_zone_penetration_pct: f64,
    pub poc_distance: f64,
    pub vah_distance: f64,
    pub val_distance: f64,
    pub value_rejection_flag: bool,

    // Labels (populated by the offline labeling job)
    pub untouched_30m: Option<bool>,
    pub untouched_1h: Option<bool>,
    pub untouched_4h: Option<bool>,
    pub hold_duration: Option<f64>,
    pub mfe: Option<f64>,
    pub mae: Option<f64>,
    pub distance_moved: Option<f64>,

    /// Experimental fields, bounded; unknown wire fields land here
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self {
            wick_size_pct: 0.0,
            body_size_pct: 0.0,
            wick_to_body_ratio: 0.0,
            protrusion_pct: 0.0,
            rejection_velocity: 0.0,
            displacement_idx: 0.0,
            finished_auction: false,
            unfinished_business: false,
            zero_print_flag: false,
            imbalance_trap_score: 0.0,

            delta_at_wick: 0.0,
            delta_prev_pivot: 0.0,
            delta_divergence_flag: false,
            cvd_slope_10: 0.0,
            absorption_flag: false,
            exhaustion_flag: false,
            trade_frequency_spike: 0.0,
            bid_ask_refresh_rate: 0.0,
            iceberg_flag: false,

            spread: 0.0,
            l1_depth_bid: 0.0,
            l1_depth_ask: 0.0,
            l5_depth_bid: 0.0,
            l5_depth_ask: 0.0,
            depth_imbalance: 0.0,
            liquidity_void_flag: false,
            stacked_imbalance_nearby: false,

            oi_change_pct: 0.0,
            oi_direction: "inc".to_string(),
            oi_liquidation_flag: false,
            liquidation_density: 0.0,
            funding_rate_now: 0.0,
            funding_rate_next: 0.0,
            funding_distance_to_timestamp: 0.0,

            session_vwap_distance: 0.0,
            global_vwap_distance: 0.0,
            vwap_band_flag_1sd: false,
            vwap_band_flag_2sd: false,
            vwap_mean_reversion_score: 0.0,

            hurst_exponent: 0.5,
            adx_14: 0.0,
            atr_14: 0.0,
            trend_strength: 0.0,
            btc_d: 0.0,
            usdt_d: 0.0,
            eth_btc_trend: 0.0,
            rolling_beta_btc_30: 0.0,
            rolling_beta_btc_90: 0.0,
            correlation_drift: 0.0,

            session_label: "unknown".to_string(),
            minutes_into_session: 0,
            minutes_until_session_close: 0,
            hour_of_day: 0,
            day_of_week: 0,
            weekend_flag: false,
            cme_close_proximity: 0.0,

            fresh_sd_zone_flag: false,
            sd_zone_penetration_pct: 0.0,
            poc_distance: 0.0,
            vah_distance: 0.0,
            val_distance: 0.0,
            value_rejection_flag: false,

            untouched_30m: None,
            untouched_1h: None,
            untouched_4h: None,
            hold_duration: None,
            mfe: None,
            mae: None,
            distance_moved: None,

            extra: BTreeMap::new(),
        }
    }
}

impl FeatureVector {
    /// Record an experimental field, bounded at [`MAX_EXTRA_FIELDS`]
    ///
    /// Returns false if the map is full and the key is new.
    pub fn set_extra(&mut self, key: impl Into<String>, value: serde_json::Value) -> bool {
        let key = key.into();
        if self.extra.len() >= MAX_EXTRA_FIELDS && !self.extra.contains_key(&key) {
            tracing::warn!(%key, "Extra feature map full, dropping field");
            return false;
        }
        self.extra.insert(key, value);
        true
    }
}
