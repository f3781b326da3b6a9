//! Feature fusion
//!
//! Seven domain computers layered over per-symbol rolling state, fused into
//! one flat vector per wick event. Every domain defaults to neutral output
//! on missing input and none can fail.
//!
//! Per-symbol state lives in an explicit registry owned by the pipeline:
//! updating one symbol's state is unobservable from any other symbol, and a
//! targeted reset clears exactly one symbol.

pub mod derivatives;
pub mod geometry;
pub mod liquidity;
pub mod orderflow;
pub mod session;
pub mod vector;
pub mod vwap;

pub use derivatives::DerivativesState;
pub use orderflow::OrderFlowState;
pub use vector::FeatureVector;
pub use vwap::VwapState;

use crate::aggregate::Bar;
use crate::book::OrderBookSnapshot;
use crate::feed::{FundingSnapshot, LiquidationEvent, MacroState, OiSnapshot};
use crate::wick::WickOccurrence;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Lossy conversion for statistics over wire-exact decimals
pub(crate) fn dec_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

/// Registry of per-symbol feature state, owned by the pipeline
#[derive(Debug, Default)]
pub struct FeatureRegistry {
    orderflow: HashMap<String, OrderFlowState>,
    vwap: HashMap<String, VwapState>,
    derivatives: HashMap<String, DerivativesState>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the full feature vector for one wick event
    pub fn fuse(
        &mut self,
        bar: &Bar,
        wick: &WickOccurrence,
        book: Option<&OrderBookSnapshot>,
        macro_state: Option<&MacroState>,
    ) -> FeatureVector {
        let mut vector = FeatureVector::default();
        let symbol = bar.symbol.clone();

        geometry::apply(&mut vector, bar, wick.side);
        self.orderflow
            .entry(symbol.clone())
            .or_default()
            .apply(&mut vector, bar);
        liquidity::apply(&mut vector, book);
        session::apply(&mut vector, bar.end_ts);

        let session_label = vector.session_label.clone();
        self.vwap
            .entry(symbol.clone())
            .or_default()
            .apply(&mut vector, bar, &session_label);

        self.derivatives
            .entry(symbol)
            .or_default()
            .apply(&mut vector, bar.end_ts);

        if let Some(m) = macro_state {
            vector.usdt_d = m.usdt_dominance;
            vector.btc_d = m.btc_dominance;
        }

        vector
    }

    /// Record a polled open-interest snapshot
    pub fn register_oi(&mut self, snapshot: OiSnapshot) {
        self.derivatives
            .entry(snapshot.symbol.clone())
            .or_default()
            .record_oi(snapshot);
    }

    /// Record a polled funding snapshot
    pub fn register_funding(&mut self, snapshot: FundingSnapshot) {
        self.derivatives
            .entry(snapshot.symbol.clone())
            .or_default()
            .record_funding(snapshot);
    }

    /// Record a polled liquidation event
    pub fn register_liquidation(&mut self, event: LiquidationEvent) {
        self.derivatives
            .entry(event.symbol.clone())
            .or_default()
            .record_liquidation(event);
    }

    /// Clear all state for exactly one symbol
    pub fn reset_symbol(&mut self, symbol: &str) {
        self.orderflow.remove(symbol);
        self.vwap.remove(symbol);
        self.derivatives.remove(symbol);
    }

    /// Clear all state for all symbols
    pub fn reset_all(&mut self) {
        self.orderflow.clear();
        self.vwap.clear();
        self.derivatives.clear();
    }

    /// Order-flow state for a symbol, if any
    pub fn orderflow_state(&self, symbol: &str) -> Option<&OrderFlowState> {
        self.orderflow.get(symbol)
    }

    /// VWAP state for a symbol, if any
    pub fn vwap_state(&self, symbol: &str) -> Option<&VwapState> {
        self.vwap.get(symbol)
    }

    /// Derivatives state for a symbol, if any
    pub fn derivatives_state(&self, symbol: &str) -> Option<&DerivativesState> {
        self.derivatives.get(symbol)
    }
}
