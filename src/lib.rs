//! wick-engine: real-time wick detection for crypto perpetual/spot markets
//!
//! This library provides the core components for:
//! - Real-time trade and order-book feeds from OKX
//! - Tumbling-window bar aggregation per symbol
//! - Wick (price-rejection) detection on bar close
//! - Seven-domain feature fusion with per-symbol state isolation
//! - Order-book microstructure analysis (void bands, stacked walls)
//! - Magnet scoring with itemized point breakdowns
//! - JSONL audit logging, status snapshots, and webhook alerts

pub mod aggregate;
pub mod alert;
pub mod analysis;
pub mod book;
pub mod cli;
pub mod config;
pub mod engine;
pub mod feed;
pub mod features;
pub mod score;
pub mod storage;
pub mod telemetry;
pub mod wick;
pub mod ws;
