//! WebSocket client module
//!
//! Reusable reconnecting client with bounded exponential backoff,
//! jitter, keep-alive and cooperative shutdown

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
