//! Periodic engine status snapshot
//!
//! Serialized to a temp file and renamed into place, so readers always see
//! a complete document.

use super::StorageError;
use crate::wick::WickSide;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-symbol last-event summary
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolStatus {
    pub last_bar_ts: Option<DateTime<Utc>>,
    pub last_wick_side: Option<WickSide>,
    pub last_score: f64,
}

/// Full engine status document
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub running: bool,
    pub bars_closed: u64,
    pub wicks_detected: u64,
    pub events_written: u64,
    pub write_failures: u64,
    pub alerts_sent: u64,
    pub usdt_dominance: f64,
    /// Seconds since each feed last produced data; distinguishes a dead
    /// feed from a quiet one
    pub feed_age_secs: BTreeMap<String, i64>,
    pub symbols: BTreeMap<String, SymbolStatus>,
}

/// Writes status snapshots atomically
pub struct StatusWriter {
    path: PathBuf,
    tmp_path: PathBuf,
}

impl StatusWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        let path = output_dir.as_ref().join("engine_status.json");
        let tmp_path = output_dir.as_ref().join("engine_status.json.tmp");
        Self { path, tmp_path }
    }

    /// Serialize and atomically replace the status file
    pub fn write(&self, snapshot: &StatusSnapshot) -> Result<(), StorageError> {
        let body = serde_json::to_vec_pretty(snapshot)?;
        std::fs::write(&self.tmp_path, body)?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot() -> StatusSnapshot {
        let mut feed_age_secs = BTreeMap::new();
        feed_age_secs.insert("trades".to_string(), 2);
        feed_age_secs.insert("orderbook".to_string(), 1);

        let mut symbols = BTreeMap::new();
        symbols.insert(
            "BTC-USDT".to_string(),
            SymbolStatus {
                last_bar_ts: Some(Utc::now()),
                last_wick_side: Some(WickSide::Lower),
                last_score: 62.0,
            },
        );

        StatusSnapshot {
            timestamp: Utc::now(),
            uptime_seconds: 120,
            running: true,
            bars_closed: 10,
            wicks_detected: 4,
            events_written: 4,
            write_failures: 0,
            alerts_sent: 1,
            usdt_dominance: 4.8,
            feed_age_secs,
            symbols,
        }
    }

    #[test]
    fn test_write_and_replace() {
        let dir = TempDir::new().unwrap();
        let writer = StatusWriter::new(dir.path());

        writer.write(&snapshot()).unwrap();
        let first = std::fs::read_to_string(writer.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&first).unwrap();
        assert_eq!(value["bars_closed"], 10);
        assert_eq!(value["feed_age_secs"]["trades"], 2);
        assert_eq!(value["symbols"]["BTC-USDT"]["last_wick_side"], "lower");

        // A second write replaces the document in place
        let mut snap = snapshot();
        snap.bars_closed = 11;
        writer.write(&snap).unwrap();
        let second = std::fs::read_to_string(writer.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&second).unwrap();
        assert_eq!(value["bars_closed"], 11);

        // No temp file left behind
        assert!(!dir.path().join("engine_status.json.tmp").exists());
    }
}
