//! Append-only JSONL event log with size-based rotation
//!
//! The check-rotate/append/flush sequence runs under a mutex so concurrent
//! writers can never interleave partial records.

use super::{EventRecord, StorageError};
use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Records wick events as newline-delimited JSON
pub struct JsonlWriter {
    output_dir: PathBuf,
    rotation_bytes: u64,
    inner: Mutex<WriterInner>,
}

struct WriterInner {
    current_path: PathBuf,
}

impl JsonlWriter {
    /// Create a writer, ensuring the output directory exists
    pub fn new(output_dir: impl Into<PathBuf>, file_rotation_mb: u64) -> Result<Self, StorageError> {
        let output_dir = output_dir.into();
        std::fs::create_dir_all(&output_dir)?;

        let current_path = Self::next_file_path(&output_dir);
        tracing::info!(path = ?current_path, "Event log opened");

        Ok(Self {
            output_dir,
            rotation_bytes: file_rotation_mb * 1024 * 1024,
            inner: Mutex::new(WriterInner { current_path }),
        })
    }

    /// Append one event record; errors propagate to the caller
    pub async fn write_event(&self, record: &EventRecord) -> Result<(), StorageError> {
        let line = serde_json::to_string(record)?;

        let mut inner = self.inner.lock().await;

        if self.needs_rotation(&inner.current_path) {
            inner.current_path = Self::next_file_path(&self.output_dir);
            tracing::info!(path = ?inner.current_path, "Rotated event log");
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&inner.current_path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;

        Ok(())
    }

    /// Path currently being appended to
    pub async fn current_path(&self) -> PathBuf {
        self.inner.lock().await.current_path.clone()
    }

    fn needs_rotation(&self, path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(meta) => meta.len() >= self.rotation_bytes,
            Err(_) => false,
        }
    }

    fn next_file_path(output_dir: &Path) -> PathBuf {
        // Nanosecond stamp keeps rapid rotations from colliding
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%f");
        output_dir.join(format!("wick_events_{}.jsonl", stamp))
    }
}
