//! Append-only event streams.
//!
//! The engine reports through two write-only textual streams: general
//! simulation events and TCAS decisions. Every line is prefixed with
//! the wall-clock timestamp. Console diagnostics go through `tracing`
//! separately; the engine never reads from a sink.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::Utc;

fn stamp(message: &str) -> String {
    format!("{} {}", Utc::now().format("%Y-%m-%d %H:%M:%S"), message)
}

/// Write-only interface over the two event streams.
pub trait EventSink: Send + Sync {
    /// General simulation events: takeoffs, landings, lifecycle.
    fn general(&self, message: &str);
    /// TCAS checks, alerts and resolutions.
    fn tcas(&self, message: &str);
}

/// File-backed sink. Files are created if absent and appended to.
pub struct FileSink {
    general: Mutex<File>,
    tcas: Mutex<File>,
}

impl FileSink {
    /// Open (or create) the two log files under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating log directory {}", dir.display()))?;
        Ok(Self {
            general: Mutex::new(Self::open_log(&dir.join("console_log.txt"))?),
            tcas: Mutex::new(Self::open_log(&dir.join("tcas_log.txt"))?),
        })
    }

    fn open_log(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening log file {}", path.display()))
    }

    fn append(file: &Mutex<File>, line: &str) {
        let mut guard = file.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = writeln!(guard, "{line}") {
            tracing::warn!("failed to append event line: {err}");
        }
    }
}

impl EventSink for FileSink {
    fn general(&self, message: &str) {
        Self::append(&self.general, &stamp(message));
    }

    fn tcas(&self, message: &str) {
        Self::append(&self.tcas, &stamp(message));
    }
}

/// In-memory sink for tests and inspection.
#[derive(Default)]
pub struct MemorySink {
    general: Mutex<Vec<String>>,
    tcas: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn general_lines(&self) -> Vec<String> {
        self.general
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn tcas_lines(&self) -> Vec<String> {
        self.tcas.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for MemorySink {
    fn general(&self, message: &str) {
        self.general
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stamp(message));
    }

    fn tcas(&self, message: &str) {
        self.tcas
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stamp(message));
    }
}

/// Discards everything.
pub struct NullSink;

impl EventSink for NullSink {
    fn general(&self, _message: &str) {}
    fn tcas(&self, _message: &str) {}
}
