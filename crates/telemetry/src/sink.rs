//! Event sinks: where trace events end up.

use crate::model::{EventType, TraceEvent};
use citycode_core::error::TraceError;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Destination for trace events. Shared across concurrent tasks.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TraceEvent) -> Result<(), TraceError>;
}

// ── JSONL file ────────────────────────────────────────────────────────────

/// Appends one JSON object per line to a file.
///
/// Each event is encoded up front and written with a single `write_all`
/// while holding the lock, so concurrent emitters never interleave lines.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TraceError> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!(path = %path.display(), "Trace sink opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open a fresh timestamped file `<dir>/<prefix>_<YYYYmmdd_HHMMSS>.jsonl`.
    pub fn timestamped(dir: impl AsRef<Path>, prefix: &str) -> Result<Self, TraceError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        Self::open(dir.as_ref().join(format!("{prefix}_{stamp}.jsonl")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlSink {
    fn emit(&self, event: &TraceEvent) -> Result<(), TraceError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

// ── In-memory ─────────────────────────────────────────────────────────────

/// Keeps events in a vector. Used by tests and by callers that want to
/// inspect a run after the fact.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn of_type(&self, event_type: EventType) -> Vec<TraceEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &TraceEvent) -> Result<(), TraceError> {
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        Ok(())
    }
}

// ── Discard ───────────────────────────────────────────────────────────────

/// Drops every event. Used when tracing is disabled.
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &TraceEvent) -> Result<(), TraceError> {
        Ok(())
    }
}
