//! Event sinks. Write-only from the arena's point of view.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::events::ArenaEvent;
use crate::error::PersistenceError;

/// Receives arena events.
///
/// A returned error is fatal to the run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ArenaEvent) -> Result<(), PersistenceError>;

    fn flush(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

/// Appends one JSON object per line, flushing after every event.
#[derive(Debug)]
pub struct JsonlEventLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlEventLog {
    /// Creates (or truncates) the log at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl EventSink for JsonlEventLog {
    fn emit(&self, event: &ArenaEvent) -> Result<(), PersistenceError> {
        let line = serde_json::to_string(event)?;
        let mut writer = self.writer.lock().map_err(|_| PersistenceError::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    fn flush(&self) -> Result<(), PersistenceError> {
        let mut writer = self.writer.lock().map_err(|_| PersistenceError::Poisoned)?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps events in memory. Used by tests and by callers that inspect a run.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<ArenaEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every event emitted so far.
    pub fn events(&self) -> Vec<ArenaEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.events.lock().map(|events| events.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &ArenaEvent) -> Result<(), PersistenceError> {
        self.events
            .lock()
            .map_err(|_| PersistenceError::Poisoned)?
            .push(event.clone());
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: &ArenaEvent) -> Result<(), PersistenceError> {
        Ok(())
    }
}
