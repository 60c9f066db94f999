use std::path::PathBuf;
use std::time::SystemTime;
use serde::{Deserialize, Serialize};
use crate::watcher::WatchKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Created,
    Deleted,
    Modified,
    /// Notifications were coalesced or dropped by the OS
    Overflow,
}

impl ChangeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChangeKind::Created => "ENTRY_CREATE",
            ChangeKind::Deleted => "ENTRY_DELETE",
            ChangeKind::Modified => "ENTRY_MODIFY",
            ChangeKind::Overflow => "OVERFLOW",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            timestamp: SystemTime::now(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Deleted, path)
    }

    pub fn overflow(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Overflow, path)
    }

    pub fn is_overflow(&self) -> bool {
        self.kind == ChangeKind::Overflow
    }

    /// Base filename of the affected entry, if it has one that is valid UTF-8.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|s| s.to_str())
    }
}

/// A creation event that passed the receipt filter; the pipeline's input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifyingFile {
    pub path: PathBuf,
    pub detected_at: SystemTime,
}

impl QualifyingFile {
    pub(crate) fn from_event(event: ChangeEvent) -> Self {
        Self {
            path: event.path,
            detected_at: event.timestamp,
        }
    }
}

/// All events drained for one registration in a single poll, in arrival order.
#[derive(Debug, Clone)]
pub struct WatchBatch {
    pub key: WatchKey,
    pub dir: PathBuf,
    pub events: Vec<ChangeEvent>,
}

impl WatchBatch {
    pub fn new(key: WatchKey, dir: impl Into<PathBuf>) -> Self {
        Self {
            key,
            dir: dir.into(),
            events: Vec::new(),
        }
    }

    pub fn with_events(mut self, events: Vec<ChangeEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn push(&mut self, event: ChangeEvent) {
        self.events.push(event);
    }
}
