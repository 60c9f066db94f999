use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Duration;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use crate::events::{ChangeEvent, ChangeKind, WatchBatch};

/// Handle for one registered directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchKey(u64);

impl WatchKey {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Maps live watch keys to the directory each one covers.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    keys: HashMap<WatchKey, PathBuf>,
    by_path: HashMap<PathBuf, WatchKey>,
    next_key: u64,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the key for `dir`, and whether it was newly created.
    pub fn register(&mut self, dir: &Path) -> (WatchKey, bool) {
        if let Some(key) = self.by_path.get(dir) {
            return (*key, false);
        }

        self.next_key += 1;
        let key = WatchKey(self.next_key);
        self.keys.insert(key, dir.to_path_buf());
        self.by_path.insert(dir.to_path_buf(), key);
        (key, true)
    }

    pub fn key_for(&self, dir: &Path) -> Option<WatchKey> {
        self.by_path.get(dir).copied()
    }

    pub fn path(&self, key: WatchKey) -> Option<&Path> {
        self.keys.get(&key).map(PathBuf::as_path)
    }

    pub fn retire(&mut self, key: WatchKey) -> Option<PathBuf> {
        let path = self.keys.remove(&key)?;
        self.by_path.remove(&path);
        Some(path)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (WatchKey, &Path)> {
        self.keys.iter().map(|(key, path)| (*key, path.as_path()))
    }
}

/// Result of one blocking poll of the watcher.
#[derive(Debug)]
pub enum WatchPoll {
    /// Events grouped per registration, in arrival order.
    Batches(Vec<WatchBatch>),
    /// Nothing arrived before the poll interval elapsed.
    Idle,
    /// No registrations remain, or the notification source is gone.
    Closed,
}

pub struct DirectoryWatcher {
    watcher: RecommendedWatcher,
    event_rx: Receiver<notify::Result<Event>>,
    registry: WatchRegistry,
    root: PathBuf,
    recursive: bool,
    trace: bool,
}

impl DirectoryWatcher {
    pub fn new<P: AsRef<Path>>(path: P, recursive: bool) -> Result<Self> {
        let root = path
            .as_ref()
            .canonicalize()
            .with_context(|| format!("Failed to resolve watch directory {}", path.as_ref().display()))?;

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let watcher = notify::recommended_watcher(tx)
            .context("Failed to create file system watcher")?;

        let mut dir_watcher = Self {
            watcher,
            event_rx: rx,
            registry: WatchRegistry::new(),
            root: root.clone(),
            recursive,
            trace: false,
        };

        if recursive {
            tracing::info!("Scanning {} ...", root.display());
            dir_watcher.register_all(&root)?;
            tracing::info!("Done.");
        } else {
            dir_watcher.register(&root)?;
        }

        // enable trace after initial registration
        dir_watcher.trace = true;
        Ok(dir_watcher)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    fn register(&mut self, dir: &Path) -> Result<WatchKey> {
        if let Some(key) = self.registry.key_for(dir) {
            return Ok(key);
        }

        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch directory {}", dir.display()))?;

        let (key, _) = self.registry.register(dir);
        if self.trace {
            tracing::info!("register: {}", dir.display());
        } else {
            tracing::debug!("register: {}", dir.display());
        }
        Ok(key)
    }

    /// Registers `start` and every directory below it. Symlinks are not followed.
    fn register_all(&mut self, start: &Path) -> Result<()> {
        let walker = WalkBuilder::new(start)
            .standard_filters(false)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = entry.with_context(|| format!("Failed to scan {}", start.display()))?;
            if entry.file_type().map_or(false, |ft| ft.is_dir()) {
                self.register(entry.path())?;
            }
        }
        Ok(())
    }

    /// Blocks for up to `timeout` waiting for notifications, then drains
    /// everything already queued into per-registration batches.
    pub fn poll(&mut self, timeout: Duration) -> WatchPoll {
        if self.registry.is_empty() {
            return WatchPoll::Closed;
        }

        let first = match self.event_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                self.retire_missing();
                if self.registry.is_empty() {
                    return WatchPoll::Closed;
                }
                return WatchPoll::Idle;
            }
            Err(RecvTimeoutError::Disconnected) => return WatchPoll::Closed,
        };

        let mut pending = vec![first];
        while let Ok(result) = self.event_rx.try_recv() {
            pending.push(result);
        }

        let mut batches: Vec<WatchBatch> = Vec::new();
        for result in pending {
            match result {
                Ok(event) => {
                    for change in translate_event(&event) {
                        self.route(change, &mut batches);
                    }
                }
                Err(err) => tracing::error!("File watcher error: {}", err),
            }
        }

        self.retire_missing();
        if batches.is_empty() && self.registry.is_empty() {
            return WatchPoll::Closed;
        }
        WatchPoll::Batches(batches)
    }

    fn route(&mut self, change: ChangeEvent, batches: &mut Vec<WatchBatch>) {
        if change.kind == ChangeKind::Deleted {
            if let Some(key) = self.registry.key_for(&change.path) {
                // Its watch handle died with it, even if the path is recreated later
                self.retire(key);
                return;
            }
        }

        let key = if change.is_overflow() {
            self.overflow_key(&change.path)
        } else {
            change.path.parent().and_then(|dir| self.registry.key_for(dir))
        };

        let Some(key) = key else {
            tracing::error!("WatchKey not recognized for {}", change.path.display());
            return;
        };

        // New subdirectories are covered before the next poll
        if self.recursive && change.kind == ChangeKind::Created && is_real_dir(&change.path) {
            if let Err(err) = self.register_all(&change.path) {
                tracing::debug!("Skipping registration of {}: {:#}", change.path.display(), err);
            }
        }

        match batches.iter_mut().find(|batch| batch.key == key) {
            Some(batch) => batch.push(change),
            None => {
                let dir = self.registry.path(key).map(Path::to_path_buf).unwrap_or_default();
                let mut batch = WatchBatch::new(key, dir);
                batch.push(change);
                batches.push(batch);
            }
        }
    }

    fn overflow_key(&self, path: &Path) -> Option<WatchKey> {
        self.registry
            .key_for(path)
            .or_else(|| path.parent().and_then(|dir| self.registry.key_for(dir)))
            .or_else(|| self.registry.key_for(&self.root))
            .or_else(|| self.registry.iter().map(|(key, _)| key).min())
    }

    /// Retires registrations whose directory is no longer accessible.
    fn retire_missing(&mut self) {
        let gone: Vec<WatchKey> = self
            .registry
            .iter()
            .filter(|(_, dir)| !dir.is_dir())
            .map(|(key, _)| key)
            .collect();

        for key in gone {
            self.retire(key);
        }
    }

    fn retire(&mut self, key: WatchKey) {
        if let Some(dir) = self.registry.retire(key) {
            let _ = self.watcher.unwatch(&dir);
            tracing::info!("watch retired: {}", dir.display());
        }
    }
}

fn is_real_dir(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

/// Maps one `notify` event onto zero or more change events.
pub fn translate_event(event: &Event) -> Vec<ChangeEvent> {
    if event.need_rescan() {
        let path = event.paths.first().cloned().unwrap_or_default();
        return vec![ChangeEvent::overflow(path)];
    }

    let kind = match event.kind {
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        // Both halves of a rename are also reported on their own
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return Vec::new(),
        EventKind::Modify(_) => ChangeKind::Modified,
        EventKind::Remove(_) => ChangeKind::Deleted,
        _ => return Vec::new(),
    };

    event
        .paths
        .iter()
        .map(|path| ChangeEvent::new(kind, path.clone()))
        .collect()
}
