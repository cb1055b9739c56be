use crate::model::{Entry, NewEntry};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Notified after every successful write through the store.
pub trait WriteObserver: Send + Sync {
    fn entries_changed(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreFingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

pub struct CatalogStore {
    path: PathBuf,
    observers: Vec<Arc<dyn WriteObserver>>,
}

impl CatalogStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn WriteObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the data file (and parents) holding an empty array if it is missing.
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.is_file() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.write_all(&[])
    }

    pub fn read_all(&self) -> Result<Vec<Entry>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("failed to parse {}", self.path.display()))
    }

    pub fn find(&self, id: u64) -> Result<Option<Entry>> {
        Ok(self.read_all()?.into_iter().find(|e| e.id == id))
    }

    /// Read-modify-write of the whole file. Two processes appending at once
    /// can lose one of the writes.
    pub fn append(&self, new: NewEntry) -> Result<Entry> {
        let mut entries = self.read_all()?;
        let id = next_entry_id(&entries, now_millis());
        let entry = new.with_id(id);
        entries.push(entry.clone());
        self.write_all(&entries)?;
        debug!(id, total = entries.len(), "appended catalog entry");
        for observer in &self.observers {
            observer.entries_changed();
        }
        Ok(entry)
    }

    pub fn write_all(&self, entries: &[Entry]) -> Result<()> {
        let text = serde_json::to_string_pretty(entries).context("failed to encode entries")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }

    pub fn fingerprint(&self) -> Result<StoreFingerprint> {
        let meta = fs::metadata(&self.path)
            .with_context(|| format!("failed to stat {}", self.path.display()))?;
        Ok(StoreFingerprint {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Creation timestamp in milliseconds, bumped past the largest existing id
/// so ids stay unique when several entries land in the same millisecond.
pub fn next_entry_id(existing: &[Entry], now_millis: u64) -> u64 {
    match existing.iter().map(|e| e.id).max() {
        Some(max) if max >= now_millis => max.saturating_add(1),
        _ => now_millis,
    }
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
