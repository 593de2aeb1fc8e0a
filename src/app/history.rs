//! Visualization History - bounded, persisted record of generated artifacts
//!
//! This module keeps the most recent artifacts the widget produced:
//! - Newest entry first, at most [`MAX_HISTORY_ENTRIES`]
//! - Rewritten wholesale on every mutation (single writer per widget)
//! - Persistence is best-effort: a failed read yields an empty history, a failed write
//!   switches the store to memory-only for the rest of the session
//!
//! The durable record is a JSON array of `{prompt, html, timestamp}` objects stored under
//! [`HISTORY_STORAGE_KEY`].

#![warn(clippy::all, rust_2018_idioms)]

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Upper bound on stored entries; inserting beyond it evicts the oldest
pub const MAX_HISTORY_ENTRIES: usize = 10;

/// Fixed key of the persisted history record
pub const HISTORY_STORAGE_KEY: &str = "apiviz_history";

/// A previously generated artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Request the artifact was generated for
    pub prompt: String,
    /// The generated, sanitized HTML document (without the injected bridge)
    pub html: String,
    /// Creation or last improvement time, stored as epoch milliseconds
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(prompt: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            html: html.into(),
            timestamp: Utc::now(),
        }
    }

    /// Prompt shortened for list display
    pub fn title(&self, max_chars: usize) -> String {
        let prompt = self.prompt.trim();
        if prompt.chars().count() <= max_chars {
            return prompt.to_string();
        }
        let mut title: String = prompt.chars().take(max_chars.saturating_sub(3)).collect();
        title.push_str("...");
        title
    }
}

/// Durable storage for the serialized history record
///
/// Implementations hold exactly one record. All methods are fallible; [`HistoryStore`]
/// decides what a failure means.
pub trait HistoryBackend: Send + Sync {
    /// Read the record, `None` if nothing was stored yet
    fn read(&self) -> Result<Option<String>>;

    /// Replace the record
    fn write(&self, record: &str) -> Result<()>;

    /// Delete the record
    fn remove(&self) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String {
        "custom history backend".to_string()
    }
}

/// History record kept in a JSON file, written atomically under an exclusive lock
#[derive(Debug, Clone)]
pub struct FileHistoryBackend {
    path: PathBuf,
}

impl FileHistoryBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<local data dir>/apiviz/apiviz_history.json`
    pub fn default_location() -> Result<Self> {
        let data_dir = dirs::data_local_dir()
            .context("Failed to get local data directory")?
            .join("apiviz");
        Ok(Self::new(data_dir.join(format!("{}.json", HISTORY_STORAGE_KEY))))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }
}

impl HistoryBackend for FileHistoryBackend {
    fn read(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read history file {:?}", self.path))?;
        Ok(Some(contents))
    }

    fn write(&self, record: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create history directory")?;
        }

        let lock_file = fs::File::create(self.lock_path()).context("Failed to create lock file")?;
        lock_file
            .lock_exclusive()
            .context("Failed to acquire history lock")?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, record).context("Failed to write temp history file")?;
        fs::rename(&temp_path, &self.path).context("Failed to rename temp history file")?;

        // Lock is released when lock_file goes out of scope
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove history file {:?}", self.path))?;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file {:?}", self.path)
    }
}

/// History record that lives only as long as the process
#[derive(Debug, Default)]
pub struct MemoryHistoryBackend {
    record: Mutex<Option<String>>,
}

impl MemoryHistoryBackend {
    pub fn with_record(record: impl Into<String>) -> Self {
        Self {
            record: Mutex::new(Some(record.into())),
        }
    }

    pub fn record(&self) -> Option<String> {
        self.record
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl HistoryBackend for MemoryHistoryBackend {
    fn read(&self) -> Result<Option<String>> {
        Ok(self.record())
    }

    fn write(&self, record: &str) -> Result<()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = Some(record.to_string());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.record.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

/// Newest-first list of artifacts mirrored to a [`HistoryBackend`]
pub struct HistoryStore {
    entries: Vec<HistoryEntry>,
    backend: Arc<dyn HistoryBackend>,
    /// Set after the first failed write; the store stops touching the backend
    session_only: bool,
}

impl HistoryStore {
    /// Load the persisted record; a missing or corrupt record yields an empty history
    pub fn load(backend: Arc<dyn HistoryBackend>) -> Self {
        let mut session_only = false;

        let mut entries = match backend.read() {
            Ok(Some(record)) => match serde_json::from_str::<Vec<HistoryEntry>>(&record) {
                Ok(entries) => entries,
                Err(e) => {
                    log_warn!("Ignoring corrupt history record: {}", e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                log_warn!(
                    "History storage unavailable ({}), keeping history for this session only: {:#}",
                    backend.describe(),
                    e
                );
                session_only = true;
                Vec::new()
            }
        };
        entries.truncate(MAX_HISTORY_ENTRIES);

        trace_debug!(
            "History loaded from {}: {} entries",
            backend.describe(),
            entries.len()
        );

        Self {
            entries,
            backend,
            session_only,
        }
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether mutations still reach the durable backend
    pub fn is_persistent(&self) -> bool {
        !self.session_only
    }

    /// Insert at the front, evicting the oldest entries beyond the bound
    pub fn save(&mut self, entry: HistoryEntry) {
        self.entries.insert(0, entry);
        self.entries.truncate(MAX_HISTORY_ENTRIES);
        self.persist();
    }

    /// Update an entry in place; returns false for an out-of-range index
    pub fn replace(&mut self, index: usize, entry: HistoryEntry) -> bool {
        match self.entries.get_mut(index) {
            Some(slot) => {
                *slot = entry;
                self.persist();
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<HistoryEntry> {
        if index >= self.entries.len() {
            return None;
        }
        let removed = self.entries.remove(index);
        self.persist();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if self.session_only {
            return;
        }
        if let Err(e) = self.backend.remove() {
            self.degrade(e);
        }
    }

    fn persist(&mut self) {
        if self.session_only {
            return;
        }
        let record = match serde_json::to_string(&self.entries) {
            Ok(record) => record,
            Err(e) => {
                log_warn!("Failed to serialize history: {}", e);
                return;
            }
        };
        if let Err(e) = self.backend.write(&record) {
            self.degrade(e);
        }
    }

    fn degrade(&mut self, error: anyhow::Error) {
        log_warn!(
            "History persistence failed on {}, continuing in memory only: {:#}",
            self.backend.describe(),
            error
        );
        self.session_only = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend whose writes always fail, counting attempts
    #[derive(Default)]
    struct FullDiskBackend {
        writes: AtomicUsize,
    }

    impl HistoryBackend for FullDiskBackend {
        fn read(&self) -> Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, _record: &str) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("quota exceeded")
        }

        fn remove(&self) -> Result<()> {
            anyhow::bail!("quota exceeded")
        }
    }

    fn memory_store() -> (HistoryStore, Arc<MemoryHistoryBackend>) {
        let backend = Arc::new(MemoryHistoryBackend::default());
        (HistoryStore::load(backend.clone()), backend)
    }

    #[test]
    fn test_eleven_inserts_keep_ten_newest_first() {
        let (mut store, _) = memory_store();
        for i in 0..11 {
            store.save(HistoryEntry::new(format!("prompt {}", i), format!("<p>{}</p>", i)));
        }

        assert_eq!(store.len(), MAX_HISTORY_ENTRIES);
        let prompts: Vec<_> = store.entries().iter().map(|e| e.prompt.as_str()).collect();
        let expected: Vec<String> = (1..11).rev().map(|i| format!("prompt {}", i)).collect();
        assert_eq!(prompts, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_mutations_are_persisted_wholesale() {
        let (mut store, backend) = memory_store();
        store.save(HistoryEntry::new("first", "<p>1</p>"));
        store.save(HistoryEntry::new("second", "<p>2</p>"));
        store.replace(1, HistoryEntry::new("first, improved", "<p>1b</p>"));

        let reloaded = HistoryStore::load(backend.clone());
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.entries()[0].prompt, "second");
        assert_eq!(reloaded.entries()[1].prompt, "first, improved");

        store.remove(0);
        assert_eq!(HistoryStore::load(backend.clone()).len(), 1);

        store.clear();
        assert!(backend.record().is_none());
        assert!(HistoryStore::load(backend).is_empty());
    }

    #[test]
    fn test_corrupt_record_loads_empty() {
        let backend = Arc::new(MemoryHistoryBackend::with_record("{not json"));
        let store = HistoryStore::load(backend);
        assert!(store.is_empty());
        assert!(store.is_persistent());
    }

    #[test]
    fn test_oversized_record_is_truncated_on_load() {
        let entries: Vec<_> = (0..15)
            .map(|i| HistoryEntry::new(format!("p{}", i), "<p></p>"))
            .collect();
        let backend = Arc::new(MemoryHistoryBackend::with_record(
            serde_json::to_string(&entries).unwrap(),
        ));
        assert_eq!(HistoryStore::load(backend).len(), MAX_HISTORY_ENTRIES);
    }

    #[test]
    fn test_failed_write_degrades_to_session_only() {
        let backend = Arc::new(FullDiskBackend::default());
        let mut store = HistoryStore::load(backend.clone());

        store.save(HistoryEntry::new("one", "<p>1</p>"));
        store.save(HistoryEntry::new("two", "<p>2</p>"));

        assert_eq!(store.len(), 2);
        assert!(!store.is_persistent());
        // Only the first failure touches the backend
        assert_eq!(backend.writes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_out_of_range_index_is_rejected() {
        let (mut store, _) = memory_store();
        store.save(HistoryEntry::new("only", "<p></p>"));
        assert!(!store.replace(3, HistoryEntry::new("x", "y")));
        assert!(store.remove(1).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_file_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FileHistoryBackend::new(dir.path().join("nested/history.json")));

        let mut store = HistoryStore::load(backend.clone());
        store.save(HistoryEntry::new("chart of users", "<html></html>"));

        let reloaded = HistoryStore::load(backend.clone());
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.entries()[0].prompt, "chart of users");
        assert_eq!(reloaded.entries()[0].html, "<html></html>");
        assert_eq!(
            reloaded.entries()[0].timestamp.timestamp_millis(),
            store.entries()[0].timestamp.timestamp_millis()
        );
        assert!(!backend.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn test_record_uses_millisecond_timestamps() {
        let entry = HistoryEntry::new("p", "<p></p>");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["timestamp"].as_i64(), Some(entry.timestamp.timestamp_millis()));
        assert_eq!(json["html"], "<p></p>");
    }

    #[test]
    fn test_title_truncates_long_prompts() {
        let entry = HistoryEntry::new("Show a bar chart of monthly revenue", "");
        assert_eq!(entry.title(12), "Show a ba...");
        assert_eq!(entry.title(100), "Show a bar chart of monthly revenue");
    }
}
