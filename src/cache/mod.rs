//! Content-addressed analysis cache.
//!
//! Layout under the cache directory:
//!
//! ```text
//! index.json                    key -> CacheEntry
//! payloads/<key>-<seq>.json     serialized DocumentAnalysis
//! ```
//!
//! Payloads are written before their index entry. Every write gets a fresh
//! file name, so a replaced payload is never overwritten in place; the old file
//! is removed once the new entry is recorded. The in-memory index is guarded by
//! a mutex held only while the index is read or rewritten and a finished
//! payload is renamed into place; payload bytes are written without it.

mod index;
mod key;

pub use index::CacheEntry;
pub use key::{canonical_json, content_hash, CacheKey};

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::DocumentAnalysis;
use index::CacheIndex;

const INDEX_FILE: &str = "index.json";
const PAYLOAD_DIR: &str = "payloads";

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache directory
    pub dir: PathBuf,

    /// Maximum number of entries (default 1000)
    pub max_entries: usize,

    /// Share of `max_entries` evicted at once when full (default 0.2)
    pub eviction_fraction: f32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".eduparse-cache"),
            max_entries: 1000,
            eviction_fraction: 0.2,
        }
    }
}

impl CacheConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Default::default()
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_eviction_fraction(mut self, fraction: f32) -> Self {
        self.eviction_fraction = fraction;
        self
    }

    /// Entries removed per eviction batch (at least one).
    pub fn eviction_batch(&self) -> usize {
        let fraction = self.eviction_fraction.clamp(0.0, 1.0);
        ((self.max_entries as f32 * fraction).ceil() as usize).max(1)
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub dir: PathBuf,
    pub entries: usize,
    pub max_entries: usize,
    pub total_bytes: u64,
}

/// Persistent, size-bounded cache of completed analyses.
pub struct AnalysisCache {
    config: CacheConfig,
    index: Mutex<CacheIndex>,
}

impl AnalysisCache {
    /// Open or create a cache. A corrupt index starts the cache empty.
    pub fn open(config: CacheConfig) -> Result<Self> {
        if config.max_entries == 0 {
            return Err(Error::InvalidOptions("cache max_entries must be positive".into()));
        }
        fs::create_dir_all(config.dir.join(PAYLOAD_DIR))?;

        let index = match CacheIndex::load(&config.dir.join(INDEX_FILE)) {
            Ok(index) => index,
            Err(Error::CacheCorruption(reason)) => {
                log::warn!("cache index unreadable, starting empty: {}", reason);
                CacheIndex::new()
            }
            Err(e) => return Err(e),
        };
        log::debug!(
            "cache opened at {} with {} entries",
            config.dir.display(),
            index.entries.len()
        );

        Ok(Self {
            config,
            index: Mutex::new(index),
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn index_path(&self) -> PathBuf {
        self.config.dir.join(INDEX_FILE)
    }

    fn payload_dir(&self) -> PathBuf {
        self.config.dir.join(PAYLOAD_DIR)
    }

    fn payload_path(&self, entry: &CacheEntry) -> PathBuf {
        self.payload_dir().join(&entry.payload)
    }

    /// Look up the analysis for content and options.
    pub fn get<O: Serialize + ?Sized>(&self, content: &[u8], options: &O) -> Option<DocumentAnalysis> {
        match CacheKey::derive(content, options) {
            Ok(key) => self.get_by_key(&key),
            Err(e) => {
                log::warn!("cache key derivation failed: {}", e);
                None
            }
        }
    }

    /// Store the analysis for content and options.
    pub fn set<O: Serialize + ?Sized>(
        &self,
        content: &[u8],
        options: &O,
        analysis: &DocumentAnalysis,
    ) -> Result<()> {
        let key = CacheKey::derive(content, options)?;
        self.set_by_key(&key, analysis)
    }

    /// Look up by key. Unreadable entries are purged and reported as misses.
    pub fn get_by_key(&self, key: &CacheKey) -> Option<DocumentAnalysis> {
        let entry = self.index.lock().entries.get(key.as_str()).cloned();
        let Some(entry) = entry else {
            log::debug!("cache miss {}", key);
            return None;
        };

        match self.read_payload(&entry) {
            Ok(analysis) => {
                let mut index = self.index.lock();
                index.touch(key.as_str());
                if let Err(e) = index.save(&self.index_path()) {
                    log::warn!("cache index write failed: {}", e);
                }
                log::debug!("cache hit {}", key);
                Some(analysis)
            }
            Err(e) => {
                // Only purge the entry that was read; a concurrent set may
                // already have replaced it and removed its payload.
                let mut index = self.index.lock();
                let unchanged = index
                    .entries
                    .get(key.as_str())
                    .map(|current| current.payload == entry.payload);
                match unchanged {
                    Some(true) => {
                        log::warn!("purging cache entry {}: {}", key, e);
                        index.entries.remove(key.as_str());
                        self.remove_payload(&entry);
                        if let Err(e) = index.save(&self.index_path()) {
                            log::warn!("cache index write failed: {}", e);
                        }
                    }
                    Some(false) => log::debug!("cache entry {} replaced during read", key),
                    None => {}
                }
                None
            }
        }
    }

    fn read_payload(&self, entry: &CacheEntry) -> Result<DocumentAnalysis> {
        let data = fs::read(self.payload_path(entry))
            .map_err(|e| Error::CacheCorruption(format!("payload: {}", e)))?;
        if content_hash(&data) != entry.checksum {
            return Err(Error::CacheCorruption("payload checksum mismatch".into()));
        }
        serde_json::from_slice(&data).map_err(|e| Error::CacheCorruption(format!("payload: {}", e)))
    }

    /// Store by key. Incomplete analyses are skipped.
    pub fn set_by_key(&self, key: &CacheKey, analysis: &DocumentAnalysis) -> Result<()> {
        if analysis.incomplete {
            log::debug!("not caching incomplete analysis {}", key);
            return Ok(());
        }

        let data = serde_json::to_vec(analysis)?;
        let checksum = content_hash(&data);
        let mut file = tempfile::NamedTempFile::new_in(self.payload_dir())?;
        file.write_all(&data)?;
        file.flush()?;

        let mut index = self.index.lock();
        if !index.entries.contains_key(key.as_str()) && index.entries.len() >= self.config.max_entries {
            let evicted = index.evict_oldest(self.config.eviction_batch());
            log::info!("cache full, evicted {} entries", evicted.len());
            for entry in &evicted {
                self.remove_payload(entry);
            }
        }

        let now = Utc::now();
        let sequence = index.tick();
        let created_at = index
            .entries
            .get(key.as_str())
            .map_or(now, |existing| existing.created_at);
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            created_at,
            last_accessed: now,
            size_bytes: data.len() as u64,
            checksum,
            payload: format!("{}-{}.json", key, sequence),
            sequence,
        };
        file.persist(self.payload_path(&entry)).map_err(|e| Error::Io(e.error))?;

        if let Some(previous) = index.entries.insert(key.as_str().to_string(), entry) {
            self.remove_payload(&previous);
        }
        index.save(&self.index_path())
    }

    fn remove_payload(&self, entry: &CacheEntry) {
        match fs::remove_file(self.payload_path(entry)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("could not remove cache payload {}: {}", entry.payload, e),
        }
    }

    fn purge(&self, key: &str) {
        let mut index = self.index.lock();
        if let Some(entry) = index.entries.remove(key) {
            self.remove_payload(&entry);
            if let Err(e) = index.save(&self.index_path()) {
                log::warn!("cache index write failed: {}", e);
            }
        }
    }

    /// Remove one entry.
    pub fn remove(&self, key: &CacheKey) {
        self.purge(key.as_str());
    }

    /// Whether the index holds a key.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.lock().entries.contains_key(key.as_str())
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<()> {
        let mut index = self.index.lock();
        for entry in index.entries.values() {
            self.remove_payload(entry);
        }
        index.entries.clear();
        index.save(&self.index_path())
    }

    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the index metadata, least recently used first.
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.index.lock().entries.values().cloned().collect();
        entries.sort_by(|a, b| {
            a.last_accessed
                .cmp(&b.last_accessed)
                .then(a.sequence.cmp(&b.sequence))
        });
        entries
    }

    pub fn stats(&self) -> CacheStats {
        let index = self.index.lock();
        CacheStats {
            dir: self.config.dir.clone(),
            entries: index.entries.len(),
            max_entries: self.config.max_entries,
            total_bytes: index.total_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    use crate::detect::DocumentFormat;
    use crate::model::{DocumentType, NormalizedDocument};

    fn analysis(tag: &str) -> DocumentAnalysis {
        DocumentAnalysis {
            fingerprint: content_hash(tag.as_bytes()),
            format: DocumentFormat::Text,
            document: NormalizedDocument::new(DocumentFormat::Text),
            document_type: DocumentType::Unknown,
            questions: Vec::new(),
            learning_objectives: Vec::new(),
            concepts: vec![tag.to_string()],
            enrichment: None,
            incomplete: false,
        }
    }

    fn open(dir: &Path, max: usize) -> AnalysisCache {
        AnalysisCache::open(CacheConfig::new(dir).with_max_entries(max)).unwrap()
    }

    #[test]
    fn test_get_after_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let options = serde_json::json!({"tables": true});

        assert!(cache.get(b"doc", &options).is_none());
        cache.set(b"doc", &options, &analysis("a")).unwrap();
        assert_eq!(cache.get(b"doc", &options).unwrap().concepts, vec!["a"]);

        let other = serde_json::json!({"tables": false});
        assert!(cache.get(b"doc", &other).is_none());
    }

    #[test]
    fn test_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let options = serde_json::json!({});
        open(dir.path(), 10)
            .set(b"doc", &options, &analysis("a"))
            .unwrap();

        let cache = open(dir.path(), 10);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(b"doc", &options).is_some());
    }

    #[test]
    fn test_batch_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let options = serde_json::json!({});

        for i in 0..10 {
            cache.set(format!("doc{}", i).as_bytes(), &options, &analysis("x")).unwrap();
        }
        // Touch the two oldest so they survive.
        assert!(cache.get(b"doc0", &options).is_some());
        assert!(cache.get(b"doc1", &options).is_some());

        cache.set(b"doc10", &options, &analysis("x")).unwrap();
        assert_eq!(cache.len(), 9);
        assert!(cache.get(b"doc0", &options).is_some());
        assert!(cache.get(b"doc2", &options).is_none());
        assert!(cache.get(b"doc3", &options).is_none());
        assert!(cache.get(b"doc4", &options).is_some());

        for i in 11..30 {
            cache.set(format!("doc{}", i).as_bytes(), &options, &analysis("x")).unwrap();
            assert!(cache.len() <= 10);
        }
        let payloads = fs::read_dir(dir.path().join(PAYLOAD_DIR)).unwrap().count();
        assert_eq!(payloads, cache.len());
    }

    #[test]
    fn test_missing_payload_self_heals() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let options = serde_json::json!({});
        let key = CacheKey::derive(b"doc", &options).unwrap();

        cache.set(b"doc", &options, &analysis("a")).unwrap();
        fs::remove_file(cache.payload_path(&cache.entries()[0])).unwrap();

        assert!(cache.get(b"doc", &options).is_none());
        assert!(!cache.contains(&key));

        cache.set(b"doc", &options, &analysis("b")).unwrap();
        assert_eq!(cache.get(b"doc", &options).unwrap().concepts, vec!["b"]);
    }

    #[test]
    fn test_tampered_payload_is_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let options = serde_json::json!({});
        let key = CacheKey::derive(b"doc", &options).unwrap();

        cache.set(b"doc", &options, &analysis("a")).unwrap();
        fs::write(cache.payload_path(&cache.entries()[0]), b"{}").unwrap();
        assert!(cache.get(b"doc", &options).is_none());
        assert!(!cache.contains(&key));
    }

    #[test]
    fn test_incomplete_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let mut partial = analysis("a");
        partial.incomplete = true;

        cache.set(b"doc", &serde_json::json!({}), &partial).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(INDEX_FILE), b"garbage").unwrap();
        let cache = open(dir.path(), 10);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        cache.set(b"a", &serde_json::json!({}), &analysis("a")).unwrap();
        cache.set(b"b", &serde_json::json!({}), &analysis("b")).unwrap();

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert!(stats.total_bytes > 0);

        cache.clear().unwrap();
        assert!(cache.is_empty());
        assert_eq!(fs::read_dir(dir.path().join(PAYLOAD_DIR)).unwrap().count(), 0);
    }

    #[test]
    fn test_eviction_batch_size() {
        assert_eq!(CacheConfig::default().eviction_batch(), 200);
        assert_eq!(CacheConfig::default().with_max_entries(3).eviction_batch(), 1);
        assert_eq!(CacheConfig::default().with_max_entries(10).eviction_batch(), 2);
    }

    #[test]
    fn test_concurrent_sets() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 100);
        std::thread::scope(|s| {
            for t in 0..4 {
                let cache = &cache;
                s.spawn(move || {
                    for i in 0..10 {
                        let content = format!("doc-{}-{}", t, i);
                        cache
                            .set(content.as_bytes(), &serde_json::json!({}), &analysis(&content))
                            .unwrap();
                    }
                });
            }
        });
        assert_eq!(cache.len(), 40);
        assert_eq!(open(dir.path(), 100).len(), 40);
    }

    #[test]
    fn test_concurrent_get_keeps_fresh_set() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let options = serde_json::json!({});
        let key = CacheKey::derive(b"doc", &options).unwrap();
        cache.set(b"doc", &options, &analysis("v0")).unwrap();

        std::thread::scope(|s| {
            let cache = &cache;
            let options = &options;
            s.spawn(move || {
                for i in 1..=500 {
                    cache.set(b"doc", options, &analysis(&format!("v{}", i))).unwrap();
                }
            });
            s.spawn(move || {
                for _ in 0..500 {
                    if let Some(hit) = cache.get(b"doc", options) {
                        assert!(hit.concepts[0].starts_with('v'));
                    }
                }
            });
        });

        assert!(cache.contains(&key));
        assert_eq!(cache.get(b"doc", &options).unwrap().concepts, vec!["v500"]);
        assert_eq!(fs::read_dir(dir.path().join(PAYLOAD_DIR)).unwrap().count(), 1);
    }

    #[test]
    fn test_replacing_entry_removes_old_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path(), 10);
        let options = serde_json::json!({});

        cache.set(b"doc", &options, &analysis("a")).unwrap();
        let first = cache.entries().remove(0);
        cache.set(b"doc", &options, &analysis("b")).unwrap();
        let second = cache.entries().remove(0);

        assert_ne!(first.payload, second.payload);
        assert_eq!(first.created_at, second.created_at);
        assert!(!cache.payload_path(&first).exists());
        assert_eq!(cache.get(b"doc", &options).unwrap().concepts, vec!["b"]);
    }
}
