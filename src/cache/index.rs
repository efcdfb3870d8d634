//! Persistent cache index.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const INDEX_VERSION: u32 = 2;

/// Metadata for one cached payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub size_bytes: u64,
    /// Hex SHA-256 of the payload file
    pub checksum: String,
    /// Payload file name, unique per stored write
    pub payload: String,
    /// Logical access clock; orders entries touched within the same instant
    pub sequence: u64,
}

/// Key to metadata map, persisted as `index.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct CacheIndex {
    version: u32,
    next_sequence: u64,
    pub entries: BTreeMap<String, CacheEntry>,
}

impl CacheIndex {
    pub fn new() -> Self {
        Self {
            version: INDEX_VERSION,
            ..Default::default()
        }
    }

    /// Load the index; a missing file is an empty index.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::new()),
            Err(e) => return Err(e.into()),
        };

        let index: CacheIndex = serde_json::from_slice(&data)
            .map_err(|e| Error::CacheCorruption(format!("index: {}", e)))?;
        if index.version != INDEX_VERSION {
            return Err(Error::CacheCorruption(format!(
                "index version {} (expected {})",
                index.version, INDEX_VERSION
            )));
        }
        Ok(index)
    }

    /// Write the index through a temporary file and rename it into place.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer(&mut file, self)?;
        file.flush()?;
        file.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn tick(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    pub fn touch(&mut self, key: &str) {
        let seq = self.tick();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.last_accessed = Utc::now();
            entry.sequence = seq;
        }
    }

    /// Remove the `count` least recently used entries and return them.
    pub fn evict_oldest(&mut self, count: usize) -> Vec<CacheEntry> {
        let mut order: Vec<(DateTime<Utc>, u64, String)> = self
            .entries
            .values()
            .map(|e| (e.last_accessed, e.sequence, e.key.clone()))
            .collect();
        order.sort();

        order
            .into_iter()
            .take(count)
            .filter_map(|(_, _, key)| self.entries.remove(&key))
            .collect()
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.values().map(|e| e.size_bytes).sum()
    }
}
