//! Cache key derivation.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::Result;

/// Hex SHA-256 of raw bytes.
pub fn content_hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Serialize options so that equal option sets produce equal strings
/// regardless of field or map insertion order.
pub fn canonical_json<O: Serialize + ?Sized>(options: &O) -> Result<String> {
    let value = sort_keys(serde_json::to_value(options)?);
    Ok(serde_json::to_string(&value)?)
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Two-stage cache key: `hash(hash(content) ++ canonical(options))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    fingerprint: String,
    key: String,
}

impl CacheKey {
    /// Derive the key for content and options.
    pub fn derive<O: Serialize + ?Sized>(content: &[u8], options: &O) -> Result<Self> {
        Self::from_fingerprint(content_hash(content), options)
    }

    /// Derive the key from an already computed content hash.
    pub fn from_fingerprint<O: Serialize + ?Sized>(fingerprint: String, options: &O) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update(fingerprint.as_bytes());
        hasher.update(canonical_json(options)?.as_bytes());
        Ok(Self {
            key: hex::encode(hasher.finalize()),
            fingerprint,
        })
    }

    /// Stage-one hash of the content.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}
