//! Integration tests for the analysis cache.

use std::collections::BTreeSet;
use std::fs;

use eduparse::cache::{content_hash, AnalysisCache, CacheConfig, CacheEntry};
use eduparse::{analyze_bytes, DocumentAnalysis, ParseOptions};

fn analysis(text: &str) -> DocumentAnalysis {
    analyze_bytes(text.as_bytes(), Some("txt")).unwrap()
}

fn rank(entry: &CacheEntry) -> (chrono::DateTime<chrono::Utc>, u64) {
    (entry.last_accessed, entry.sequence)
}

#[test]
fn test_get_after_set_and_option_sensitivity() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AnalysisCache::open(CacheConfig::new(dir.path())).unwrap();
    let content = b"1. What is 2+2?\nA. 3\nB. 4";
    let stored = analysis("1. What is 2+2?\nA. 3\nB. 4");

    let defaults = ParseOptions::default();
    cache.set(content, &defaults, &stored).unwrap();
    assert_eq!(cache.get(content, &defaults), Some(stored));

    let other = ParseOptions::default().with_tables(false);
    assert_eq!(cache.get(content, &other), None);
}

#[test]
fn test_eviction_bound_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let max = 10;
    let cache = AnalysisCache::open(CacheConfig::new(dir.path()).with_max_entries(max)).unwrap();
    let payload = analysis("notes");

    for i in 0..(max + 7) {
        let before: Vec<CacheEntry> = cache.entries();
        cache.set(format!("doc-{}", i).as_bytes(), &(), &payload).unwrap();
        let after: Vec<CacheEntry> = cache.entries();
        assert!(after.len() <= max);

        let kept: BTreeSet<&str> = after.iter().map(|e| e.key.as_str()).collect();
        let evicted: Vec<&CacheEntry> = before.iter().filter(|e| !kept.contains(e.key.as_str())).collect();
        if let Some(newest_evicted) = evicted.iter().map(|e| rank(e)).max() {
            for entry in after.iter().filter(|e| before.iter().any(|b| b.key == e.key)) {
                assert!(rank(entry) > newest_evicted);
            }
        }

        // Keep doc-0 hot so it survives every eviction.
        cache.get(b"doc-0", &()).unwrap();
    }

    assert!(cache.get(b"doc-0", &()).is_some());
    assert!(cache.get(b"doc-1", &()).is_none());
    let payloads = fs::read_dir(dir.path().join("payloads")).unwrap().count();
    assert_eq!(payloads, cache.len());
}

#[test]
fn test_deleted_payload_self_heals() {
    let dir = tempfile::tempdir().unwrap();
    let cache = AnalysisCache::open(CacheConfig::new(dir.path())).unwrap();
    let stored = analysis("Explain gravity.");
    cache.set(b"gravity", &(), &stored).unwrap();

    for entry in fs::read_dir(dir.path().join("payloads")).unwrap() {
        fs::remove_file(entry.unwrap().path()).unwrap();
    }

    assert!(cache.get(b"gravity", &()).is_none());
    assert!(cache.is_empty());

    cache.set(b"gravity", &(), &stored).unwrap();
    assert_eq!(cache.get(b"gravity", &()), Some(stored));
}

#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let stored = analysis("Fractions");
    {
        let cache = AnalysisCache::open(CacheConfig::new(dir.path())).unwrap();
        cache.set(b"fractions", &(), &stored).unwrap();
    }

    let cache = AnalysisCache::open(CacheConfig::new(dir.path())).unwrap();
    assert_eq!(cache.len(), 1);
    let hit = cache.get(b"fractions", &()).unwrap();
    assert_eq!(hit.fingerprint, content_hash(b"Fractions"));
}
