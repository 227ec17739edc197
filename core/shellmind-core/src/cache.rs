//! TTL memo of (prefix, context fingerprint) → suggestion.
//!
//! Expired entries are evicted lazily on read and by `sweep`. Since every
//! keystroke is served by a fresh process, the store can be backed by a
//! snapshot file; loading and flushing it are best-effort and never fail a
//! request.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub prefix: String,
    pub fingerprint: String,
    pub suggestion: String,
    /// Unix milliseconds.
    pub expires_at: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.expires_at
    }
}

type Key = (String, String);

pub struct CacheStore {
    entries: HashMap<Key, CacheEntry>,
    ttl: Duration,
    snapshot: Option<PathBuf>,
    dirty: bool,
}

impl CacheStore {
    /// Memory-only store.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            snapshot: None,
            dirty: false,
        }
    }

    /// Store backed by `path`. A missing or corrupt snapshot starts empty.
    pub fn with_snapshot(ttl: Duration, path: PathBuf) -> Self {
        Self::with_snapshot_at(ttl, path, Utc::now())
    }

    pub fn with_snapshot_at(ttl: Duration, path: PathBuf, now: DateTime<Utc>) -> Self {
        let loaded: Vec<CacheEntry> = match fs_err::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
                tracing::debug!(error = %err, "Ignoring corrupt cache snapshot");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        };
        let total = loaded.len();
        let entries: HashMap<Key, CacheEntry> = loaded
            .into_iter()
            .filter(|e| !e.is_expired(now))
            .map(|e| ((e.prefix.clone(), e.fingerprint.clone()), e))
            .collect();
        let dirty = entries.len() != total;

        Self {
            entries,
            ttl,
            snapshot: Some(path),
            dirty,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, prefix: &str, fingerprint: &str) -> Option<String> {
        self.get_at(prefix, fingerprint, Utc::now())
    }

    /// Returns the unexpired suggestion for the key. An expired entry is
    /// removed and reported as a miss.
    pub fn get_at(
        &mut self,
        prefix: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let key = (prefix.to_string(), fingerprint.to_string());
        let entry = self.entries.get(&key)?;
        if entry.is_expired(now) {
            self.entries.remove(&key);
            self.dirty = true;
            return None;
        }
        Some(entry.suggestion.clone())
    }

    pub fn insert(&mut self, prefix: &str, fingerprint: &str, suggestion: &str) {
        self.insert_at(prefix, fingerprint, suggestion, Utc::now());
    }

    pub fn insert_at(
        &mut self,
        prefix: &str,
        fingerprint: &str,
        suggestion: &str,
        now: DateTime<Utc>,
    ) {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        let entry = CacheEntry {
            prefix: prefix.to_string(),
            fingerprint: fingerprint.to_string(),
            suggestion: suggestion.to_string(),
            expires_at: now.timestamp_millis().saturating_add(ttl_ms),
        };
        self.entries
            .insert((entry.prefix.clone(), entry.fingerprint.clone()), entry);
        self.dirty = true;
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn sweep_at(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before - self.entries.len();
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    /// Writes the snapshot if anything changed. Failures are logged only.
    pub fn flush(&mut self) {
        let Some(path) = self.snapshot.as_ref() else {
            return;
        };
        if !self.dirty {
            return;
        }
        let mut entries: Vec<&CacheEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| (&a.prefix, &a.fingerprint).cmp(&(&b.prefix, &b.fingerprint)));

        let result = serde_json::to_vec(&entries)
            .map_err(|e| crate::error::ShellmindError::json("serializing cache", e))
            .and_then(|bytes| write_atomic(path, &bytes));
        match result {
            Ok(()) => self.dirty = false,
            Err(err) => tracing::warn!(error = %err, "Cache snapshot write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn hit_within_ttl_and_miss_after() {
        let mut cache = CacheStore::new(Duration::from_secs(60));
        cache.insert_at("git sta", "fp", "git status", at(0));

        assert_eq!(cache.get_at("git sta", "fp", at(59)).as_deref(), Some("git status"));
        assert_eq!(cache.get_at("git sta", "fp", at(60)), None);
        assert!(cache.is_empty(), "expired entry should be evicted on read");
    }

    #[test]
    fn fingerprint_is_part_of_the_key() {
        let mut cache = CacheStore::new(Duration::from_secs(60));
        cache.insert_at("cargo b", "rust-main", "cargo build", at(0));
        assert_eq!(cache.get_at("cargo b", "other", at(1)), None);
        assert_eq!(
            cache.get_at("cargo b", "rust-main", at(1)).as_deref(),
            Some("cargo build")
        );
    }

    #[test]
    fn sweep_removes_only_expired() {
        let mut cache = CacheStore::new(Duration::from_secs(10));
        cache.insert_at("a1", "fp", "a1 x", at(0));
        cache.insert_at("b1", "fp", "b1 x", at(8));
        assert_eq!(cache.sweep_at(at(12)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn snapshot_round_trips_and_drops_expired_on_load() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let path = tmp.path().join("cache").join("completions.json");

        let mut cache = CacheStore::with_snapshot_at(Duration::from_secs(60), path.clone(), at(0));
        cache.insert_at("docker ps", "fp", "docker ps -a", at(0));
        cache.insert_at("npm r", "fp", "npm run dev", at(30));
        cache.flush();

        let mut reloaded =
            CacheStore::with_snapshot_at(Duration::from_secs(60), path.clone(), at(70));
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get_at("npm r", "fp", at(70)).as_deref(),
            Some("npm run dev")
        );
    }

    #[test]
    fn corrupt_snapshot_starts_empty() {
        let tmp = tempfile::tempdir().expect("temp dir");
        let path = tmp.path().join("completions.json");
        fs_err::write(&path, "{not json").expect("write");
        let cache = CacheStore::with_snapshot(Duration::from_secs(60), path);
        assert!(cache.is_empty());
    }

    #[test]
    fn flush_failure_is_swallowed() {
        let tmp = tempfile::tempdir().expect("temp dir");
        // Parent "directory" is a regular file, so the write must fail.
        let blocker = tmp.path().join("blocker");
        fs_err::write(&blocker, "x").expect("write");
        let mut cache =
            CacheStore::with_snapshot(Duration::from_secs(60), blocker.join("completions.json"));
        cache.insert("ls -", "fp", "ls -la");
        cache.flush();
        assert_eq!(cache.get("ls -", "fp").as_deref(), Some("ls -la"));
    }
}
