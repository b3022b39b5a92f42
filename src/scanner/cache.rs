//! Result cache keyed by absolute file path.
//!
//! Each entry stores the findings of a prior scan together with a cheap
//! fingerprint of the file: a fast hash over (size, modification time). The
//! fingerprint deliberately avoids reading content, trading a small
//! false-negative risk (identical size and mtime, different content) for
//! probe speed; this is a known, accepted weak point.
//!
//! Caching is always best-effort: a corrupt store degrades to an empty cache,
//! a failed stat makes `set` a no-op, and nothing here ever fails a scan.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::types::Finding;

/// Bump when the persisted document layout changes; a mismatch on load resets
/// to an empty cache.
const CACHE_VERSION: u32 = 1;

/// Fast proxy for file-content identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(u64);

impl Fingerprint {
    /// Hash of (size, mtime). Content changes that preserve both exactly are
    /// not detected.
    pub fn new(meta: &fs::Metadata) -> Self {
        let mut hasher = DefaultHasher::new();
        meta.len().hash(&mut hasher);
        if let Ok(mtime) = meta.modified() {
            if let Ok(since_epoch) = mtime.duration_since(UNIX_EPOCH) {
                since_epoch.as_nanos().hash(&mut hasher);
            }
        }
        Fingerprint(hasher.finish())
    }
}

/// One cached scan result. Overwritten on every successful scan of the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub findings: Vec<Finding>,
    pub cached_at: SystemTime,
}

impl CacheEntry {
    fn is_expired(&self, retention: Duration) -> bool {
        self.cached_at
            .elapsed()
            .map(|age| age > retention)
            .unwrap_or(true)
    }
}

/// The persisted cache document.
#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    timestamp: SystemTime,
    entries: Vec<(PathBuf, CacheEntry)>,
}

/// Counters reported by [`ResultCache::stats`].
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Percentage with two-decimal rounding
    pub hit_rate: f64,
    pub live_entries: usize,
    pub expired_pending: usize,
    pub estimated_size_bytes: usize,
}

/// Findings cache with (size, mtime) invalidation and explicit persistence.
///
/// The in-memory map is authoritative during a run; `save()` flushes it. One
/// instance exclusively owns its backing store for the process lifetime.
#[derive(Debug)]
pub struct ResultCache {
    store_path: PathBuf,
    entries: HashMap<PathBuf, CacheEntry>,
    retention: Duration,
    hits: u64,
    misses: u64,
    dirty: bool,
}

impl ResultCache {
    /// Open a cache backed by `store_path`, loading any prior state. A
    /// missing, corrupt, or version-mismatched store yields an empty cache.
    pub fn new(store_path: PathBuf, retention: Duration) -> Self {
        let entries = Self::load_store(&store_path);
        Self {
            store_path,
            entries,
            retention,
            hits: 0,
            misses: 0,
            dirty: false,
        }
    }

    fn load_store(store_path: &Path) -> HashMap<PathBuf, CacheEntry> {
        let raw = match fs::read(store_path) {
            Ok(raw) => raw,
            Err(_) => return HashMap::new(),
        };
        match serde_json::from_slice::<CacheDocument>(&raw) {
            Ok(doc) if doc.version == CACHE_VERSION => doc.entries.into_iter().collect(),
            Ok(doc) => {
                warn!(
                    found = doc.version,
                    expected = CACHE_VERSION,
                    "cache store version mismatch, starting empty"
                );
                HashMap::new()
            }
            Err(e) => {
                warn!(store = %store_path.display(), error = %e, "corrupt cache store, starting empty");
                HashMap::new()
            }
        }
    }

    /// Probe the cache for a file. A miss - never an error - when no entry
    /// exists, the entry expired, the file vanished, or the fingerprint
    /// differs; any of these also evicts the stale entry.
    pub fn get(&mut self, path: &Path) -> Option<Vec<Finding>> {
        let entry = match self.entries.get(path) {
            Some(entry) => entry,
            None => {
                self.misses += 1;
                return None;
            }
        };

        if entry.is_expired(self.retention) {
            debug!(file = %path.display(), "cache entry expired");
            self.evict(path);
            return None;
        }

        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => {
                debug!(file = %path.display(), "cached file no longer exists");
                self.evict(path);
                return None;
            }
        };

        if Fingerprint::new(&meta) != entry.fingerprint {
            debug!(file = %path.display(), "fingerprint changed, invalidating");
            self.evict(path);
            return None;
        }

        self.hits += 1;
        Some(entry.findings.clone())
    }

    fn evict(&mut self, path: &Path) {
        self.entries.remove(path);
        self.misses += 1;
        self.dirty = true;
    }

    /// Store findings for a file. Silently a no-op when the file cannot be
    /// stat'ed; caching must never fail the scan. Last write wins.
    pub fn set(&mut self, path: &Path, findings: Vec<Finding>) {
        let meta = match fs::metadata(path) {
            Ok(meta) => meta,
            Err(_) => return,
        };
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry {
                fingerprint: Fingerprint::new(&meta),
                findings,
                cached_at: SystemTime::now(),
            },
        );
        self.dirty = true;
    }

    /// Drop entries that expired or whose file vanished or changed.
    pub fn cleanup(&mut self) {
        let retention = self.retention;
        let before = self.entries.len();
        self.entries.retain(|path, entry| {
            if entry.is_expired(retention) {
                return false;
            }
            match fs::metadata(path) {
                Ok(meta) => Fingerprint::new(&meta) == entry.fingerprint,
                Err(_) => false,
            }
        });
        if self.entries.len() != before {
            self.dirty = true;
        }
    }

    /// Remove every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.dirty = true;
        }
    }

    /// Flush to the backing store. Runs `cleanup()` first and is a no-op when
    /// nothing changed since the last save.
    pub fn save(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.cleanup();
        let doc = CacheDocument {
            version: CACHE_VERSION,
            timestamp: SystemTime::now(),
            entries: self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        if let Some(parent) = self.store_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create cache directory {}", parent.display()))?;
        }
        let raw = serde_json::to_vec(&doc).context("cannot serialize cache")?;
        fs::write(&self.store_path, raw)
            .with_context(|| format!("cannot write cache store {}", self.store_path.display()))?;
        self.dirty = false;
        Ok(())
    }

    /// Statistics snapshot. Does not mutate state; only `get` moves the
    /// hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        let total = self.hits + self.misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            ((self.hits as f64 / total as f64) * 10_000.0).round() / 100.0
        };
        let expired_pending = self
            .entries
            .values()
            .filter(|e| e.is_expired(self.retention))
            .count();
        let estimated_size_bytes = serde_json::to_vec(&CacheDocument {
            version: CACHE_VERSION,
            timestamp: SystemTime::now(),
            entries: self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        })
        .map(|raw| raw.len())
        .unwrap_or(0);
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            live_entries: self.entries.len() - expired_pending,
            expired_pending,
            estimated_size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
