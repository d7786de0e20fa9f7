//! Disk-backed response cache.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use parking_lot::Mutex;

use super::key::CacheKey;
use crate::error::{NetworkError, Result};
use crate::logging::targets;

const TEMP_SUFFIX: &str = ".tmp";

/// A cached response payload.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    /// The entry key.
    pub key: CacheKey,
    /// The stored response body.
    pub payload: Bytes,
    /// When the entry was stored.
    pub stored_at: SystemTime,
    /// Payload size in bytes.
    pub size_bytes: u64,
}

#[derive(Clone, Copy, Debug)]
struct EntryMeta {
    size: u64,
    stored_at: SystemTime,
}

#[derive(Default)]
struct Index {
    entries: HashMap<CacheKey, EntryMeta>,
    total: u64,
    last_stamp: Option<SystemTime>,
}

impl Index {
    fn insert(&mut self, key: CacheKey, meta: EntryMeta) {
        if let Some(old) = self.entries.insert(key, meta) {
            self.total -= old.size;
        }
        self.total += meta.size;
    }

    fn remove(&mut self, key: &CacheKey) -> Option<EntryMeta> {
        let meta = self.entries.remove(key)?;
        self.total -= meta.size;
        Some(meta)
    }

    /// A timestamp strictly after every stamp handed out so far, so that
    /// eviction order follows store order even on coarse clocks.
    fn next_stamp(&mut self) -> SystemTime {
        let now = SystemTime::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::from_nanos(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }
}

/// Persists response payloads as one file per key.
///
/// All methods block on file I/O; async callers run them on the blocking
/// pool. The index lock is only held while the index is mutated, never
/// across disk access.
pub struct CacheManager {
    dir: PathBuf,
    index: Mutex<Index>,
}

impl CacheManager {
    /// Open the cache in `dir`, creating the directory if needed.
    ///
    /// The index is rebuilt from the files found there; leftover temporary
    /// files from interrupted writes are deleted.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            NetworkError::Io(format!(
                "failed to create cache directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut index = Index::default();
        let listing = fs::read_dir(&dir).map_err(|e| {
            NetworkError::Io(format!("failed to read cache directory {}: {e}", dir.display()))
        })?;

        for entry in listing.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(TEMP_SUFFIX) {
                let _ = fs::remove_file(&path);
                continue;
            }
            let Some(key) = CacheKey::from_file_name(name) else {
                continue;
            };
            if let Ok(metadata) = entry.metadata()
                && metadata.is_file()
            {
                let stored_at = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                index.insert(
                    key,
                    EntryMeta {
                        size: metadata.len(),
                        stored_at,
                    },
                );
            }
        }

        tracing::debug!(
            target: targets::CACHE,
            dir = %dir.display(),
            entries = index.entries.len(),
            bytes = index.total,
            "opened response cache"
        );

        Ok(Self {
            dir,
            index: Mutex::new(index),
        })
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    fn temp_path(&self, key: &CacheKey) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!("{key}.{}.{n}{TEMP_SUFFIX}", std::process::id()))
    }

    /// Look up a cached payload.
    ///
    /// Read failures are logged and treated as a miss; the broken entry is
    /// dropped from the index.
    pub fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
        let meta = self.index.lock().entries.get(key).copied()?;

        match fs::read(self.entry_path(key)) {
            Ok(data) => Some(CacheEntry {
                key: key.clone(),
                size_bytes: data.len() as u64,
                payload: Bytes::from(data),
                stored_at: meta.stored_at,
            }),
            Err(e) => {
                let err = NetworkError::CacheRead(e.to_string());
                tracing::warn!(target: targets::CACHE, key = %key, error = %err, "dropping unreadable cache entry");
                let mut index = self.index.lock();
                if index
                    .entries
                    .get(key)
                    .is_some_and(|current| current.stored_at == meta.stored_at)
                {
                    index.remove(key);
                }
                None
            }
        }
    }

    /// Whether a payload is stored under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.index.lock().entries.contains_key(key)
    }

    /// Store a payload, replacing any previous entry for the key.
    ///
    /// The payload is written to a temporary file and renamed into place, so
    /// readers never observe a partial entry.
    pub fn store(&self, key: &CacheKey, payload: &[u8]) -> Result<()> {
        let temp = self.temp_path(key);
        let target = self.entry_path(key);

        let written = fs::write(&temp, payload).and_then(|()| fs::rename(&temp, &target));
        if let Err(e) = written {
            let _ = fs::remove_file(&temp);
            return Err(NetworkError::CacheWrite(format!("{key}: {e}")));
        }

        let size = payload.len() as u64;
        let total = {
            let mut index = self.index.lock();
            let stored_at = index.next_stamp();
            index.insert(key.clone(), EntryMeta { size, stored_at });
            index.total
        };

        tracing::trace!(target: targets::CACHE, key = %key, size, total, "stored response");
        Ok(())
    }

    /// Remove an entry. Returns whether it was present.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.index.lock().remove(key).is_some();
        if removed {
            remove_quietly(&self.entry_path(key));
        }
        removed
    }

    /// Delete every entry and every other file in the cache directory.
    ///
    /// Blocks until the directory is empty. Calling it on an empty cache is a
    /// no-op.
    pub fn clear_all(&self) -> Result<()> {
        {
            let mut index = self.index.lock();
            index.entries.clear();
            index.total = 0;
        }

        let listing = match fs::read_dir(&self.dir) {
            Ok(listing) => listing,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                fs::create_dir_all(&self.dir)?;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0usize;
        for entry in listing.flatten() {
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match result {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::debug!(target: targets::CACHE, removed, "cleared response cache");
        Ok(())
    }

    /// Evict entries, oldest first, until the total size is at most
    /// `max_bytes`. Returns the number of evicted entries.
    pub fn enforce_limit(&self, max_bytes: u64) -> usize {
        let victims: Vec<CacheKey> = {
            let mut index = self.index.lock();
            if index.total <= max_bytes {
                return 0;
            }

            let mut by_age: Vec<(SystemTime, CacheKey)> = index
                .entries
                .iter()
                .map(|(key, meta)| (meta.stored_at, key.clone()))
                .collect();
            by_age.sort();

            let mut victims = Vec::new();
            for (_, key) in by_age {
                if index.total <= max_bytes {
                    break;
                }
                index.remove(&key);
                victims.push(key);
            }
            victims
        };

        for key in &victims {
            remove_quietly(&self.entry_path(key));
        }

        if !victims.is_empty() {
            tracing::debug!(
                target: targets::CACHE,
                evicted = victims.len(),
                max_bytes,
                "trimmed response cache"
            );
        }
        victims.len()
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.index.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.index.lock().entries.is_empty()
    }

    /// Total size of all cached payloads in bytes.
    pub fn size_bytes(&self) -> u64 {
        self.index.lock().total
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let index = self.index.lock();
        CacheStats {
            entries: index.entries.len(),
            size_bytes: index.total,
            cache_dir: self.dir.clone(),
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CacheManager")
            .field("entries", &stats.entries)
            .field("size_mb", &stats.size_mb())
            .field("cache_dir", &self.dir)
            .finish()
    }
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != ErrorKind::NotFound
    {
        tracing::warn!(target: targets::CACHE, path = %path.display(), error = %e, "failed to delete cache file");
    }
}

/// Statistics about the response cache.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of entries in the cache.
    pub entries: usize,
    /// Current size in bytes.
    pub size_bytes: u64,
    /// Cache directory path.
    pub cache_dir: PathBuf,
}

impl CacheStats {
    /// Get the current size in megabytes.
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0 / 1024.0
    }
}
