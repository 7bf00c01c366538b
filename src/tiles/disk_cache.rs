//! Persistent tile cache on the local filesystem.
//!
//! Files live at `{cache_dir}/{server_id}/z{zoom}_x{x}_y{y}_{url_hash}.png`.
//! Access order for eviction is kept in a small JSON index next to them, so
//! least-recently-used ordering survives restarts and does not depend on the
//! filesystem recording access times. Files of the minimum zoom level are
//! preload tiles and are never evicted.

use crate::core::config::TileStreamConfig;
use crate::core::constants::CACHE_INDEX_FILE;
use crate::core::geo::TileKey;
use crate::prelude::{Arc, Duration, HashMap, HashSet, Mutex, SystemTime};
use crate::runtime::{self, AsyncSpawner};
use crate::{Result, TileError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    size: u64,
    /// Milliseconds since the Unix epoch
    last_access: u64,
}

/// Outcome of one [`DiskCache::enforce_budget`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Eviction {
    pub removed: usize,
    pub freed_bytes: u64,
    pub usage_bytes: u64,
}

/// Cloneable handle; clones share one index and usage counter.
#[derive(Clone)]
pub struct DiskCache {
    inner: Arc<Inner>,
}

struct Inner {
    dir: PathBuf,
    url_hash: String,
    preload_prefix: String,
    stale_after: Duration,
    index: Mutex<HashMap<String, IndexEntry>>,
    usage: AtomicU64,
    /// Usage left by the last eviction pass; preload files can hold it above
    /// the budget
    settled: AtomicU64,
    enforcing: AtomicBool,
    spawner: Arc<dyn AsyncSpawner>,
}

impl std::fmt::Debug for DiskCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskCache")
            .field("dir", &self.inner.dir)
            .field("usage", &self.usage_bytes())
            .finish()
    }
}

impl DiskCache {
    /// Open (creating if needed) the cache directory for the configured server
    pub fn open(config: &TileStreamConfig, spawner: Arc<dyn AsyncSpawner>) -> Result<Self> {
        let root = config
            .cache_dir
            .as_ref()
            .ok_or_else(|| TileError::Config("disk cache needs cache_dir".into()))?;
        let dir = root.join(&config.server_id);
        fs::create_dir_all(&dir)?;

        let index = load_index(&dir);
        let cache = Self {
            inner: Arc::new(Inner {
                dir,
                url_hash: config.url_hash(),
                preload_prefix: format!("z{}_", config.min_zoom),
                stale_after: config.stale_after(),
                index: Mutex::new(index),
                usage: AtomicU64::new(0),
                settled: AtomicU64::new(0),
                enforcing: AtomicBool::new(false),
                spawner,
            }),
        };
        let usage: u64 = cache.scan()?.iter().map(|f| f.size).sum();
        cache.inner.usage.store(usage, Ordering::Relaxed);
        log::info!(
            "disk cache at {} holds {} bytes",
            cache.inner.dir.display(),
            usage
        );
        Ok(cache)
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    pub fn file_name(&self, key: TileKey) -> String {
        format!(
            "z{}_x{}_y{}_{}.png",
            key.zoom, key.x, key.y, self.inner.url_hash
        )
    }

    pub fn path_for(&self, key: TileKey) -> PathBuf {
        self.inner.dir.join(self.file_name(key))
    }

    pub fn is_preload(&self, file_name: &str) -> bool {
        file_name.starts_with(&self.inner.preload_prefix)
    }

    /// Cached bytes for `key` if present and not older than the staleness
    /// window. A hit refreshes the entry's access time.
    pub fn get(&self, key: TileKey) -> Option<Vec<u8>> {
        let path = self.path_for(key);
        let modified = fs::metadata(&path).and_then(|m| m.modified()).ok()?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO);
        if age > self.inner.stale_after {
            log::debug!("cached {} is stale ({:?} old)", key, age);
            return None;
        }

        match fs::read(&path) {
            Ok(bytes) => {
                self.record_access(self.file_name(key), bytes.len() as u64, SystemTime::now());
                Some(bytes)
            }
            Err(e) => {
                log::warn!("failed to read cached {}: {}", key, e);
                None
            }
        }
    }

    /// Persist `bytes` in the background. The usage counter is bumped now.
    pub fn put(&self, key: TileKey, bytes: Vec<u8>) {
        self.inner
            .usage
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        let cache = self.clone();
        runtime::spawn_blocking(self.inner.spawner.as_ref(), move || {
            if let Err(e) = cache.write(key, &bytes) {
                log::warn!("failed to cache {}: {}", key, e);
            }
        });
    }

    /// Synchronous write. Leaves the usage counter alone.
    pub fn write(&self, key: TileKey, bytes: &[u8]) -> Result<()> {
        fs::write(self.path_for(key), bytes)?;
        self.record_access(self.file_name(key), bytes.len() as u64, SystemTime::now());
        Ok(())
    }

    pub fn remove(&self, key: TileKey) -> Result<()> {
        let name = self.file_name(key);
        match fs::remove_file(self.inner.dir.join(&name)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if let Some(entry) = self.lock_index().remove(&name) {
            self.sub_usage(entry.size);
        }
        Ok(())
    }

    /// Override the recorded access time of `key`
    pub fn touch(&self, key: TileKey, at: SystemTime) {
        let name = self.file_name(key);
        let mut index = self.lock_index();
        if let Some(entry) = index.get_mut(&name) {
            entry.last_access = millis(at);
        }
    }

    /// Optimistic live estimate; exact after [`DiskCache::enforce_budget`]
    pub fn usage_bytes(&self) -> u64 {
        self.inner.usage.load(Ordering::Relaxed)
    }

    /// Usage is above `max_bytes` and has grown since the last eviction
    /// pass settled, so another pass could free something.
    pub fn over_budget(&self, max_bytes: u64) -> bool {
        let used = self.usage_bytes();
        used > max_bytes && used > self.inner.settled.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.lock_index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete least-recently-accessed files until the total is within
    /// `max_bytes`. Preload files are kept even if that leaves the cache over
    /// budget.
    pub fn enforce_budget(&self, max_bytes: u64) -> Result<Eviction> {
        let mut files = self.scan()?;
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        let mut eviction = Eviction::default();

        if total > max_bytes {
            files.retain(|f| !self.is_preload(&f.name));
            files.sort_by(|a, b| {
                a.last_access
                    .cmp(&b.last_access)
                    .then_with(|| a.name.cmp(&b.name))
            });

            for file in files {
                if total <= max_bytes {
                    break;
                }
                match fs::remove_file(self.inner.dir.join(&file.name)) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        log::warn!("failed to evict {}: {}", file.name, e);
                        continue;
                    }
                }
                self.lock_index().remove(&file.name);
                total -= file.size;
                eviction.removed += 1;
                eviction.freed_bytes += file.size;
            }

            log::info!(
                "evicted {} cached tiles ({} bytes)",
                eviction.removed,
                eviction.freed_bytes
            );
            if total > max_bytes {
                log::warn!(
                    "{}",
                    TileError::QuotaExceeded {
                        used: total,
                        budget: max_bytes
                    }
                );
            }
        }

        self.inner.usage.store(total, Ordering::Relaxed);
        self.inner.settled.store(total, Ordering::Relaxed);
        eviction.usage_bytes = total;
        self.flush_index()?;
        Ok(eviction)
    }

    /// Run [`DiskCache::enforce_budget`] off the calling thread unless a pass
    /// is already running.
    pub fn enforce_budget_in_background(&self, max_bytes: u64) -> bool {
        if self.inner.enforcing.swap(true, Ordering::AcqRel) {
            return false;
        }
        let cache = self.clone();
        runtime::spawn_blocking(self.inner.spawner.as_ref(), move || {
            if let Err(e) = cache.enforce_budget(max_bytes) {
                log::warn!("disk cache eviction failed: {}", e);
            }
            cache.inner.enforcing.store(false, Ordering::Release);
        });
        true
    }

    pub fn flush_index(&self) -> Result<()> {
        let snapshot = self.lock_index().clone();
        let json = serde_json::to_vec(&snapshot)?;
        fs::write(self.inner.dir.join(CACHE_INDEX_FILE), json)?;
        Ok(())
    }

    /// Delete every cached tile of this server
    pub fn clear(&self) -> Result<()> {
        for file in self.scan()? {
            match fs::remove_file(self.inner.dir.join(&file.name)) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.lock_index().clear();
        self.inner.usage.store(0, Ordering::Relaxed);
        self.inner.settled.store(0, Ordering::Relaxed);
        self.flush_index()
    }

    /// List tile files on disk and reconcile the index with them
    fn scan(&self) -> Result<Vec<CachedFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.inner.dir)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name == CACHE_INDEX_FILE || !name.starts_with('z') {
                continue;
            }
            files.push((name, meta));
        }

        let on_disk: HashSet<&str> = files.iter().map(|(name, _)| name.as_str()).collect();
        let mut index = self.lock_index();
        index.retain(|name, _| on_disk.contains(name.as_str()));
        drop(on_disk);
        let listed = files
            .into_iter()
            .map(|(name, meta)| {
                let fallback = meta.modified().map(millis).unwrap_or(0);
                let entry = index.entry(name.clone()).or_insert(IndexEntry {
                    size: meta.len(),
                    last_access: fallback,
                });
                entry.size = meta.len();
                CachedFile {
                    name,
                    size: entry.size,
                    last_access: entry.last_access,
                }
            })
            .collect();
        Ok(listed)
    }

    fn record_access(&self, name: String, size: u64, at: SystemTime) {
        self.lock_index().insert(
            name,
            IndexEntry {
                size,
                last_access: millis(at),
            },
        );
    }

    fn sub_usage(&self, bytes: u64) {
        let previous = self
            .inner
            .usage
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |u| {
                Some(u.saturating_sub(bytes))
            })
            .unwrap_or_default();
        self.inner
            .settled
            .fetch_min(previous.saturating_sub(bytes), Ordering::Relaxed);
    }

    fn lock_index(&self) -> std::sync::MutexGuard<'_, HashMap<String, IndexEntry>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.inner
            .index
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct CachedFile {
    name: String,
    size: u64,
    last_access: u64,
}

fn millis(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn load_index(dir: &Path) -> HashMap<String, IndexEntry> {
    let path = dir.join(CACHE_INDEX_FILE);
    match fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable cache index {}: {}", path.display(), e);
            HashMap::default()
        }),
        Err(_) => HashMap::default(),
    }
}
