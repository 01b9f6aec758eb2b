//! Per-project snapshot cache with LRU eviction and a time-to-live.
//!
//! Entries are keyed by project id and revision token. Editing splices or
//! patches either bumps the revision (new key) or calls [`SnapshotCache::invalidate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use crate::config::EngineConfig;
use crate::errors::FiberResult;
use crate::store::document::TopologyDocument;
use crate::store::snapshot::TopologySnapshot;

struct CacheEntry {
    project_id: String,
    snapshot: Arc<TopologySnapshot>,
    expires_at: Instant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct SnapshotCache {
    max_entries: usize,
    ttl: Duration,
    config: EngineConfig,
    cache: Mutex<IndexMap<String, CacheEntry>>,
    counters: Mutex<(u64, u64)>,
}

impl SnapshotCache {
    pub fn new(max_entries: usize, ttl_seconds: f64, config: EngineConfig) -> Self {
        Self {
            max_entries: max_entries.max(1),
            ttl: Duration::from_secs_f64(ttl_seconds.max(0.1)),
            config,
            cache: Mutex::new(IndexMap::new()),
            counters: Mutex::new((0, 0)),
        }
    }

    fn cache_key(project_id: &str, revision: &str) -> String {
        format!("{project_id}@{revision}")
    }

    fn evict_expired(&self, cache: &mut IndexMap<String, CacheEntry>) {
        let now = Instant::now();
        cache.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_over_capacity(&self, cache: &mut IndexMap<String, CacheEntry>) {
        while cache.len() > self.max_entries {
            cache.shift_remove_index(0);
        }
    }

    /// Cached snapshot for `(project_id, revision)`, building it with
    /// `build` on a miss. The lock is not held while building.
    pub fn get_or_build<F>(
        &self,
        project_id: &str,
        revision: &str,
        build: F,
    ) -> FiberResult<Arc<TopologySnapshot>>
    where
        F: FnOnce(&EngineConfig) -> FiberResult<TopologySnapshot>,
    {
        let key = Self::cache_key(project_id, revision);
        {
            let mut cache = self.cache.lock();
            self.evict_expired(&mut cache);
            if let Some(entry) = cache.shift_remove(&key) {
                let snapshot = Arc::clone(&entry.snapshot);
                // Move to end for LRU
                cache.insert(key, entry);
                self.counters.lock().0 += 1;
                return Ok(snapshot);
            }
        }

        self.counters.lock().1 += 1;
        let snapshot = Arc::new(build(&self.config)?);
        debug!(project_id, revision, "snapshot cache miss");
        let mut cache = self.cache.lock();
        cache.insert(
            key,
            CacheEntry {
                project_id: project_id.to_string(),
                snapshot: Arc::clone(&snapshot),
                expires_at: Instant::now() + self.ttl,
            },
        );
        self.evict_over_capacity(&mut cache);
        Ok(snapshot)
    }

    /// Snapshot for a document, keyed by its explicit revision or, failing
    /// that, its content fingerprint.
    pub fn snapshot_for_document(
        &self,
        document: &TopologyDocument,
    ) -> FiberResult<Arc<TopologySnapshot>> {
        let revision = match &document.revision {
            Some(revision) => revision.clone(),
            None => document.fingerprint()?,
        };
        self.get_or_build(&document.project_id, &revision, |config| {
            TopologySnapshot::build_with_config(document, config.clone())
        })
    }

    /// Drop every cached revision of a project. Returns how many were removed.
    pub fn invalidate(&self, project_id: &str) -> usize {
        let mut cache = self.cache.lock();
        let before = cache.len();
        cache.retain(|_, entry| entry.project_id != project_id);
        let removed = before - cache.len();
        debug!(project_id, removed, "snapshot cache invalidated");
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.cache.lock().len();
        let (hits, misses) = *self.counters.lock();
        CacheStats {
            entries,
            max_entries: self.max_entries,
            hits,
            misses,
        }
    }
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new(32, 300.0, EngineConfig::from_env())
    }
}
