//! Time-bounded result cache with prefix invalidation.
//!
//! Entries are stored in a [`DashMap`], which shards its locks so that
//! concurrent analyses touching unrelated keys do not serialize behind a
//! single mutex.
//!
//! # Key Convention
//!
//! Keys are `"<project_id>:<scope>"` (see [`cache_key`]). Dropping everything
//! cached for a project is `invalidate_prefix(&project_prefix(project))`.
//! Because the prefix includes the separator, project `p1` never matches keys
//! of project `p10`. Project identifiers must not contain `:` themselves.
//!
//! # Expiry
//!
//! Each entry carries an absolute deadline. A `get` that observes an expired
//! entry reports a miss and evicts it; [`ResultCache::purge_expired`] and
//! [`ResultCache::spawn_cleanup`] reclaim entries nobody reads again.

use crate::config::CacheConfig;
use crate::domain::ProjectId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Default time-to-live for cached analyses.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Separator between the project identifier and the scope in a cache key.
pub const KEY_SEPARATOR: char = ':';

/// Compose the cache key for one scope of one project.
#[must_use]
pub fn cache_key(project_id: &ProjectId, scope: &str) -> String {
    format!("{project_id}{KEY_SEPARATOR}{scope}")
}

/// The prefix shared by every key of `project_id`.
#[must_use]
pub fn project_prefix(project_id: &ProjectId) -> String {
    format!("{project_id}{KEY_SEPARATOR}")
}

#[derive(Debug)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

/// Concurrent key -> value store where every entry expires.
#[derive(Debug)]
pub struct ResultCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache whose [`set_default`](Self::set_default) uses `default_ttl`.
    #[must_use]
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Create a cache from the `cache` section of the engine configuration.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl())
    }

    /// TTL applied by [`set_default`](Self::set_default).
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up `key`.
    ///
    /// Returns `None` for a missing key and for an expired one; an expired
    /// entry is removed by this call.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        match self.entries.get(key) {
            None => {
                trace!(key, "Cache miss");
                return None;
            }
            Some(entry) if now < entry.expires_at => {
                trace!(key, "Cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        // Re-check under the write lock: a concurrent `set` may have replaced
        // the expired entry since the read above.
        self.entries
            .remove_if(key, |_, entry| entry.expires_at <= now);
        debug!(key, "Evicted expired cache entry");
        None
    }

    /// Store `value` under `key` until `now + ttl`, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        self.entries.insert(key.into(), CacheEntry { value, expires_at });
    }

    /// Store `value` under `key` with the configured default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: V) {
        self.set(key, value, self.default_ttl);
    }

    /// Remove every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let keep = !key.starts_with(prefix);
            if !keep {
                removed += 1;
            }
            keep
        });
        debug!(prefix, removed, "Invalidated cache prefix");
        removed
    }

    /// Remove every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = now < entry.expires_at;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored entries, expired ones included until they are evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> ResultCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Run [`purge_expired`](Self::purge_expired) every `interval` until
    /// `cancel` fires.
    pub fn spawn_cleanup(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            debug!(purged, "Purged expired cache entries");
                        }
                    }
                }
            }
            debug!("Cache cleanup stopped");
        })
    }
}

impl<V: Clone> Default for ResultCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
