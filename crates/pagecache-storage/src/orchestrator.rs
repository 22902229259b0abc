//! Request-facing cache layer.
//!
//! Ties key derivation, staleness and the selected backend together. The
//! configuration and backend are built once at startup and shared; each
//! request gets a [`RequestCache`] holding its derived key.

use std::sync::Arc;

use pagecache_core::{is_stale, now_millis, CacheConfig, CacheEntry, CacheKey, DeviceType, KeyBuilder, RenderContext};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::backend::StorageBackend;
use crate::error::CacheResult;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh entry found.
    Hit,
    /// Nothing stored.
    Miss,
    /// Entry found but past its revalidation window.
    Stale,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hit => write!(f, "HIT"),
            Self::Miss => write!(f, "MISS"),
            Self::Stale => write!(f, "STALE"),
        }
    }
}

/// Result of [`RequestCache::lookup`].
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    /// Lookup outcome.
    pub status: CacheStatus,
    /// The stored entry; present for hits and stale entries.
    pub entry: Option<CacheEntry>,
}

impl CacheLookup {
    /// The entry, only when fresh.
    pub fn fresh(self) -> Option<CacheEntry> {
        match self.status {
            CacheStatus::Hit => self.entry,
            CacheStatus::Miss | CacheStatus::Stale => None,
        }
    }
}

/// Process-wide cache: immutable configuration plus one backend.
#[derive(Clone)]
pub struct PageCache {
    config: Arc<CacheConfig>,
    backend: Arc<dyn StorageBackend>,
}

impl PageCache {
    /// Create the cache over a configuration and a backend.
    pub fn new(config: CacheConfig, backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            config: Arc::new(config),
            backend,
        }
    }

    /// The configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The selected backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Derive the key for a request and bind it to the cache.
    pub fn for_request(&self, ctx: RenderContext) -> RequestCache {
        let key = KeyBuilder::new(&self.config.keys).build(&ctx);
        debug!(cache_key = %key, "derived cache key");
        RequestCache {
            backend: self.backend.clone(),
            key,
            ctx,
        }
    }

    /// Remove every entry carrying `tag`, for every request variant.
    pub async fn revalidate_tag(&self, tag: &str, allow_cache_keys: &[String]) -> CacheResult<()> {
        self.backend
            .invalidate_by_tag(tag, &RenderContext::default(), allow_cache_keys)
            .await
    }

    /// Remove every entry stored under `path`, for every request variant.
    pub async fn delete_all_by_path(&self, path: &str, allow_cache_keys: &[String]) -> CacheResult<()> {
        self.backend
            .delete_all_by_path(path, &RenderContext::default(), allow_cache_keys)
            .await
    }
}

impl std::fmt::Debug for PageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// The cache as seen by one request.
///
/// The composite key is derived once, when the request cache is created.
pub struct RequestCache {
    backend: Arc<dyn StorageBackend>,
    key: CacheKey,
    ctx: RenderContext,
}

impl RequestCache {
    /// The derived composite key.
    pub fn cache_key(&self) -> &CacheKey {
        &self.key
    }

    /// The detected device class, when device splitting is enabled.
    pub fn device(&self) -> Option<DeviceType> {
        self.key.device()
    }

    /// The render context of the request.
    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    /// Look up the entry for `path` and classify it.
    #[instrument(skip(self), fields(cache_key = %self.key))]
    pub async fn lookup(&self, path: &str) -> CacheResult<CacheLookup> {
        let entry = self.backend.get(path, self.key.as_str()).await?;
        let status = match &entry {
            None => CacheStatus::Miss,
            Some(entry) if is_stale(entry) => CacheStatus::Stale,
            Some(_) => CacheStatus::Hit,
        };
        debug!(%status, "cache lookup");
        Ok(CacheLookup { status, entry })
    }

    /// Fresh entry for `path`. Stale entries read as misses.
    pub async fn get(&self, path: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.lookup(path).await?.fresh())
    }

    /// Store an entry for `path`, stamped with the current time.
    #[instrument(skip(self, entry), fields(cache_key = %self.key, kind = entry.value.kind()))]
    pub async fn set(&self, path: &str, entry: CacheEntry) -> CacheResult<()> {
        let entry = entry.with_last_modified(now_millis());
        self.backend
            .set(path, self.key.as_str(), &entry, &self.ctx)
            .await
    }

    /// Remove this request's entry for `path`.
    #[instrument(skip(self), fields(cache_key = %self.key))]
    pub async fn delete(&self, path: &str) -> CacheResult<()> {
        self.backend.delete(path, self.key.as_str()).await
    }

    /// Remove every entry stored under `path`.
    #[instrument(skip(self))]
    pub async fn delete_all_by_path(&self, path: &str, allow_cache_keys: &[String]) -> CacheResult<()> {
        self.backend
            .delete_all_by_path(path, &self.ctx, allow_cache_keys)
            .await
    }

    /// Remove every entry carrying `tag`.
    #[instrument(skip(self))]
    pub async fn revalidate_tag(&self, tag: &str, allow_cache_keys: &[String]) -> CacheResult<()> {
        self.backend
            .invalidate_by_tag(tag, &self.ctx, allow_cache_keys)
            .await
    }
}
