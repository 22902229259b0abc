//! The storage backend contract.

use async_trait::async_trait;
use pagecache_core::{CacheEntry, RenderContext};

use crate::error::CacheResult;

/// Prefix marking a tag that names a storage path instead of a tag.
pub const PATH_TAG_PREFIX: &str = "_N_T_";

/// Uniform interface over the interchangeable backing stores.
///
/// `base_key` is the logical page path; `cache_key` is the per-request
/// composite key. Bulk operations take an `allow_cache_keys` filter which,
/// when non-empty, restricts them to the listed cache-key variants.
///
/// None of the operations is transactional. A failed `set` may leave some
/// representations written, and bulk invalidation is best-effort.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read an entry. A missing entry is `Ok(None)`.
    async fn get(&self, base_key: &str, cache_key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Write every representation the entry needs, overwriting any previous one.
    async fn set(
        &self,
        base_key: &str,
        cache_key: &str,
        entry: &CacheEntry,
        ctx: &RenderContext,
    ) -> CacheResult<()>;

    /// Remove every representation of one entry. Missing entries are fine.
    async fn delete(&self, base_key: &str, cache_key: &str) -> CacheResult<()>;

    /// Remove every entry stored under `base_key`.
    async fn delete_all_by_path(
        &self,
        base_key: &str,
        ctx: &RenderContext,
        allow_cache_keys: &[String],
    ) -> CacheResult<()>;

    /// Remove every entry carrying `tag`.
    async fn invalidate_by_tag(
        &self,
        tag: &str,
        ctx: &RenderContext,
        allow_cache_keys: &[String],
    ) -> CacheResult<()>;
}

/// Path named by a path-form tag.
pub fn path_from_tag(tag: &str) -> Option<&str> {
    tag.strip_prefix(PATH_TAG_PREFIX)
}

/// Whether a cache-key suffix passes the allow filter.
///
/// An empty filter allows everything; otherwise the suffix must end with
/// one of the allowed cache keys.
pub fn cache_key_allowed(suffix: &str, allow_cache_keys: &[String]) -> bool {
    allow_cache_keys.is_empty()
        || allow_cache_keys
            .iter()
            .any(|allowed| suffix.ends_with(allowed.as_str()))
}
