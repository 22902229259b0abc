//! Object store backend.
//!
//! Each entry maps to up to three objects sharing the `<base>/<cache_key>`
//! prefix:
//!
//! - `.json` - the serialized entry (always)
//! - `.html` - rendered HTML (pages)
//! - `.rsc` - component payload (pages rendered by the app router)
//!
//! Tags are attached to every object as `revalidateTag<N>` tag metadata, so
//! tag invalidation reads tag sets instead of object bodies. There is no
//! secondary tag index: a plain-tag invalidation scans the whole bucket.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{join_all, try_join_all};
use pagecache_core::{cache_control_header, CacheEntry, RenderContext};
use tracing::{debug, warn};

use super::client::{ListObjects, ObjectStoreClient, PutObject, MAX_DELETE_BATCH};
use crate::backend::{cache_key_allowed, path_from_tag, StorageBackend};
use crate::error::CacheResult;

/// Tag metadata key prefix; the N-th tag is stored as `revalidateTag<N>`.
pub const TAG_KEY_PREFIX: &str = "revalidateTag";

/// Most tags an object can carry.
pub const MAX_OBJECT_TAGS: usize = 10;

/// Physical representation of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Serialized entry.
    Json,
    /// Rendered HTML.
    Html,
    /// App-router component payload.
    Rsc,
}

impl ObjectKind {
    /// Every representation, in write order.
    pub const ALL: [ObjectKind; 3] = [Self::Html, Self::Rsc, Self::Json];

    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Rsc => "rsc",
        }
    }

    /// Content type of the object.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Html => "text/html; charset=utf-8",
            Self::Rsc => "text/x-component",
        }
    }

    /// Split a key into its stem and representation.
    pub fn split_key(key: &str) -> Option<(&str, ObjectKind)> {
        let (stem, ext) = key.rsplit_once('.')?;
        Self::ALL
            .into_iter()
            .find(|kind| kind.extension() == ext)
            .map(|kind| (stem, kind))
    }
}

/// Object key of one representation.
pub fn object_key(base_key: &str, cache_key: &str, kind: ObjectKind) -> String {
    format!("{}/{}.{}", base_key, cache_key, kind.extension())
}

/// Encode tags as indexed object tag metadata.
pub fn encode_object_tags(tags: &[String]) -> Vec<(String, String)> {
    if tags.len() > MAX_OBJECT_TAGS {
        warn!(
            count = tags.len(),
            limit = MAX_OBJECT_TAGS,
            "entry carries more tags than an object can hold, extra tags dropped"
        );
    }

    tags.iter()
        .take(MAX_OBJECT_TAGS)
        .enumerate()
        .map(|(i, tag)| (format!("{}{}", TAG_KEY_PREFIX, i), tag.clone()))
        .collect()
}

/// Whether a tag set carries `tag`.
pub fn tag_set_contains(tag_set: &[(String, String)], tag: &str) -> bool {
    tag_set
        .iter()
        .any(|(key, value)| key.starts_with(TAG_KEY_PREFIX) && value == tag)
}

/// Storage backend over a bucket-style object store.
pub struct ObjectStoreBackend {
    client: Arc<dyn ObjectStoreClient>,
}

impl ObjectStoreBackend {
    /// Create a backend over an object store client.
    pub fn new(client: Arc<dyn ObjectStoreClient>) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &Arc<dyn ObjectStoreClient> {
        &self.client
    }

    /// Delete keys in parallel batches of at most [`MAX_DELETE_BATCH`].
    ///
    /// A failed batch is logged and does not stop its siblings. Returns the
    /// number of keys in batches that succeeded.
    async fn delete_in_chunks(&self, keys: &[String]) -> usize {
        if keys.is_empty() {
            return 0;
        }

        let results = join_all(keys.chunks(MAX_DELETE_BATCH).map(|chunk| async move {
            (chunk.len(), self.client.delete_objects(chunk).await)
        }))
        .await;

        let mut deleted = 0;
        for (len, result) in results {
            match result {
                Ok(()) => deleted += len,
                Err(e) => warn!(error = %e, keys = len, "batch delete failed"),
            }
        }
        deleted
    }

    async fn invalidate_plain_tag(&self, tag: &str, allow_cache_keys: &[String]) -> CacheResult<()> {
        let mut request = ListObjects::default();
        let mut matched = Vec::new();
        let mut pages = 0;
        let mut scanned = 0;

        loop {
            let page = self.client.list_objects(request.clone()).await?;
            pages += 1;
            scanned += page.keys.len();

            let candidates: Vec<String> = page
                .keys
                .into_iter()
                .filter(|key| listed_key_allowed(key, allow_cache_keys))
                .collect();

            let tag_sets = join_all(
                candidates
                    .iter()
                    .map(|key| self.client.get_object_tagging(key)),
            )
            .await;

            for (key, tag_set) in candidates.into_iter().zip(tag_sets) {
                match tag_set {
                    Ok(tag_set) if tag_set_contains(&tag_set, tag) => matched.push(key),
                    Ok(_) => {}
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
            }

            match page.next_continuation_token {
                Some(token) => request.continuation_token = Some(token),
                None => break,
            }
        }

        let deleted = self.delete_in_chunks(&matched).await;
        debug!(tag, pages, scanned, matched = matched.len(), deleted, "tag invalidation finished");
        Ok(())
    }
}

// Full-bucket listings carry arbitrary path levels; the cache key is the
// last one.
fn listed_key_allowed(key: &str, allow_cache_keys: &[String]) -> bool {
    let Some((stem, _)) = ObjectKind::split_key(key) else {
        return false;
    };
    let suffix = stem.rsplit_once('/').map_or(stem, |(_, suffix)| suffix);
    cache_key_allowed(suffix, allow_cache_keys)
}

#[async_trait]
impl StorageBackend for ObjectStoreBackend {
    async fn get(&self, base_key: &str, cache_key: &str) -> CacheResult<Option<CacheEntry>> {
        let key = object_key(base_key, cache_key, ObjectKind::Json);
        match self.client.get_object(&key).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn set(
        &self,
        base_key: &str,
        cache_key: &str,
        entry: &CacheEntry,
        ctx: &RenderContext,
    ) -> CacheResult<()> {
        let tags = encode_object_tags(&entry.derived_tags());
        let cache_control = cache_control_header(entry.revalidate);
        let object = |kind: ObjectKind, body: Vec<u8>| PutObject {
            key: object_key(base_key, cache_key, kind),
            body,
            content_type: kind.content_type().to_string(),
            cache_control: cache_control.clone(),
            tags: tags.clone(),
        };

        let mut objects = Vec::with_capacity(3);
        if let Some(html) = entry.html() {
            objects.push(object(ObjectKind::Html, html.as_bytes().to_vec()));
        }
        if ctx.app_router {
            if let Some(payload) = entry.rsc_payload() {
                objects.push(object(ObjectKind::Rsc, payload.as_bytes().to_vec()));
            }
        }
        objects.push(object(ObjectKind::Json, serde_json::to_vec(entry)?));

        // Representations this entry no longer has; an earlier write may
        // have left them behind.
        let stale: Vec<String> = [ObjectKind::Html, ObjectKind::Rsc]
            .into_iter()
            .map(|kind| object_key(base_key, cache_key, kind))
            .filter(|key| !objects.iter().any(|o| &o.key == key))
            .collect();

        // Writes are independent; a failure leaves the others in place.
        try_join_all(objects.into_iter().map(|o| self.client.put_object(o))).await?;

        if !stale.is_empty() {
            match self.client.delete_objects(&stale).await {
                Err(e) if !e.is_not_found() => {
                    warn!(error = %e, keys = ?stale, "failed to drop stale representations")
                }
                _ => {}
            }
        }
        Ok(())
    }

    async fn delete(&self, base_key: &str, cache_key: &str) -> CacheResult<()> {
        let keys: Vec<String> = ObjectKind::ALL
            .iter()
            .map(|kind| object_key(base_key, cache_key, *kind))
            .collect();

        match self.client.delete_objects(&keys).await {
            Err(e) if !e.is_not_found() => Err(e),
            _ => Ok(()),
        }
    }

    async fn delete_all_by_path(
        &self,
        base_key: &str,
        _ctx: &RenderContext,
        allow_cache_keys: &[String],
    ) -> CacheResult<()> {
        let prefix = format!("{}/", base_key);
        let mut request = ListObjects {
            prefix: Some(prefix.clone()),
            delimiter: Some("/".to_string()),
            continuation_token: None,
        };
        let mut matched = Vec::new();
        let mut pages = 0;

        loop {
            let page = self.client.list_objects(request.clone()).await?;
            pages += 1;

            for key in page.keys {
                let allowed = key
                    .strip_prefix(prefix.as_str())
                    .and_then(ObjectKind::split_key)
                    .is_some_and(|(suffix, _)| cache_key_allowed(suffix, allow_cache_keys));
                if allowed {
                    matched.push(key);
                }
            }

            match page.next_continuation_token {
                Some(token) => request.continuation_token = Some(token),
                None => break,
            }
        }

        let deleted = self.delete_in_chunks(&matched).await;
        debug!(path = base_key, pages, matched = matched.len(), deleted, "path invalidation finished");
        Ok(())
    }

    async fn invalidate_by_tag(
        &self,
        tag: &str,
        ctx: &RenderContext,
        allow_cache_keys: &[String],
    ) -> CacheResult<()> {
        match path_from_tag(tag) {
            Some(path) => self.delete_all_by_path(path, ctx, allow_cache_keys).await,
            None => self.invalidate_plain_tag(tag, allow_cache_keys).await,
        }
    }
}
