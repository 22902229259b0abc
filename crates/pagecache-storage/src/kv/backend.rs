//! Key-value store backend.

use std::sync::Arc;

use async_trait::async_trait;
use pagecache_core::{CacheEntry, RecordShape, RenderContext};
use tracing::debug;

use super::adapter::{address, scan_all, scan_pattern, KeyValueAdapter};
use super::client::KeyValueClient;
use crate::backend::{path_from_tag, StorageBackend};
use crate::error::CacheResult;

/// Storage backend over a key-value store.
#[derive(Debug, Clone)]
pub struct KeyValueBackend {
    adapter: KeyValueAdapter,
}

impl KeyValueBackend {
    /// Create a backend with the given record shape.
    pub fn new(shape: RecordShape, client: Arc<dyn KeyValueClient>) -> Self {
        Self {
            adapter: KeyValueAdapter::new(shape, client),
        }
    }

    /// Create a backend storing one hash per entry.
    pub fn structured(client: Arc<dyn KeyValueClient>) -> Self {
        Self::new(RecordShape::Structured, client)
    }

    /// Create a backend storing one serialized string per entry.
    pub fn flat(client: Arc<dyn KeyValueClient>) -> Self {
        Self::new(RecordShape::Flat, client)
    }

    /// The active adapter.
    pub fn adapter(&self) -> &KeyValueAdapter {
        &self.adapter
    }

    async fn unlink(&self, addresses: &[String]) -> CacheResult<u64> {
        if addresses.is_empty() {
            return Ok(0);
        }
        self.adapter.client().unlink(addresses).await
    }
}

#[async_trait]
impl StorageBackend for KeyValueBackend {
    async fn get(&self, base_key: &str, cache_key: &str) -> CacheResult<Option<CacheEntry>> {
        self.adapter.get(&address(base_key, cache_key)).await
    }

    async fn set(
        &self,
        base_key: &str,
        cache_key: &str,
        entry: &CacheEntry,
        _ctx: &RenderContext,
    ) -> CacheResult<()> {
        self.adapter.set(&address(base_key, cache_key), entry).await
    }

    async fn delete(&self, base_key: &str, cache_key: &str) -> CacheResult<()> {
        self.unlink(&[address(base_key, cache_key)]).await?;
        Ok(())
    }

    async fn delete_all_by_path(
        &self,
        base_key: &str,
        _ctx: &RenderContext,
        allow_cache_keys: &[String],
    ) -> CacheResult<()> {
        // Named variants are addressed directly, no scan needed.
        let addresses = if allow_cache_keys.is_empty() {
            scan_all(self.adapter.client(), &scan_pattern(base_key)).await?
        } else {
            allow_cache_keys
                .iter()
                .map(|cache_key| address(base_key, cache_key))
                .collect()
        };

        let removed = self.unlink(&addresses).await?;
        debug!(path = base_key, candidates = addresses.len(), removed, "path invalidation finished");
        Ok(())
    }

    async fn invalidate_by_tag(
        &self,
        tag: &str,
        ctx: &RenderContext,
        allow_cache_keys: &[String],
    ) -> CacheResult<()> {
        if let Some(path) = path_from_tag(tag) {
            return self.delete_all_by_path(path, ctx, allow_cache_keys).await;
        }

        let addresses = self.adapter.find_cache_keys(tag, allow_cache_keys).await?;
        let removed = self.unlink(&addresses).await?;
        debug!(tag, shape = %self.adapter.shape(), matched = addresses.len(), removed, "tag invalidation finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KeyValueClient, MemoryKeyValueStore};
    use pagecache_core::CACHE_TAGS_HEADER;
    use serde_json::json;

    fn backends() -> Vec<(Arc<MemoryKeyValueStore>, KeyValueBackend)> {
        let structured = Arc::new(MemoryKeyValueStore::new());
        let flat = Arc::new(MemoryKeyValueStore::new());
        vec![
            (structured.clone(), KeyValueBackend::structured(structured)),
            (flat.clone(), KeyValueBackend::flat(flat)),
        ]
    }

    fn tagged(tags: &str) -> CacheEntry {
        CacheEntry::page("<p/>")
            .with_header(CACHE_TAGS_HEADER, tags)
            .with_revalidate(60)
            .with_last_modified(1_700_000_000_000)
    }

    #[tokio::test]
    async fn test_page_round_trip_with_app_router() {
        let ctx = RenderContext::new().with_app_router(true);
        for (_, backend) in backends() {
            let entry = tagged("blog").with_rsc_payload("0:[\"$\"]");
            backend.set("/blog", "index", &entry, &ctx).await.unwrap();

            let back = backend.get("/blog", "index").await.unwrap().unwrap();
            assert_eq!(back.value.kind(), "PAGE");
            assert_eq!(back.html(), Some("<p/>"));
            assert_eq!(back.rsc_payload(), Some("0:[\"$\"]"));
            assert_eq!(back, entry);
        }
    }

    #[tokio::test]
    async fn test_delete_then_get_is_none() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            backend.set("/a", "index", &tagged("t"), &ctx).await.unwrap();
            backend.delete("/a", "index").await.unwrap();

            assert_eq!(backend.get("/a", "index").await.unwrap(), None);
            assert!(store.is_empty().await);
            backend.delete("/a", "index").await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_delete_all_by_path_scans_one_path() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            for key in ["index", "index-mobile", "index-tablet"] {
                backend.set("/blog", key, &tagged("t"), &ctx).await.unwrap();
            }
            backend.set("/blog/post", "index", &tagged("t"), &ctx).await.unwrap();
            backend.set("/blogroll", "index", &tagged("t"), &ctx).await.unwrap();

            backend.delete_all_by_path("/blog", &ctx, &[]).await.unwrap();

            assert_eq!(store.keys().await, vec!["/blog/post//index", "/blogroll//index"]);
        }
    }

    #[tokio::test]
    async fn test_delete_all_by_path_with_filter() {
        let ctx = RenderContext::new();
        for (_, backend) in backends() {
            for key in ["index", "index-mobile", "index-tablet"] {
                backend.set("/blog", key, &tagged("t"), &ctx).await.unwrap();
            }

            backend
                .delete_all_by_path("/blog", &ctx, &["index-mobile".to_string()])
                .await
                .unwrap();

            assert!(backend.get("/blog", "index-mobile").await.unwrap().is_none());
            assert!(backend.get("/blog", "index").await.unwrap().is_some());
            assert!(backend.get("/blog", "index-tablet").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_invalidate_by_tag() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            backend.set("/blog", "index", &tagged("blog, posts"), &ctx).await.unwrap();
            backend.set("/blog/a", "index", &tagged("posts"), &ctx).await.unwrap();
            backend.set("/shop", "index", &tagged("shop"), &ctx).await.unwrap();
            backend
                .set("fetch", "f1", &CacheEntry::fetch(json!(1)).with_tags(["posts"]), &ctx)
                .await
                .unwrap();

            backend.invalidate_by_tag("posts", &ctx, &[]).await.unwrap();

            assert_eq!(store.keys().await, vec!["/shop//index"]);
        }
    }

    #[tokio::test]
    async fn test_invalidate_by_tag_with_filter() {
        let ctx = RenderContext::new();
        for (_, backend) in backends() {
            backend.set("/blog", "index", &tagged("blog"), &ctx).await.unwrap();
            backend.set("/blog", "index-mobile", &tagged("blog"), &ctx).await.unwrap();
            backend.set("/shop", "index-mobile", &tagged("shop"), &ctx).await.unwrap();

            backend
                .invalidate_by_tag("blog", &ctx, &["index-mobile".to_string()])
                .await
                .unwrap();

            assert!(backend.get("/blog", "index-mobile").await.unwrap().is_none());
            assert!(backend.get("/blog", "index").await.unwrap().is_some());
            assert!(backend.get("/shop", "index-mobile").await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_invalidate_unknown_tag_is_noop() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            backend.set("/blog", "index", &tagged("blog"), &ctx).await.unwrap();
            backend.invalidate_by_tag("nothing", &ctx, &[]).await.unwrap();
            assert_eq!(store.len().await, 1);
        }
    }

    #[tokio::test]
    async fn test_invalidate_by_tag_ignores_foreign_keys_of_other_types() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            backend.set("/blog", "index", &tagged("blog"), &ctx).await.unwrap();
            // Application keys that happen to contain `//`, one of each type.
            store.set("session:https://example.com", "token").await.unwrap();
            store
                .hset("profile:https://example.com", &[("name".to_string(), "x".to_string())])
                .await
                .unwrap();

            backend.invalidate_by_tag("blog", &ctx, &[]).await.unwrap();

            assert_eq!(
                store.keys().await,
                vec!["profile:https://example.com", "session:https://example.com"]
            );
        }
    }

    #[tokio::test]
    async fn test_path_form_tag_deletes_by_path() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            backend.set("/blog", "index", &tagged("x"), &ctx).await.unwrap();
            backend.set("/shop", "index", &tagged("x"), &ctx).await.unwrap();

            backend.invalidate_by_tag("_N_T_/blog", &ctx, &[]).await.unwrap();

            assert_eq!(store.keys().await, vec!["/shop//index"]);
        }
    }

    #[tokio::test]
    async fn test_scan_spans_many_cursor_pages() {
        let ctx = RenderContext::new();
        for (store, backend) in backends() {
            for i in 0..250 {
                backend.set("/list", &format!("index-v{}", i), &tagged("t"), &ctx).await.unwrap();
            }
            backend.set("/other", "index", &tagged("t"), &ctx).await.unwrap();

            backend.delete_all_by_path("/list", &ctx, &[]).await.unwrap();

            assert_eq!(store.keys().await, vec!["/other//index"]);
        }
    }
}
