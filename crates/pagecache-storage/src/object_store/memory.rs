//! In-memory object store (for development/testing).

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::client::{ListObjects, ListObjectsPage, ObjectStoreClient, PutObject, MAX_DELETE_BATCH};
use crate::error::{CacheError, CacheResult};

/// Default number of entries per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object held by [`MemoryObjectStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object body.
    pub body: Vec<u8>,
    /// Content type.
    pub content_type: String,
    /// Cache-Control directive.
    pub cache_control: Option<String>,
    /// Object-level tag set.
    pub tags: Vec<(String, String)>,
}

/// Bucket held in memory, listing keys in lexicographic order.
///
/// Listing pages hold at most `page_size` entries (keys plus rolled-up
/// prefixes) and continue after the last key seen.
#[derive(Debug)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    page_size: usize,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// All keys currently stored.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Get a stored object.
    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.read().await.get(key).cloned()
    }

    /// Number of stored objects.
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    async fn get_object(&self, key: &str) -> CacheResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn put_object(&self, object: PutObject) -> CacheResult<()> {
        let stored = StoredObject {
            body: object.body,
            content_type: object.content_type,
            cache_control: object.cache_control,
            tags: object.tags,
        };
        self.objects.write().await.insert(object.key, stored);
        Ok(())
    }

    async fn list_objects(&self, request: ListObjects) -> CacheResult<ListObjectsPage> {
        let objects = self.objects.read().await;
        let prefix = request.prefix.as_deref().unwrap_or("");
        let delimiter = request.delimiter.as_deref().filter(|d| !d.is_empty());

        let start = match request.continuation_token.as_deref() {
            Some(token) => Bound::Excluded(token),
            None => Bound::Included(prefix),
        };

        let mut page = ListObjectsPage::default();
        let mut entries = 0;
        let mut keys = objects
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(key, _)| key.as_str())
            .take_while(|key| key.starts_with(prefix))
            .peekable();

        while let Some(key) = keys.next() {
            let rest = &key[prefix.len()..];
            match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => {
                    let common = &key[..prefix.len() + end];
                    if page.common_prefixes.last().map(String::as_str) != Some(common) {
                        page.common_prefixes.push(common.to_string());
                        entries += 1;
                    }
                }
                None => {
                    page.keys.push(key.to_string());
                    entries += 1;
                }
            }

            if entries >= self.page_size && keys.peek().is_some() {
                page.next_continuation_token = Some(key.to_string());
                break;
            }
        }

        Ok(page)
    }

    async fn get_object_tagging(&self, key: &str) -> CacheResult<Vec<(String, String)>> {
        self.objects
            .read()
            .await
            .get(key)
            .map(|object| object.tags.clone())
            .ok_or_else(|| CacheError::NotFound(key.to_string()))
    }

    async fn delete_objects(&self, keys: &[String]) -> CacheResult<()> {
        if keys.len() > MAX_DELETE_BATCH {
            return Err(CacheError::Storage(format!(
                "batch delete of {} keys exceeds limit of {}",
                keys.len(),
                MAX_DELETE_BATCH
            )));
        }

        let mut objects = self.objects.write().await;
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str) -> PutObject {
        PutObject {
            key: key.to_string(),
            body: key.as_bytes().to_vec(),
            content_type: "text/plain".to_string(),
            cache_control: None,
            tags: vec![("revalidateTag0".to_string(), "t".to_string())],
        }
    }

    async fn list_all(store: &MemoryObjectStore, request: ListObjects) -> (Vec<String>, usize) {
        let mut request = request;
        let mut keys = Vec::new();
        let mut pages = 0;
        loop {
            let page = store.list_objects(request.clone()).await.unwrap();
            pages += 1;
            keys.extend(page.keys);
            match page.next_continuation_token {
                Some(token) => request.continuation_token = Some(token),
                None => break,
            }
        }
        (keys, pages)
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.get_object("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_get_and_tagging() {
        let store = MemoryObjectStore::new();
        store.put_object(put("a/b.json")).await.unwrap();

        assert_eq!(store.get_object("a/b.json").await.unwrap(), b"a/b.json".to_vec());
        assert_eq!(
            store.get_object_tagging("a/b.json").await.unwrap(),
            vec![("revalidateTag0".to_string(), "t".to_string())]
        );
    }

    #[tokio::test]
    async fn test_pagination_visits_every_key_once() {
        let store = MemoryObjectStore::new().with_page_size(2);
        for i in 0..5 {
            store.put_object(put(&format!("p/{}.json", i))).await.unwrap();
        }
        store.put_object(put("q/0.json")).await.unwrap();

        let (keys, pages) = list_all(
            &store,
            ListObjects {
                prefix: Some("p/".to_string()),
                ..Default::default()
            },
        )
        .await;

        assert_eq!(keys, (0..5).map(|i| format!("p/{}.json", i)).collect::<Vec<_>>());
        assert_eq!(pages, 3);
    }

    #[tokio::test]
    async fn test_delimiter_rolls_up_nested_keys() {
        let store = MemoryObjectStore::new();
        store.put_object(put("/blog/index.json")).await.unwrap();
        store.put_object(put("/blog/index.html")).await.unwrap();
        store.put_object(put("/blog/post/index.json")).await.unwrap();
        store.put_object(put("/blog/post/index.html")).await.unwrap();

        let page = store
            .list_objects(ListObjects {
                prefix: Some("/blog/".to_string()),
                delimiter: Some("/".to_string()),
                continuation_token: None,
            })
            .await
            .unwrap();

        assert_eq!(page.keys, vec!["/blog/index.html", "/blog/index.json"]);
        assert_eq!(page.common_prefixes, vec!["/blog/post/"]);
        assert_eq!(page.next_continuation_token, None);
    }

    #[tokio::test]
    async fn test_delete_objects_limit() {
        let store = MemoryObjectStore::new();
        let keys: Vec<String> = (0..=MAX_DELETE_BATCH).map(|i| i.to_string()).collect();
        assert!(store.delete_objects(&keys).await.is_err());
        assert!(store.delete_objects(&keys[..10]).await.is_ok());
    }
}
