//! Object store client seam.

use async_trait::async_trait;

use crate::error::CacheResult;

/// Largest number of keys one batch delete may carry.
pub const MAX_DELETE_BATCH: usize = 1000;

/// A single object write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutObject {
    /// Object key.
    pub key: String,
    /// Object body.
    pub body: Vec<u8>,
    /// Content type.
    pub content_type: String,
    /// Cache-Control directive, if any.
    pub cache_control: Option<String>,
    /// Object-level tag set.
    pub tags: Vec<(String, String)>,
}

/// One page of a listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjects {
    /// Only list keys starting with this prefix.
    pub prefix: Option<String>,
    /// Roll keys with this delimiter after the prefix into common prefixes.
    pub delimiter: Option<String>,
    /// Token returned by the previous page.
    pub continuation_token: Option<String>,
}

/// Result page of a listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsPage {
    /// Object keys on this page.
    pub keys: Vec<String>,
    /// Rolled-up prefixes on this page.
    pub common_prefixes: Vec<String>,
    /// Token for the next page; `None` on the last page.
    pub next_continuation_token: Option<String>,
}

/// Operations the object store backend needs from a bucket.
///
/// Reads of missing objects fail with [`CacheError::NotFound`].
///
/// [`CacheError::NotFound`]: crate::CacheError::NotFound
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Read an object body.
    async fn get_object(&self, key: &str) -> CacheResult<Vec<u8>>;

    /// Write an object, replacing any previous version.
    async fn put_object(&self, object: PutObject) -> CacheResult<()>;

    /// List one page of keys.
    async fn list_objects(&self, request: ListObjects) -> CacheResult<ListObjectsPage>;

    /// Read the tag set of an object.
    async fn get_object_tagging(&self, key: &str) -> CacheResult<Vec<(String, String)>>;

    /// Delete up to [`MAX_DELETE_BATCH`] objects. Missing keys are ignored.
    async fn delete_objects(&self, keys: &[String]) -> CacheResult<()>;
}
