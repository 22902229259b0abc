//! Key-value client seam.

use async_trait::async_trait;

use crate::error::CacheResult;

/// Cursor value that starts a scan and marks its end.
pub const SCAN_START: u64 = 0;

/// Keys requested per scan call.
pub const SCAN_COUNT: usize = 100;

/// Commands the key-value backend needs from a store.
///
/// Mirrors the Redis command set: string and hash records, cursor-based
/// `SCAN` with a glob pattern, and non-blocking bulk `UNLINK`.
#[async_trait]
pub trait KeyValueClient: Send + Sync {
    /// `GET key`.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// `SET key value`.
    async fn set(&self, key: &str, value: &str) -> CacheResult<()>;

    /// `HGET key field`.
    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>>;

    /// `HSET key field value [field value ...]`.
    async fn hset(&self, key: &str, fields: &[(String, String)]) -> CacheResult<()>;

    /// `SCAN cursor MATCH pattern COUNT count`.
    ///
    /// Returns the next cursor and a batch of matching keys. A batch may be
    /// empty while the scan is still running; the scan is over once the
    /// returned cursor is [`SCAN_START`].
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<(u64, Vec<String>)>;

    /// `UNLINK key [key ...]`. Returns how many keys existed.
    async fn unlink(&self, keys: &[String]) -> CacheResult<u64>;
}
