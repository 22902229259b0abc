//! Record adapters for the key-value backend.
//!
//! Entries live at `<base_key>//<cache_key>`. The double slash keeps the
//! path and the variant apart: a `<base_key>//*` scan sees every variant of
//! one path and nothing from nested paths.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use pagecache_core::{CacheEntry, RecordShape};
use tracing::debug;

use super::client::{KeyValueClient, SCAN_COUNT, SCAN_START};
use crate::backend::cache_key_allowed;
use crate::error::{CacheError, CacheResult};

/// Separator between the path and the cache key of an address.
pub const ADDRESS_SEPARATOR: &str = "//";

/// Pattern matching every entry address.
pub const ALL_ENTRIES_PATTERN: &str = "*//*";

/// Structured record field holding the serialized entry.
pub const VALUE_FIELD: &str = "value";

/// Structured record field holding the rendered HTML.
pub const HTML_FIELD: &str = "html";

/// Structured record field holding the JSON tag list.
pub const TAGS_FIELD: &str = "tags";

/// Address of one entry.
pub fn address(base_key: &str, cache_key: &str) -> String {
    format!("{}{}{}", base_key, ADDRESS_SEPARATOR, cache_key)
}

/// Scan pattern matching every entry of a path.
pub fn scan_pattern(base_key: &str) -> String {
    format!("{}{}*", escape_glob(base_key), ADDRESS_SEPARATOR)
}

/// Cache-key part of an address.
pub fn cache_key_of(address: &str) -> &str {
    address
        .rsplit_once(ADDRESS_SEPARATOR)
        .map_or(address, |(_, cache_key)| cache_key)
}

/// Escape glob metacharacters so a path matches literally.
pub fn escape_glob(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Run a scan to completion and collect every matching key.
///
/// Keys a store reports more than once are kept once.
pub async fn scan_all(client: &dyn KeyValueClient, pattern: &str) -> CacheResult<Vec<String>> {
    let mut cursor = SCAN_START;
    let mut keys = Vec::new();
    let mut seen = HashSet::new();
    let mut calls = 0;

    loop {
        let (next, batch) = client.scan(cursor, pattern, SCAN_COUNT).await?;
        calls += 1;
        for key in batch {
            if seen.insert(key.clone()) {
                keys.push(key);
            }
        }
        if next == SCAN_START {
            break;
        }
        cursor = next;
    }

    debug!(pattern, calls, found = keys.len(), "scan finished");
    Ok(keys)
}

/// Record layout over a key-value client.
///
/// The shape is chosen once when the backend is built; both variants answer
/// the same calls.
#[derive(Clone)]
pub enum KeyValueAdapter {
    /// One hash per entry with `value`, `html` and `tags` fields. Tag lookups
    /// read only the `tags` field.
    Structured(Arc<dyn KeyValueClient>),
    /// One string per entry holding the serialized entry. Tag lookups
    /// deserialize every candidate.
    Flat(Arc<dyn KeyValueClient>),
}

impl KeyValueAdapter {
    /// Build the adapter for a record shape.
    pub fn new(shape: RecordShape, client: Arc<dyn KeyValueClient>) -> Self {
        match shape {
            RecordShape::Structured => Self::Structured(client),
            RecordShape::Flat => Self::Flat(client),
        }
    }

    /// The record shape.
    pub fn shape(&self) -> RecordShape {
        match self {
            Self::Structured(_) => RecordShape::Structured,
            Self::Flat(_) => RecordShape::Flat,
        }
    }

    /// Raw client, for scans and bulk unlinks.
    pub fn client(&self) -> &dyn KeyValueClient {
        match self {
            Self::Structured(client) | Self::Flat(client) => client.as_ref(),
        }
    }

    /// Read the entry at an address.
    pub async fn get(&self, address: &str) -> CacheResult<Option<CacheEntry>> {
        let raw = match self {
            Self::Structured(client) => client.hget(address, VALUE_FIELD).await?,
            Self::Flat(client) => client.get(address).await?,
        };
        raw.map(|raw| serde_json::from_str(&raw).map_err(CacheError::from))
            .transpose()
    }

    /// Write the entry at an address.
    pub async fn set(&self, address: &str, entry: &CacheEntry) -> CacheResult<()> {
        let value = serde_json::to_string(entry)?;
        match self {
            Self::Structured(client) => {
                // Every field is written so an overwrite never keeps stale ones.
                let fields = [
                    (VALUE_FIELD.to_string(), value),
                    (HTML_FIELD.to_string(), entry.html().unwrap_or_default().to_string()),
                    (TAGS_FIELD.to_string(), serde_json::to_string(&entry.derived_tags())?),
                ];
                client.hset(address, &fields).await
            }
            Self::Flat(client) => client.set(address, &value).await,
        }
    }

    /// Addresses of every entry carrying `tag`, restricted by the filter.
    pub async fn find_cache_keys(&self, tag: &str, allow_cache_keys: &[String]) -> CacheResult<Vec<String>> {
        let candidates: Vec<String> = scan_all(self.client(), ALL_ENTRIES_PATTERN)
            .await?
            .into_iter()
            .filter(|address| cache_key_allowed(cache_key_of(address), allow_cache_keys))
            .collect();

        // Tag reads for one batch of candidates run concurrently.
        let mut matched = Vec::new();
        for batch in candidates.chunks(SCAN_COUNT) {
            let reads = join_all(batch.iter().map(|address| self.tags_at(address))).await;
            for (address, tags) in batch.iter().zip(reads) {
                let tags = match tags {
                    Ok(tags) => tags,
                    // Records this adapter cannot read never match.
                    Err(
                        e @ (CacheError::Serialization(_)
                        | CacheError::InvalidRecord { .. }
                        | CacheError::WrongType(_)),
                    ) => {
                        debug!(address = %address, error = %e, "skipping unreadable record");
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                if tags.iter().any(|t| t == tag) {
                    matched.push(address.clone());
                }
            }
        }
        Ok(matched)
    }

    async fn tags_at(&self, address: &str) -> CacheResult<Vec<String>> {
        match self {
            Self::Structured(client) => match client.hget(address, TAGS_FIELD).await? {
                Some(raw) => Ok(serde_json::from_str(&raw)?),
                None => Err(CacheError::InvalidRecord {
                    address: address.to_string(),
                    reason: format!("missing `{}` field", TAGS_FIELD),
                }),
            },
            Self::Flat(client) => match client.get(address).await? {
                Some(raw) => Ok(serde_json::from_str::<CacheEntry>(&raw)?.derived_tags()),
                None => Ok(Vec::new()),
            },
        }
    }
}

impl std::fmt::Debug for KeyValueAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyValueAdapter({})", self.shape())
    }
}
