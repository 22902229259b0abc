//! Storage backends for the page cache.
//!
//! This crate provides:
//! - `StorageBackend` - The contract every backend implements
//! - `ObjectStoreBackend` - Bucket-style storage with per-object tag metadata
//! - `KeyValueBackend` - Key-value storage with structured or flat records
//! - `PageCache` / `RequestCache` - Key derivation, staleness and backend wiring
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pagecache_core::{CacheConfig, CacheEntry, RenderContext};
//! use pagecache_storage::{KeyValueBackend, MemoryKeyValueStore, PageCache};
//!
//! let backend = KeyValueBackend::structured(Arc::new(MemoryKeyValueStore::new()));
//! let cache = PageCache::new(CacheConfig::new().with_cookie("locale"), Arc::new(backend));
//!
//! let request = cache.for_request(RenderContext::new().with_header("cookie", "locale=fr"));
//! request.set("/blog", CacheEntry::page("<p>hi</p>").with_revalidate(60)).await?;
//! let hit = request.get("/blog").await?;
//!
//! request.revalidate_tag("blog", &[]).await?;
//! ```

mod backend;
mod error;
mod kv;
mod object_store;
mod orchestrator;

pub use backend::*;
pub use error::*;
pub use kv::*;
pub use object_store::*;
pub use orchestrator::*;
