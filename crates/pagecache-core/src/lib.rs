//! Core types for the pluggable page-cache storage layer.
//!
//! This crate provides:
//! - `RenderContext` - Raw request signals handed over by the host framework
//! - `CacheConfig` - Process-wide allow-lists and backend selection
//! - `KeyBuilder` - Composite cache key derivation
//! - `CacheEntry` - The stored unit (page, route or fetch result)
//! - `is_stale` - Revalidation window checks
//!
//! # Example
//!
//! ```ignore
//! use pagecache_core::{CacheConfig, KeyBuilder, RenderContext};
//!
//! let config = CacheConfig::new()
//!     .with_cookie("locale")
//!     .with_device_split(true);
//!
//! let ctx = RenderContext::new()
//!     .with_header("cookie", "locale=fr; session=abc")
//!     .with_header("user-agent", "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) Mobile");
//!
//! let key = KeyBuilder::new(&config.keys).build(&ctx);
//! assert_eq!(key.as_str(), "index-mobile-cookie(locale=fr)");
//! ```

mod config;
mod context;
mod entry;
mod key;
mod policy;

pub use config::*;
pub use context::*;
pub use entry::*;
pub use key::*;
pub use policy::*;
