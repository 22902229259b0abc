//! Key-value store backend.

mod adapter;
mod backend;
mod client;
mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use adapter::*;
pub use backend::*;
pub use client::*;
pub use memory::*;
#[cfg(feature = "redis")]
pub use self::redis::*;
