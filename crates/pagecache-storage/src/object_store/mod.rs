//! Bucket-style object store backend.

mod backend;
mod client;
mod memory;

pub use backend::*;
pub use client::*;
pub use memory::*;
