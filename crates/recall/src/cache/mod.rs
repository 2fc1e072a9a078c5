//! Cache backend implementations.
//!
//! This module provides concrete implementations of the cache trait
//! defined in `recall_core::cache`.

pub mod memory;

pub use memory::{CacheStats, MemoryCache, PurgeTask};
