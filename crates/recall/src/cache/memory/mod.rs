//! In-memory cache backend implementation.
//!
//! Provides a thread-safe in-memory cache with TTL support for
//! single-instance deployments.

mod cache;

pub use cache::{CacheStats, MemoryCache, PurgeTask};
