//! In-memory storage backend for testing.
//!
//! This module provides an in-memory implementation of
//! [`ProgressStore`](recall_core::storage::ProgressStore) that keeps all data
//! in HashMaps wrapped in `Arc<RwLock<_>>`. Useful for tests and development
//! where persistence is not required.
//!
//! # Example
//!
//! ```rust,ignore
//! use recall::storage::inmemory::InMemoryProgressStore;
//!
//! let store = InMemoryProgressStore::new();
//! // Use store for testing...
//! ```

mod repository;

pub use repository::InMemoryProgressStore;
