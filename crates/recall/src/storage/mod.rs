//! Storage backend implementations.
//!
//! This module provides concrete implementations of the
//! [`ProgressStore`](recall_core::storage::ProgressStore) trait.
//!
//! # Feature Flags
//!
//! - `sqlite` (default): SQLite storage backend using `rusqlite` and `tokio-rusqlite`
//!
//! The in-memory backend is always compiled; it backs the test suites.
//!
//! # Examples
//!
//! Build without SQLite:
//! ```bash
//! cargo build -p recall --no-default-features
//! ```

pub mod inmemory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use inmemory::InMemoryProgressStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProgressStore;
