//! Spaced-repetition review scheduling on top of `recall_core`.
//!
//! This crate holds the imperative shell: storage backends, the in-memory
//! cache, the unit of work and the review service that ties them together.

pub mod cache;
pub mod config;
pub mod service;
pub mod storage;
pub mod unit_of_work;
