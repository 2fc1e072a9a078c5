//! Pure domain logic for recall.
//!
//! Everything in this crate is free of I/O: learning-state types, the SM2
//! scheduler, the error taxonomy and the traits that storage and cache
//! backends implement in the `recall` crate.

pub mod cache;
pub mod progress;
pub mod review;
pub mod storage;
