//! Application services built on the store, cache and unit of work.

mod review;

pub use review::{ReviewService, ReviewSettings};
