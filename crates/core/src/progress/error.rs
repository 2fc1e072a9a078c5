use thiserror::Error;

/// Errors that can occur while scheduling a review.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Invalid grade: {0} (expected 0-3)")]
    InvalidGrade(i64),
    #[error("Unknown grade name: {0}")]
    UnknownGrade(String),
}

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;
