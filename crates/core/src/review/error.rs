use thiserror::Error;

use crate::progress::SchedulerError;
use crate::storage::StoreError;

/// Errors surfaced to callers of the review service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReviewError {
    #[error(transparent)]
    InvalidGrade(#[from] SchedulerError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Version conflict: {0}")]
    VersionConflict(String),
    #[error("Session finished: {0}")]
    SessionFinished(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ReviewError {
    /// Returns true if the same request may succeed when repeated later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReviewError::VersionConflict(_) | ReviewError::StoreUnavailable(_)
        )
    }
}

impl From<StoreError> for ReviewError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => ReviewError::NotFound(error.to_string()),
            StoreError::SessionFinished { id } => ReviewError::SessionFinished(id.to_string()),
            StoreError::AlreadyExists { .. } | StoreError::VersionConflict { .. } => {
                ReviewError::VersionConflict(error.to_string())
            }
            StoreError::Unavailable(_)
            | StoreError::QueryFailed(_)
            | StoreError::Serialization(_)
            | StoreError::InvalidData(_) => ReviewError::StoreUnavailable(error.to_string()),
        }
    }
}

/// Result type for review service operations.
pub type Result<T> = std::result::Result<T, ReviewError>;
