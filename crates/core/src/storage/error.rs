use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during progress store operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    /// The stored version differs from the one the write expected.
    /// `actual` is 0 when no record is stored.
    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: String,
        expected: u64,
        actual: u64,
    },
    /// A review or finish targeted a study session that is already closed.
    #[error("Study session already finished: {id}")]
    SessionFinished { id: Uuid },
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Returns true if retrying against fresh state may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }

    pub fn state_not_found(learner_id: Uuid, item_id: Uuid) -> Self {
        StoreError::NotFound {
            entity_type: "LearningState",
            id: record_id(learner_id, item_id),
        }
    }

    pub fn session_not_found(session_id: Uuid) -> Self {
        StoreError::NotFound {
            entity_type: "StudySession",
            id: session_id.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Display identifier of a learning state record.
pub fn record_id(learner_id: Uuid, item_id: Uuid) -> String {
    format!("{learner_id}/{item_id}")
}
