//! In-memory progress store implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use recall_core::progress::{sort_schedule, LearningState, ReviewRecord, StudySession};
use recall_core::storage::{
    record_id, ProgressStore, Result, StagedWrite, StoreError, WriteBatch,
};

type Key = (Uuid, Uuid);

/// In-memory storage backend for testing.
///
/// Uses HashMaps wrapped in `Arc<RwLock<_>>` for thread-safe access.
/// Data is not persisted and will be lost when the store is dropped.
///
/// Lock order is always `states`, `reviews`, then `sessions`.
#[derive(Debug, Clone)]
pub struct InMemoryProgressStore {
    states: Arc<RwLock<HashMap<Key, LearningState>>>,
    reviews: Arc<RwLock<HashMap<Key, Vec<ReviewRecord>>>>,
    sessions: Arc<RwLock<HashMap<Uuid, StudySession>>>,
}

impl Default for InMemoryProgressStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProgressStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::with_records([])
    }

    /// Creates a store holding the given states exactly as provided,
    /// versions included.
    pub fn with_records(states: impl IntoIterator<Item = LearningState>) -> Self {
        let states = states
            .into_iter()
            .map(|s| ((s.learner_id, s.item_id), s))
            .collect();
        Self {
            states: Arc::new(RwLock::new(states)),
            reviews: Arc::new(RwLock::new(HashMap::new())),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

/// Checks one staged state write against the stored version.
fn validate(write: &StagedWrite, state: &LearningState, stored: Option<u64>) -> Result<()> {
    match (write, stored) {
        (StagedWrite::Insert(_), None) => Ok(()),
        (StagedWrite::Insert(_), Some(actual)) => Err(StoreError::VersionConflict {
            id: record_id(state.learner_id, state.item_id),
            expected: 0,
            actual,
        }),
        (StagedWrite::Update(_), None) => {
            Err(StoreError::state_not_found(state.learner_id, state.item_id))
        }
        (StagedWrite::Update(staged), Some(actual)) if actual != staged.version => {
            Err(StoreError::VersionConflict {
                id: record_id(state.learner_id, state.item_id),
                expected: staged.version,
                actual,
            })
        }
        _ => Ok(()),
    }
}

/// Checks that a review may be recorded against its study session.
fn validate_session(
    record: &ReviewRecord,
    sessions: &HashMap<Uuid, StudySession>,
) -> Result<()> {
    let Some(session_id) = record.session_id else {
        return Ok(());
    };
    match sessions.get(&session_id) {
        None => Err(StoreError::session_not_found(session_id)),
        Some(session) if !session.is_open() => {
            Err(StoreError::SessionFinished { id: session_id })
        }
        Some(session) if session.learner_id != record.learner_id => {
            Err(StoreError::InvalidData(format!(
                "review of learner {} in session {session_id} of learner {}",
                record.learner_id, session.learner_id
            )))
        }
        Some(_) => Ok(()),
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn get(&self, learner_id: Uuid, item_id: Uuid) -> Result<Option<LearningState>> {
        let states = self.states.read().await;
        Ok(states.get(&(learner_id, item_id)).cloned())
    }

    async fn list_for_learner(&self, learner_id: Uuid) -> Result<Vec<LearningState>> {
        let states = self.states.read().await;
        let mut result: Vec<LearningState> = states
            .values()
            .filter(|s| s.learner_id == learner_id)
            .cloned()
            .collect();
        sort_schedule(&mut result);
        Ok(result)
    }

    async fn reviews_for(&self, learner_id: Uuid, item_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let reviews = self.reviews.read().await;
        Ok(reviews
            .get(&(learner_id, item_id))
            .cloned()
            .unwrap_or_default())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<LearningState>> {
        let mut states = self.states.write().await;
        let mut reviews = self.reviews.write().await;
        let sessions = self.sessions.read().await;

        // Validate the whole batch before the first mutation
        let mut committed = Vec::new();
        for write in batch.states() {
            let Some(next) = write.committed_state() else {
                continue;
            };
            let stored = states
                .get(&(next.learner_id, next.item_id))
                .map(|s| s.version);
            validate(write, &next, stored)?;
            committed.push(next);
        }
        for record in batch.reviews() {
            validate_session(record, &sessions)?;
        }

        for state in &committed {
            states.insert((state.learner_id, state.item_id), state.clone());
        }
        for record in batch.reviews() {
            reviews
                .entry((record.learner_id, record.item_id))
                .or_default()
                .push(record.clone());
        }

        Ok(committed)
    }

    async fn start_session(&self, session: &StudySession) -> Result<StudySession> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(StoreError::AlreadyExists {
                entity_type: "StudySession",
                id: session.id.to_string(),
            });
        }
        sessions.insert(session.id, session.clone());
        Ok(session.clone())
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<StudySession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&session_id).cloned())
    }

    async fn finish_session(
        &self,
        session_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<StudySession> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| StoreError::session_not_found(session_id))?;
        if !session.is_open() {
            return Err(StoreError::SessionFinished { id: session_id });
        }
        session.finished_at = Some(finished_at);
        Ok(session.clone())
    }

    async fn reviews_for_session(&self, session_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let reviews = self.reviews.read().await;
        let mut result: Vec<ReviewRecord> = reviews
            .values()
            .flatten()
            .filter(|r| r.session_id == Some(session_id))
            .cloned()
            .collect();
        result.sort_by_key(|r| r.reviewed_at);
        Ok(result)
    }
}
