use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::progress::{LearningState, ReviewRecord, StudySession};

use super::{record_id, Result, StoreError, WriteBatch};

/// Persistence of learning states with optimistic concurrency.
///
/// Every stored state carries a version that grows by exactly one per
/// successful write. A write names the version it expects to replace and is
/// rejected with [`StoreError::VersionConflict`] when the stored version
/// differs.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Gets the state of one item for one learner.
    async fn get(&self, learner_id: Uuid, item_id: Uuid) -> Result<Option<LearningState>>;

    /// Gets all states of a learner, ordered by `due_at` then `item_id`.
    async fn list_for_learner(&self, learner_id: Uuid) -> Result<Vec<LearningState>>;

    /// Gets the review history of one item, oldest first.
    async fn reviews_for(&self, learner_id: Uuid, item_id: Uuid) -> Result<Vec<ReviewRecord>>;

    /// Applies all writes of a batch or none of them.
    ///
    /// Returns the committed states in staging order. Fails with
    /// `VersionConflict` if an insert targets an existing key or an update
    /// expects a version other than the stored one, and with `NotFound` if
    /// an update targets a missing key. A review that names a study session
    /// fails the batch with `NotFound` if the session is unknown and with
    /// `SessionFinished` if it is closed. A failed commit mutates nothing.
    async fn commit(&self, batch: WriteBatch) -> Result<Vec<LearningState>>;

    /// Stores a newly started study session.
    ///
    /// Fails with `AlreadyExists` if a session with the same id is stored.
    async fn start_session(&self, session: &StudySession) -> Result<StudySession>;

    async fn get_session(&self, session_id: Uuid) -> Result<Option<StudySession>>;

    /// Closes an open study session.
    ///
    /// Fails with `NotFound` for an unknown session and with
    /// `SessionFinished` if it was already closed.
    async fn finish_session(
        &self,
        session_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<StudySession>;

    /// Gets the reviews given during a study session, oldest first.
    async fn reviews_for_session(&self, session_id: Uuid) -> Result<Vec<ReviewRecord>>;

    /// Stores the first version of a state.
    async fn create(&self, initial: &LearningState) -> Result<LearningState> {
        let mut batch = WriteBatch::new();
        batch.insert(initial.clone());
        match self.commit(batch).await {
            Ok(committed) => single(committed, initial),
            Err(StoreError::VersionConflict { id, .. }) => Err(StoreError::AlreadyExists {
                entity_type: "LearningState",
                id,
            }),
            Err(e) => Err(e),
        }
    }

    /// Replaces a stored state if its version still equals `state.version`.
    async fn compare_and_swap(&self, state: &LearningState) -> Result<LearningState> {
        let mut batch = WriteBatch::new();
        batch.update(state.clone());
        let committed = self.commit(batch).await?;
        single(committed, state)
    }
}

fn single(mut committed: Vec<LearningState>, state: &LearningState) -> Result<LearningState> {
    committed.pop().ok_or_else(|| {
        StoreError::InvalidData(format!(
            "commit returned no state for {}",
            record_id(state.learner_id, state.item_id)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;

    use crate::progress::SchedulerParams;

    /// Store whose commit replays a scripted outcome.
    struct ScriptedStore {
        outcome: Mutex<Option<Result<Vec<LearningState>>>>,
    }

    impl ScriptedStore {
        fn new(outcome: Result<Vec<LearningState>>) -> Self {
            Self {
                outcome: Mutex::new(Some(outcome)),
            }
        }
    }

    #[async_trait]
    impl ProgressStore for ScriptedStore {
        async fn get(&self, _: Uuid, _: Uuid) -> Result<Option<LearningState>> {
            Ok(None)
        }

        async fn list_for_learner(&self, _: Uuid) -> Result<Vec<LearningState>> {
            Ok(Vec::new())
        }

        async fn reviews_for(&self, _: Uuid, _: Uuid) -> Result<Vec<ReviewRecord>> {
            Ok(Vec::new())
        }

        async fn commit(&self, _: WriteBatch) -> Result<Vec<LearningState>> {
            self.outcome
                .lock()
                .unwrap()
                .take()
                .expect("commit called more than once")
        }

        async fn start_session(&self, session: &StudySession) -> Result<StudySession> {
            Ok(session.clone())
        }

        async fn get_session(&self, _: Uuid) -> Result<Option<StudySession>> {
            Ok(None)
        }

        async fn finish_session(&self, id: Uuid, _: DateTime<Utc>) -> Result<StudySession> {
            Err(StoreError::session_not_found(id))
        }

        async fn reviews_for_session(&self, _: Uuid) -> Result<Vec<ReviewRecord>> {
            Ok(Vec::new())
        }
    }

    fn state(version: u64) -> LearningState {
        LearningState::new(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap(),
            &SchedulerParams::default(),
        )
        .with_version(version)
    }

    #[tokio::test]
    async fn test_create_returns_committed_state() {
        let store = ScriptedStore::new(Ok(vec![state(1)]));

        let created = store.create(&state(0)).await.unwrap();

        assert_eq!(created.version, 1);
    }

    #[tokio::test]
    async fn test_create_reports_conflict_as_already_exists() {
        let id = record_id(Uuid::from_u128(1), Uuid::from_u128(2));
        let store = ScriptedStore::new(Err(StoreError::VersionConflict {
            id: id.clone(),
            expected: 0,
            actual: 3,
        }));

        let result = store.create(&state(0)).await;

        assert_eq!(
            result,
            Err(StoreError::AlreadyExists {
                entity_type: "LearningState",
                id,
            })
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_passes_conflicts_through() {
        let conflict = StoreError::VersionConflict {
            id: "a/b".to_string(),
            expected: 4,
            actual: 5,
        };
        let store = ScriptedStore::new(Err(conflict.clone()));

        assert_eq!(store.compare_and_swap(&state(4)).await, Err(conflict));
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_empty_commit() {
        let store = ScriptedStore::new(Ok(Vec::new()));

        let result = store.compare_and_swap(&state(4)).await;

        assert!(matches!(result, Err(StoreError::InvalidData(msg)) if msg.contains("no state")));
    }
}
