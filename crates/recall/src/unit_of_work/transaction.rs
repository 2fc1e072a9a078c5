use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use recall_core::progress::{LearningState, ReviewRecord};
use recall_core::storage::{ProgressStore, Result, WriteBatch};

/// Handle given to one attempt of a unit of work.
///
/// Reads go to the store unless the key was already staged in this attempt,
/// in which case the staged state is returned. Writes are only staged; they
/// reach the store when the attempt's operation returns `Ok`.
pub struct Transaction<S> {
    store: Arc<S>,
    staged: Arc<Mutex<WriteBatch>>,
    attempt: u32,
}

impl<S> Clone for Transaction<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            staged: Arc::clone(&self.staged),
            attempt: self.attempt,
        }
    }
}

impl<S: ProgressStore> Transaction<S> {
    pub(crate) fn new(store: Arc<S>, attempt: u32) -> Self {
        Self {
            store,
            staged: Arc::new(Mutex::new(WriteBatch::new())),
            attempt,
        }
    }

    /// One-based number of the attempt this transaction belongs to.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub async fn get(&self, learner_id: Uuid, item_id: Uuid) -> Result<Option<LearningState>> {
        let staged = self.staged.lock().await.staged(learner_id, item_id).cloned();
        match staged {
            Some(state) => Ok(Some(state)),
            None => self.store.get(learner_id, item_id).await,
        }
    }

    /// Stages the first persisted version of a state.
    pub async fn insert(&self, state: LearningState) {
        self.staged.lock().await.insert(state);
    }

    /// Stages an update expecting the stored version to be `state.version`.
    pub async fn update(&self, state: LearningState) {
        self.staged.lock().await.update(state);
    }

    pub async fn record_review(&self, record: ReviewRecord) {
        self.staged.lock().await.append_review(record);
    }

    pub(crate) async fn take_batch(&self) -> WriteBatch {
        std::mem::take(&mut *self.staged.lock().await)
    }
}
