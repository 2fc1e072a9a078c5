use uuid::Uuid;

use crate::progress::{LearningState, ReviewRecord};

/// A single write staged for an atomic commit.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedWrite {
    /// Stores a state that must not exist yet.
    Insert(LearningState),
    /// Replaces a stored state whose version equals `state.version`.
    Update(LearningState),
    /// Appends an entry to the review history.
    AppendReview(ReviewRecord),
}

impl StagedWrite {
    /// The stored version this write expects. Zero means "absent".
    pub fn expected_version(&self) -> Option<u64> {
        match self {
            StagedWrite::Insert(_) => Some(0),
            StagedWrite::Update(state) => Some(state.version),
            StagedWrite::AppendReview(_) => None,
        }
    }

    /// The state as it is stored once this write commits.
    pub fn committed_state(&self) -> Option<LearningState> {
        let expected = self.expected_version()?;
        match self {
            StagedWrite::Insert(state) | StagedWrite::Update(state) => Some(LearningState {
                version: expected + 1,
                ..state.clone()
            }),
            StagedWrite::AppendReview(_) => None,
        }
    }

    fn state(&self) -> Option<&LearningState> {
        match self {
            StagedWrite::Insert(state) | StagedWrite::Update(state) => Some(state),
            StagedWrite::AppendReview(_) => None,
        }
    }

    fn state_mut(&mut self) -> Option<&mut LearningState> {
        match self {
            StagedWrite::Insert(state) | StagedWrite::Update(state) => Some(state),
            StagedWrite::AppendReview(_) => None,
        }
    }
}

/// Ordered set of writes committed all-or-nothing.
///
/// At most one state write is kept per (learner, item). Staging the same key
/// twice replaces the staged state but keeps the kind and expected version
/// of the first write, so a batch always validates against what the
/// operation originally read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<StagedWrite>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages the first persisted version of a state.
    pub fn insert(&mut self, state: LearningState) {
        self.stage_state(StagedWrite::Insert(state));
    }

    /// Stages an update expecting the stored version to be `state.version`.
    pub fn update(&mut self, state: LearningState) {
        self.stage_state(StagedWrite::Update(state));
    }

    pub fn append_review(&mut self, record: ReviewRecord) {
        self.writes.push(StagedWrite::AppendReview(record));
    }

    /// Returns the staged state for a key, if any.
    pub fn staged(&self, learner_id: Uuid, item_id: Uuid) -> Option<&LearningState> {
        self.writes
            .iter()
            .filter_map(StagedWrite::state)
            .find(|s| s.learner_id == learner_id && s.item_id == item_id)
    }

    /// Staged state writes in staging order.
    pub fn states(&self) -> impl Iterator<Item = &StagedWrite> {
        self.writes.iter().filter(|w| w.state().is_some())
    }

    /// Staged review records in staging order.
    pub fn reviews(&self) -> impl Iterator<Item = &ReviewRecord> {
        self.writes.iter().filter_map(|w| match w {
            StagedWrite::AppendReview(record) => Some(record),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<StagedWrite> {
        self.writes
    }

    fn stage_state(&mut self, write: StagedWrite) {
        let Some(new_state) = write.state() else {
            return;
        };
        let existing = self
            .writes
            .iter_mut()
            .filter_map(StagedWrite::state_mut)
            .find(|s| s.same_key(new_state));

        match existing {
            Some(staged) => {
                let version = staged.version;
                *staged = LearningState {
                    version,
                    ..new_state.clone()
                };
            }
            None => self.writes.push(write),
        }
    }
}
