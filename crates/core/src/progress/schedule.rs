use std::cmp::Ordering;
use std::iter::FusedIterator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::percentage;
use super::{LearningState, Mastery};

/// Orders states by `due_at` ascending, then `item_id` ascending.
pub fn compare_schedule(a: &LearningState, b: &LearningState) -> Ordering {
    a.due_at
        .cmp(&b.due_at)
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Sorts states into schedule order. See [`compare_schedule`].
pub fn sort_schedule(states: &mut [LearningState]) {
    states.sort_by(compare_schedule);
}

/// Due states of a learner, in schedule order.
///
/// The iterator is lazy and consumes its input: once exhausted it cannot be
/// restarted. It stops at the first state that is not yet due or after
/// `limit` items, whichever comes first.
#[derive(Debug)]
pub struct DueItems {
    states: std::vec::IntoIter<LearningState>,
    now: DateTime<Utc>,
    remaining: usize,
}

impl DueItems {
    /// Creates the due sequence from a learner's schedule.
    pub fn new(mut states: Vec<LearningState>, now: DateTime<Utc>, limit: usize) -> Self {
        sort_schedule(&mut states);
        Self {
            states: states.into_iter(),
            now,
            remaining: limit,
        }
    }
}

impl Iterator for DueItems {
    type Item = LearningState;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let state = self.states.next()?;
        if !state.is_due(self.now) {
            self.remaining = 0;
            return None;
        }
        self.remaining -= 1;
        Some(state)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining.min(self.states.len())))
    }
}

impl FusedIterator for DueItems {}

/// Aggregated review statistics of one learner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearnerStats {
    pub total_items: usize,
    pub due_now: usize,
    pub total_reviews: u64,
    pub correct_reviews: u64,
    pub new: usize,
    pub learning: usize,
    pub mastered: usize,
    pub mature: usize,
}

impl LearnerStats {
    /// Computes the statistics of a learner's schedule at `now`.
    pub fn from_states(states: &[LearningState], now: DateTime<Utc>) -> Self {
        states.iter().fold(Self::default(), |mut stats, state| {
            stats.total_items += 1;
            if state.is_due(now) {
                stats.due_now += 1;
            }
            stats.total_reviews += u64::from(state.total_reviews);
            stats.correct_reviews += u64::from(state.correct_reviews);
            match state.mastery() {
                Mastery::New => stats.new += 1,
                Mastery::Learning => stats.learning += 1,
                Mastery::Mastered => stats.mastered += 1,
                Mastery::Mature => stats.mature += 1,
            }
            stats
        })
    }

    /// Percentage of correct reviews, rounded to one decimal.
    pub fn accuracy(&self) -> f64 {
        percentage(self.correct_reviews, self.total_reviews)
    }
}

/// One item of a learner's detailed progress listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemProgress {
    #[serde(flatten)]
    pub state: LearningState,
    pub mastery: Mastery,
    pub accuracy: f64,
}

impl From<LearningState> for ItemProgress {
    fn from(state: LearningState) -> Self {
        Self {
            mastery: state.mastery(),
            accuracy: state.accuracy(),
            state,
        }
    }
}
