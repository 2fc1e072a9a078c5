use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{SchedulerError, SchedulerParams};

/// Minimum interval (in days) for an item to count as mastered.
pub const MASTERED_INTERVAL_DAYS: u32 = 21;

/// Minimum consecutive correct recalls for an item to count as mastered.
pub const MASTERED_REPETITIONS: u32 = 3;

/// Minimum interval (in days) for an item to count as mature.
pub const MATURE_INTERVAL_DAYS: u32 = 60;

/// Quality of a learner's recall, ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grade {
    /// The item was not recalled.
    Failed,
    /// Recalled with serious difficulty.
    Hard,
    /// Recalled after some hesitation.
    Good,
    /// Recalled instantly.
    Easy,
}

impl Grade {
    /// Returns the integer encoding of this grade (0-3).
    pub fn score(self) -> u8 {
        match self {
            Grade::Failed => 0,
            Grade::Hard => 1,
            Grade::Good => 2,
            Grade::Easy => 3,
        }
    }

    /// Returns true if the grade counts as a correct recall.
    pub fn is_correct(self) -> bool {
        self >= Grade::Hard
    }

    /// Maps the grade onto the classic SM2 quality scale (0-5).
    pub fn sm2_quality(self) -> u8 {
        match self {
            Grade::Failed => 0,
            Grade::Hard => 3,
            Grade::Good => 4,
            Grade::Easy => 5,
        }
    }

    /// Returns the lowercase name of this grade.
    pub fn as_str(self) -> &'static str {
        match self {
            Grade::Failed => "failed",
            Grade::Hard => "hard",
            Grade::Good => "good",
            Grade::Easy => "easy",
        }
    }
}

impl TryFrom<i64> for Grade {
    type Error = SchedulerError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Grade::Failed),
            1 => Ok(Grade::Hard),
            2 => Ok(Grade::Good),
            3 => Ok(Grade::Easy),
            other => Err(SchedulerError::InvalidGrade(other)),
        }
    }
}

impl FromStr for Grade {
    type Err = SchedulerError;

    /// Parses either the integer encoding or the lowercase name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(score) = trimmed.parse::<i64>() {
            return Grade::try_from(score);
        }
        match trimmed.to_lowercase().as_str() {
            "failed" | "again" => Ok(Grade::Failed),
            "hard" => Ok(Grade::Hard),
            "good" => Ok(Grade::Good),
            "easy" => Ok(Grade::Easy),
            _ => Err(SchedulerError::UnknownGrade(trimmed.to_string())),
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learning stage of an item, derived from its scheduling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mastery {
    New,
    Learning,
    Mastered,
    Mature,
}

impl Mastery {
    /// Returns the lowercase name of this stage.
    pub fn as_str(self) -> &'static str {
        match self {
            Mastery::New => "new",
            Mastery::Learning => "learning",
            Mastery::Mastered => "mastered",
            Mastery::Mature => "mature",
        }
    }
}

impl FromStr for Mastery {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Mastery::New),
            "learning" => Ok(Mastery::Learning),
            "mastered" => Ok(Mastery::Mastered),
            "mature" => Ok(Mastery::Mature),
            other => Err(format!("Unknown mastery: {other}")),
        }
    }
}

/// Spaced-repetition state of one item for one learner.
///
/// Values are immutable snapshots: the scheduler returns a new value and the
/// store assigns the next `version` when the value is committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    pub learner_id: Uuid,
    pub item_id: Uuid,
    pub ease_factor: f64,
    pub interval_days: u32,
    /// Consecutive correct recalls.
    pub repetitions: u32,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency stamp. Zero means the state was never persisted.
    pub version: u64,
    pub total_reviews: u32,
    pub correct_reviews: u32,
}

impl LearningState {
    /// Creates the state of an item on first exposure: default ease, no
    /// interval and due immediately.
    pub fn new(
        learner_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
        params: &SchedulerParams,
    ) -> Self {
        Self {
            learner_id,
            item_id,
            ease_factor: params.initial_ease,
            interval_days: 0,
            repetitions: 0,
            due_at: now,
            last_reviewed_at: None,
            version: 0,
            total_reviews: 0,
            correct_reviews: 0,
        }
    }

    /// Sets the version (useful for testing and seeding).
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Sets the ease factor.
    pub fn with_ease_factor(mut self, ease_factor: f64) -> Self {
        self.ease_factor = ease_factor;
        self
    }

    /// Sets the repetitions and interval, keeping `due_at` consistent with
    /// `last_reviewed_at` when the state has been reviewed.
    pub fn with_progress(mut self, repetitions: u32, interval_days: u32) -> Self {
        self.repetitions = repetitions;
        self.interval_days = interval_days;
        if let Some(reviewed) = self.last_reviewed_at {
            self.due_at = reviewed + Duration::days(i64::from(interval_days));
        }
        self
    }

    /// Marks the state as last reviewed at `reviewed_at`, recomputing `due_at`.
    pub fn with_last_reviewed_at(mut self, reviewed_at: DateTime<Utc>) -> Self {
        self.last_reviewed_at = Some(reviewed_at);
        self.due_at = reviewed_at + Duration::days(i64::from(self.interval_days));
        self
    }

    /// Returns true if the item should be reviewed at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }

    /// Returns the derived learning stage.
    pub fn mastery(&self) -> Mastery {
        if self.last_reviewed_at.is_none() {
            Mastery::New
        } else if self.interval_days >= MATURE_INTERVAL_DAYS {
            Mastery::Mature
        } else if self.repetitions >= MASTERED_REPETITIONS
            && self.interval_days >= MASTERED_INTERVAL_DAYS
        {
            Mastery::Mastered
        } else {
            Mastery::Learning
        }
    }

    /// Percentage of correct reviews, rounded to one decimal.
    pub fn accuracy(&self) -> f64 {
        percentage(u64::from(self.correct_reviews), u64::from(self.total_reviews))
    }

    /// Returns true if `other` refers to the same learner and item.
    pub fn same_key(&self, other: &LearningState) -> bool {
        self.learner_id == other.learner_id && self.item_id == other.item_id
    }
}

/// One grading event, kept as append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub learner_id: Uuid,
    pub item_id: Uuid,
    pub grade: Grade,
    pub previous_ease: f64,
    pub new_ease: f64,
    pub previous_interval: u32,
    pub new_interval: u32,
    pub previous_mastery: Mastery,
    pub new_mastery: Mastery,
    pub reviewed_at: DateTime<Utc>,
    /// The study session the review was given in, if any.
    #[serde(default)]
    pub session_id: Option<Uuid>,
}

impl ReviewRecord {
    /// Builds the history entry for the transition `previous -> next`.
    pub fn between(
        previous: &LearningState,
        next: &LearningState,
        grade: Grade,
        reviewed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            learner_id: next.learner_id,
            item_id: next.item_id,
            grade,
            previous_ease: previous.ease_factor,
            new_ease: next.ease_factor,
            previous_interval: previous.interval_days,
            new_interval: next.interval_days,
            previous_mastery: previous.mastery(),
            new_mastery: next.mastery(),
            reviewed_at,
            session_id: None,
        }
    }

    /// Attaches the review to a study session.
    pub fn in_session(mut self, session_id: Option<Uuid>) -> Self {
        self.session_id = session_id;
        self
    }
}

pub(crate) fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 1000.0).round() / 10.0
}
