use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::percentage;
use super::ReviewRecord;

/// A bounded stretch of study by one learner.
///
/// Reviews graded inside a session carry its id, which is what the
/// end-of-session summary is computed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySession {
    pub id: Uuid,
    pub learner_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StudySession {
    /// Opens a session for `learner_id` at `started_at`.
    pub fn start(id: Uuid, learner_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            learner_id,
            started_at,
            finished_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// What a learner did during one study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub session: StudySession,
    pub studied: u64,
    pub correct: u64,
    pub incorrect: u64,
    /// Percentage of correct reviews, rounded to one decimal.
    pub accuracy: f64,
}

impl SessionSummary {
    /// Summarizes `reviews`, which must all belong to `session`.
    pub fn from_reviews(session: StudySession, reviews: &[ReviewRecord]) -> Self {
        let studied = reviews.len() as u64;
        let correct = reviews.iter().filter(|r| r.grade.is_correct()).count() as u64;
        Self {
            session,
            studied,
            correct,
            incorrect: studied - correct,
            accuracy: percentage(correct, studied),
        }
    }
}
