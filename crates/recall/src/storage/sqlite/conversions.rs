//! SQLite row conversion functions.
//!
//! Pure functions for converting between SQLite rows and domain types.
//! These are testable in isolation without database access.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use uuid::Uuid;

use recall_core::progress::{Grade, LearningState, Mastery, ReviewRecord, StudySession};
use recall_core::storage::StoreError;

/// Owned column values of a learning state, in `INSERT_STATE` order.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRow {
    pub learner_id: String,
    pub item_id: String,
    pub ease_factor: f64,
    pub interval_days: i64,
    pub repetitions: i64,
    pub due_at: String,
    pub last_reviewed_at: Option<String>,
    pub version: i64,
    pub total_reviews: i64,
    pub correct_reviews: i64,
}

impl StateRow {
    pub fn from_state(state: &LearningState) -> Result<Self, StoreError> {
        Ok(Self {
            learner_id: state.learner_id.to_string(),
            item_id: state.item_id.to_string(),
            ease_factor: state.ease_factor,
            interval_days: i64::from(state.interval_days),
            repetitions: i64::from(state.repetitions),
            due_at: format_datetime(&state.due_at),
            last_reviewed_at: state.last_reviewed_at.as_ref().map(format_datetime),
            version: version_to_sql(state.version)?,
            total_reviews: i64::from(state.total_reviews),
            correct_reviews: i64::from(state.correct_reviews),
        })
    }
}

/// Convert a SQLite row to a LearningState.
///
/// Expected columns: learner_id, item_id, ease_factor, interval_days,
/// repetitions, due_at, last_reviewed_at, version, total_reviews,
/// correct_reviews
pub fn row_to_state(row: &Row) -> rusqlite::Result<LearningState> {
    let learner_id: String = row.get(0)?;
    let item_id: String = row.get(1)?;
    let due_at: String = row.get(5)?;
    let last_reviewed_at: Option<String> = row.get(6)?;

    Ok(LearningState {
        learner_id: parse_uuid(0, &learner_id)?,
        item_id: parse_uuid(1, &item_id)?,
        ease_factor: row.get(2)?,
        interval_days: parse_count(3, row.get(3)?)?,
        repetitions: parse_count(4, row.get(4)?)?,
        due_at: parse_datetime(5, &due_at)?,
        last_reviewed_at: last_reviewed_at
            .map(|s| parse_datetime(6, &s))
            .transpose()?,
        version: parse_version(7, row.get(7)?)?,
        total_reviews: parse_count(8, row.get(8)?)?,
        correct_reviews: parse_count(9, row.get(9)?)?,
    })
}

/// Convert a SQLite row to a ReviewRecord.
///
/// Expected columns: learner_id, item_id, grade, previous_ease, new_ease,
/// previous_interval, new_interval, previous_mastery, new_mastery,
/// reviewed_at, session_id
pub fn row_to_review(row: &Row) -> rusqlite::Result<ReviewRecord> {
    let learner_id: String = row.get(0)?;
    let item_id: String = row.get(1)?;
    let grade: String = row.get(2)?;
    let previous_mastery: String = row.get(7)?;
    let new_mastery: String = row.get(8)?;
    let reviewed_at: String = row.get(9)?;
    let session_id: Option<String> = row.get(10)?;

    Ok(ReviewRecord {
        learner_id: parse_uuid(0, &learner_id)?,
        item_id: parse_uuid(1, &item_id)?,
        grade: parse_grade(2, &grade)?,
        previous_ease: row.get(3)?,
        new_ease: row.get(4)?,
        previous_interval: parse_count(5, row.get(5)?)?,
        new_interval: parse_count(6, row.get(6)?)?,
        previous_mastery: parse_mastery(7, &previous_mastery)?,
        new_mastery: parse_mastery(8, &new_mastery)?,
        reviewed_at: parse_datetime(9, &reviewed_at)?,
        session_id: session_id.map(|s| parse_uuid(10, &s)).transpose()?,
    })
}

/// Convert a SQLite row to a StudySession.
///
/// Expected columns: id, learner_id, started_at, finished_at
pub fn row_to_session(row: &Row) -> rusqlite::Result<StudySession> {
    let id: String = row.get(0)?;
    let learner_id: String = row.get(1)?;
    let started_at: String = row.get(2)?;
    let finished_at: Option<String> = row.get(3)?;

    Ok(StudySession {
        id: parse_uuid(0, &id)?,
        learner_id: parse_uuid(1, &learner_id)?,
        started_at: parse_datetime(2, &started_at)?,
        finished_at: finished_at.map(|s| parse_datetime(3, &s)).transpose()?,
    })
}

// ============================================================================
// Helper functions
// ============================================================================

fn conversion_error(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn invalid(column: usize, message: String) -> rusqlite::Error {
    conversion_error(
        column,
        std::io::Error::new(std::io::ErrorKind::InvalidData, message),
    )
}

fn parse_uuid(column: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| conversion_error(column, e))
}

/// Parse a datetime from RFC 3339 string.
fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn parse_grade(column: usize, s: &str) -> rusqlite::Result<Grade> {
    s.parse::<Grade>().map_err(|e| conversion_error(column, e))
}

fn parse_mastery(column: usize, s: &str) -> rusqlite::Result<Mastery> {
    s.parse::<Mastery>().map_err(|e| invalid(column, e))
}

fn parse_count(column: usize, value: i64) -> rusqlite::Result<u32> {
    u32::try_from(value).map_err(|_| invalid(column, format!("count out of range: {value}")))
}

fn parse_version(column: usize, value: i64) -> rusqlite::Result<u64> {
    u64::try_from(value).map_err(|_| invalid(column, format!("negative version: {value}")))
}

/// Format a DateTime<Utc> for SQLite storage.
///
/// Fixed-width nanosecond RFC 3339, so text order matches time order and
/// values round-trip exactly.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn version_to_sql(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::InvalidData(format!("version out of range: {version}")))
}
