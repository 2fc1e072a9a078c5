//! SQLite schema definitions and SQL query constants.
//!
//! This module contains all SQL statements used by the SQLite store,
//! following the Functional Core pattern - pure data, no I/O.

/// SQL statement to create all tables.
pub const CREATE_TABLES: &str = r#"
-- One row per learner x item
CREATE TABLE IF NOT EXISTS learning_states (
    learner_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    ease_factor REAL NOT NULL,
    interval_days INTEGER NOT NULL,
    repetitions INTEGER NOT NULL,
    due_at TEXT NOT NULL,
    last_reviewed_at TEXT,
    version INTEGER NOT NULL,
    total_reviews INTEGER NOT NULL DEFAULT 0,
    correct_reviews INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (learner_id, item_id)
);

-- Append-only review history
CREATE TABLE IF NOT EXISTS review_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    learner_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    grade TEXT NOT NULL,
    previous_ease REAL NOT NULL,
    new_ease REAL NOT NULL,
    previous_interval INTEGER NOT NULL,
    new_interval INTEGER NOT NULL,
    previous_mastery TEXT NOT NULL,
    new_mastery TEXT NOT NULL,
    reviewed_at TEXT NOT NULL,
    session_id TEXT REFERENCES study_sessions(id)
);

CREATE TABLE IF NOT EXISTS study_sessions (
    id TEXT PRIMARY KEY,
    learner_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_learning_states_schedule ON learning_states(learner_id, due_at, item_id);
CREATE INDEX IF NOT EXISTS idx_review_records_item ON review_records(learner_id, item_id);
CREATE INDEX IF NOT EXISTS idx_review_records_session ON review_records(session_id);
"#;

#[cfg(test)]
const STATE_COLUMNS: &str = "learner_id, item_id, ease_factor, interval_days, repetitions, due_at, last_reviewed_at, version, total_reviews, correct_reviews";

pub const SELECT_STATE: &str = r#"
SELECT learner_id, item_id, ease_factor, interval_days, repetitions, due_at, last_reviewed_at, version, total_reviews, correct_reviews
FROM learning_states
WHERE learner_id = ?1 AND item_id = ?2
"#;

pub const SELECT_STATES_BY_LEARNER: &str = r#"
SELECT learner_id, item_id, ease_factor, interval_days, repetitions, due_at, last_reviewed_at, version, total_reviews, correct_reviews
FROM learning_states
WHERE learner_id = ?1
ORDER BY due_at ASC, item_id ASC
"#;

pub const SELECT_STATE_VERSION: &str = r#"
SELECT version
FROM learning_states
WHERE learner_id = ?1 AND item_id = ?2
"#;

/// Inserts a state unless the key exists. Zero affected rows means conflict.
pub const INSERT_STATE: &str = r#"
INSERT INTO learning_states (learner_id, item_id, ease_factor, interval_days, repetitions, due_at, last_reviewed_at, version, total_reviews, correct_reviews)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT (learner_id, item_id) DO NOTHING
"#;

/// Conditional update. `?11` is the expected stored version.
pub const UPDATE_STATE_IF_VERSION: &str = r#"
UPDATE learning_states
SET ease_factor = ?3, interval_days = ?4, repetitions = ?5, due_at = ?6, last_reviewed_at = ?7, version = ?8, total_reviews = ?9, correct_reviews = ?10
WHERE learner_id = ?1 AND item_id = ?2 AND version = ?11
"#;

#[cfg(test)]
const REVIEW_COLUMNS: &str = "learner_id, item_id, grade, previous_ease, new_ease, previous_interval, new_interval, previous_mastery, new_mastery, reviewed_at, session_id";

pub const INSERT_REVIEW: &str = r#"
INSERT INTO review_records (learner_id, item_id, grade, previous_ease, new_ease, previous_interval, new_interval, previous_mastery, new_mastery, reviewed_at, session_id)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

pub const SELECT_REVIEWS: &str = r#"
SELECT learner_id, item_id, grade, previous_ease, new_ease, previous_interval, new_interval, previous_mastery, new_mastery, reviewed_at, session_id
FROM review_records
WHERE learner_id = ?1 AND item_id = ?2
ORDER BY id ASC
"#;

pub const SELECT_REVIEWS_BY_SESSION: &str = r#"
SELECT learner_id, item_id, grade, previous_ease, new_ease, previous_interval, new_interval, previous_mastery, new_mastery, reviewed_at, session_id
FROM review_records
WHERE session_id = ?1
ORDER BY id ASC
"#;

pub const INSERT_SESSION: &str = r#"
INSERT INTO study_sessions (id, learner_id, started_at, finished_at)
VALUES (?1, ?2, ?3, ?4)
ON CONFLICT (id) DO NOTHING
"#;

pub const SELECT_SESSION: &str = r#"
SELECT id, learner_id, started_at, finished_at
FROM study_sessions
WHERE id = ?1
"#;

/// Closes an open session. Zero affected rows means missing or finished.
pub const FINISH_SESSION: &str = r#"
UPDATE study_sessions
SET finished_at = ?2
WHERE id = ?1 AND finished_at IS NULL
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_tables_is_valid_sql() {
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS learning_states"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS review_records"));
        assert!(CREATE_TABLES.contains("CREATE TABLE IF NOT EXISTS study_sessions"));
        assert!(CREATE_TABLES.contains("PRIMARY KEY (learner_id, item_id)"));
    }

    #[test]
    fn test_state_queries_share_column_order() {
        for query in [SELECT_STATE, SELECT_STATES_BY_LEARNER, INSERT_STATE] {
            assert!(query.contains(STATE_COLUMNS), "column mismatch in {query}");
        }
    }

    #[test]
    fn test_review_queries_share_column_order() {
        for query in [INSERT_REVIEW, SELECT_REVIEWS, SELECT_REVIEWS_BY_SESSION] {
            assert!(query.contains(REVIEW_COLUMNS), "column mismatch in {query}");
        }
    }

    #[test]
    fn test_queries_contain_expected_keywords() {
        assert!(SELECT_STATES_BY_LEARNER.contains("ORDER BY due_at ASC, item_id ASC"));
        assert!(INSERT_STATE.contains("DO NOTHING"));
        assert!(UPDATE_STATE_IF_VERSION.contains("AND version = ?11"));
        assert!(INSERT_REVIEW.contains("INSERT"));
        assert!(SELECT_REVIEWS.contains("ORDER BY id ASC"));
        assert!(FINISH_SESSION.contains("finished_at IS NULL"));
    }
}
