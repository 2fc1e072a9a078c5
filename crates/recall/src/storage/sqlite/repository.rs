//! SQLite progress store implementation.
//!
//! Implements [`ProgressStore`] from `recall_core::storage` using SQLite.
//! A batch commit runs inside one SQLite transaction; updates are
//! conditional on the stored version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::Connection;
use uuid::Uuid;

use recall_core::progress::{LearningState, ReviewRecord, StudySession};
use recall_core::storage::{
    record_id, ProgressStore, Result, StagedWrite, StoreError, WriteBatch,
};

use super::conversions::{
    format_datetime, row_to_review, row_to_session, row_to_state, version_to_sql, StateRow,
};
use super::error::{domain_err, map_tokio_rusqlite_error_with_id};
use super::schema;

const ENTITY: &str = "LearningState";
const SESSION_ENTITY: &str = "StudySession";

/// Helper to wrap rusqlite errors for tokio_rusqlite closures.
fn wrap_err(e: rusqlite::Error) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Rusqlite(e)
}

/// SQLite-based progress store.
#[derive(Clone)]
pub struct SqliteProgressStore {
    conn: Connection,
}

impl SqliteProgressStore {
    /// Opens a file-based database, creating the file and schema as needed.
    pub async fn new(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    /// Creates a store backed by an in-memory database.
    ///
    /// Useful for testing - data is lost when the connection is dropped.
    pub async fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Self::init_schema(&conn).await?;

        Ok(Self { conn })
    }

    async fn init_schema(conn: &Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(schema::CREATE_TABLES)
                .map_err(wrap_err)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::QueryFailed(e.to_string()))
    }
}

/// Stored version of a key, if any.
fn current_version(
    tx: &rusqlite::Transaction<'_>,
    learner_id: &str,
    item_id: &str,
) -> tokio_rusqlite::Result<Option<u64>> {
    let mut stmt = tx
        .prepare(schema::SELECT_STATE_VERSION)
        .map_err(wrap_err)?;
    match stmt.query_row([learner_id, item_id], |row| row.get::<_, i64>(0)) {
        Ok(version) => Ok(Some(version.max(0) as u64)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(wrap_err(e)),
    }
}

fn load_session(
    conn: &rusqlite::Connection,
    session_id: &str,
) -> tokio_rusqlite::Result<Option<StudySession>> {
    let mut stmt = conn.prepare(schema::SELECT_SESSION).map_err(wrap_err)?;
    match stmt.query_row([session_id], row_to_session) {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(wrap_err(e)),
    }
}

/// Checks that a review may be recorded against its study session.
fn check_session(
    tx: &rusqlite::Transaction<'_>,
    record: &ReviewRecord,
) -> tokio_rusqlite::Result<()> {
    let Some(session_id) = record.session_id else {
        return Ok(());
    };
    let err = match load_session(tx, &session_id.to_string())? {
        None => StoreError::session_not_found(session_id),
        Some(session) if !session.is_open() => StoreError::SessionFinished { id: session_id },
        Some(session) if session.learner_id != record.learner_id => {
            StoreError::InvalidData(format!(
                "review of learner {} in session {session_id} of learner {}",
                record.learner_id, session.learner_id
            ))
        }
        Some(_) => return Ok(()),
    };
    Err(domain_err(err))
}

fn collect_reviews(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[&str],
) -> tokio_rusqlite::Result<Vec<ReviewRecord>> {
    let mut stmt = conn.prepare(sql).map_err(wrap_err)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params), row_to_review)
        .map_err(wrap_err)?;

    let mut records = Vec::new();
    for row_result in rows {
        records.push(row_result.map_err(wrap_err)?);
    }
    Ok(records)
}

fn execute_state(
    tx: &rusqlite::Transaction<'_>,
    sql: &str,
    row: &StateRow,
    expected: Option<i64>,
) -> tokio_rusqlite::Result<usize> {
    let mut params: Vec<&dyn rusqlite::ToSql> = vec![
        &row.learner_id,
        &row.item_id,
        &row.ease_factor,
        &row.interval_days,
        &row.repetitions,
        &row.due_at,
        &row.last_reviewed_at,
        &row.version,
        &row.total_reviews,
        &row.correct_reviews,
    ];
    if let Some(expected) = expected.as_ref() {
        params.push(expected);
    }
    tx.execute(sql, params.as_slice()).map_err(wrap_err)
}

/// Applies one staged write inside an open transaction.
fn apply_write(
    tx: &rusqlite::Transaction<'_>,
    write: &StagedWrite,
) -> tokio_rusqlite::Result<Option<LearningState>> {
    match write {
        StagedWrite::AppendReview(record) => {
            check_session(tx, record)?;
            tx.execute(
                schema::INSERT_REVIEW,
                rusqlite::params![
                    record.learner_id.to_string(),
                    record.item_id.to_string(),
                    record.grade.as_str(),
                    record.previous_ease,
                    record.new_ease,
                    i64::from(record.previous_interval),
                    i64::from(record.new_interval),
                    record.previous_mastery.as_str(),
                    record.new_mastery.as_str(),
                    format_datetime(&record.reviewed_at),
                    record.session_id.map(|id| id.to_string()),
                ],
            )
            .map_err(wrap_err)?;
            Ok(None)
        }
        StagedWrite::Insert(_) | StagedWrite::Update(_) => {
            let Some(next) = write.committed_state() else {
                return Ok(None);
            };
            let expected = write.expected_version().unwrap_or_default();
            let row = StateRow::from_state(&next).map_err(domain_err)?;

            let affected = match write {
                StagedWrite::Insert(_) => execute_state(tx, schema::INSERT_STATE, &row, None)?,
                _ => {
                    let expected_sql = version_to_sql(expected).map_err(domain_err)?;
                    execute_state(tx, schema::UPDATE_STATE_IF_VERSION, &row, Some(expected_sql))?
                }
            };
            if affected == 1 {
                return Ok(Some(next));
            }

            let id = record_id(next.learner_id, next.item_id);
            let err = match current_version(tx, &row.learner_id, &row.item_id)? {
                None => StoreError::state_not_found(next.learner_id, next.item_id),
                Some(actual) => StoreError::VersionConflict {
                    id,
                    expected,
                    actual,
                },
            };
            Err(domain_err(err))
        }
    }
}

#[async_trait]
impl ProgressStore for SqliteProgressStore {
    async fn get(&self, learner_id: Uuid, item_id: Uuid) -> Result<Option<LearningState>> {
        let learner_str = learner_id.to_string();
        let item_str = item_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(schema::SELECT_STATE).map_err(wrap_err)?;
                match stmt.query_row([&learner_str, &item_str], row_to_state) {
                    Ok(state) => Ok(Some(state)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(wrap_err(e)),
                }
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, ENTITY, record_id(learner_id, item_id)))
    }

    async fn list_for_learner(&self, learner_id: Uuid) -> Result<Vec<LearningState>> {
        let learner_str = learner_id.to_string();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(schema::SELECT_STATES_BY_LEARNER)
                    .map_err(wrap_err)?;
                let rows = stmt
                    .query_map([&learner_str], row_to_state)
                    .map_err(wrap_err)?;

                let mut states = Vec::new();
                for row_result in rows {
                    states.push(row_result.map_err(wrap_err)?);
                }
                Ok(states)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, ENTITY, learner_id.to_string()))
    }

    async fn reviews_for(&self, learner_id: Uuid, item_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let learner_str = learner_id.to_string();
        let item_str = item_id.to_string();

        self.conn
            .call(move |conn| {
                collect_reviews(
                    conn,
                    schema::SELECT_REVIEWS,
                    &[learner_str.as_str(), item_str.as_str()],
                )
            })
            .await
            .map_err(|e| {
                map_tokio_rusqlite_error_with_id(e, "ReviewRecord", record_id(learner_id, item_id))
            })
    }

    async fn commit(&self, batch: WriteBatch) -> Result<Vec<LearningState>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let writes = batch.into_writes();
        let batch_id = writes
            .iter()
            .find_map(StagedWrite::committed_state)
            .map(|s| record_id(s.learner_id, s.item_id))
            .unwrap_or_else(|| "batch".to_string());

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;
                let mut committed = Vec::new();
                for write in &writes {
                    if let Some(state) = apply_write(&tx, write)? {
                        committed.push(state);
                    }
                }
                // Dropping the transaction on an early return rolls it back
                tx.commit().map_err(wrap_err)?;
                Ok(committed)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, ENTITY, batch_id))
    }

    async fn start_session(&self, session: &StudySession) -> Result<StudySession> {
        let stored = session.clone();
        let id = session.id.to_string();
        let learner_id = session.learner_id.to_string();
        let started_at = format_datetime(&session.started_at);
        let finished_at = session.finished_at.as_ref().map(format_datetime);

        let inserted = self
            .conn
            .call(move |conn| {
                conn.execute(
                    schema::INSERT_SESSION,
                    rusqlite::params![id, learner_id, started_at, finished_at],
                )
                .map_err(wrap_err)
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, SESSION_ENTITY, stored.id.to_string()))?;

        if inserted == 0 {
            return Err(StoreError::AlreadyExists {
                entity_type: SESSION_ENTITY,
                id: stored.id.to_string(),
            });
        }
        Ok(stored)
    }

    async fn get_session(&self, session_id: Uuid) -> Result<Option<StudySession>> {
        let id = session_id.to_string();

        self.conn
            .call(move |conn| load_session(conn, &id))
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, SESSION_ENTITY, session_id.to_string()))
    }

    async fn finish_session(
        &self,
        session_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<StudySession> {
        let id = session_id.to_string();
        let finished = format_datetime(&finished_at);

        self.conn
            .call(move |conn| {
                let tx = conn.transaction().map_err(wrap_err)?;
                let affected = tx
                    .execute(schema::FINISH_SESSION, [&id, &finished])
                    .map_err(wrap_err)?;
                let session = load_session(&tx, &id)?;
                tx.commit().map_err(wrap_err)?;

                match session {
                    Some(session) if affected == 1 => Ok(session),
                    Some(_) => Err(domain_err(StoreError::SessionFinished { id: session_id })),
                    None => Err(domain_err(StoreError::session_not_found(session_id))),
                }
            })
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, SESSION_ENTITY, session_id.to_string()))
    }

    async fn reviews_for_session(&self, session_id: Uuid) -> Result<Vec<ReviewRecord>> {
        let id = session_id.to_string();

        self.conn
            .call(move |conn| collect_reviews(conn, schema::SELECT_REVIEWS_BY_SESSION, &[id.as_str()]))
            .await
            .map_err(|e| map_tokio_rusqlite_error_with_id(e, "ReviewRecord", session_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use recall_core::progress::{apply_grade, Grade, SchedulerParams};

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap()
    }

    fn learner() -> Uuid {
        Uuid::from_u128(1)
    }

    fn new_state(item: u128) -> LearningState {
        LearningState::new(
            learner(),
            Uuid::from_u128(item),
            fixed_now(),
            &SchedulerParams::default(),
        )
    }

    async fn store() -> SqliteProgressStore {
        SqliteProgressStore::new_in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get_round_trip() {
        let store = store().await;
        let params = SchedulerParams::default();
        let state = apply_grade(
            &new_state(2),
            Grade::Good,
            fixed_now() + Duration::nanoseconds(42),
            &params,
        );

        let created = store.create(&state).await.unwrap();

        assert_eq!(created.version, 1);
        assert_eq!(
            store.get(learner(), Uuid::from_u128(2)).await.unwrap(),
            Some(created)
        );
    }

    #[tokio::test]
    async fn test_get_absent_is_none() {
        let store = store().await;

        assert_eq!(store.get(learner(), Uuid::from_u128(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let store = store().await;
        store.create(&new_state(2)).await.unwrap();

        let result = store.create(&new_state(2)).await;

        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_compare_and_swap_success_and_conflict() {
        let store = store().await;
        let params = SchedulerParams::default();
        let created = store.create(&new_state(2)).await.unwrap();
        let next = apply_grade(&created, Grade::Good, fixed_now(), &params);

        let swapped = store.compare_and_swap(&next).await.unwrap();
        assert_eq!(swapped.version, 2);

        // Same expected version again is now stale
        let stale = apply_grade(&created, Grade::Easy, fixed_now(), &params);
        let result = store.compare_and_swap(&stale).await;
        assert_eq!(
            result,
            Err(StoreError::VersionConflict {
                id: record_id(learner(), Uuid::from_u128(2)),
                expected: 1,
                actual: 2,
            })
        );
        assert_eq!(
            store.get(learner(), Uuid::from_u128(2)).await.unwrap(),
            Some(swapped)
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_absent_is_not_found() {
        let store = store().await;

        let result = store.compare_and_swap(&new_state(2).with_version(1)).await;

        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_failed_batch_rolls_back() {
        let store = store().await;
        store.create(&new_state(3)).await.unwrap();

        let mut batch = WriteBatch::new();
        batch.insert(new_state(2));
        batch.append_review(ReviewRecord::between(
            &new_state(2),
            &new_state(2),
            Grade::Good,
            fixed_now(),
        ));
        batch.update(new_state(3).with_version(5));

        let result = store.commit(batch).await;

        assert!(matches!(result, Err(StoreError::VersionConflict { .. })));
        assert_eq!(store.get(learner(), Uuid::from_u128(2)).await.unwrap(), None);
        assert!(store
            .reviews_for(learner(), Uuid::from_u128(2))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_reviews_oldest_first() {
        let store = store().await;
        let params = SchedulerParams::default();
        let mut current = new_state(2);

        for grade in [Grade::Easy, Grade::Hard, Grade::Failed] {
            let next = apply_grade(&current, grade, fixed_now(), &params);
            let mut batch = WriteBatch::new();
            if current.version == 0 {
                batch.insert(next.clone());
            } else {
                batch.update(next.clone());
            }
            batch.append_review(ReviewRecord::between(&current, &next, grade, fixed_now()));
            current = store.commit(batch).await.unwrap().remove(0);
        }

        let history = store.reviews_for(learner(), Uuid::from_u128(2)).await.unwrap();
        let grades: Vec<Grade> = history.iter().map(|r| r.grade).collect();
        assert_eq!(grades, vec![Grade::Easy, Grade::Hard, Grade::Failed]);
        assert_eq!(history[2].new_interval, 1);
        assert_eq!(current.version, 3);
    }

    #[tokio::test]
    async fn test_list_for_learner_in_schedule_order() {
        let store = store().await;
        let mut late = new_state(1);
        late.due_at = fixed_now() + Duration::days(2);
        let mut other_learner = new_state(4);
        other_learner.learner_id = Uuid::from_u128(99);
        for state in [late, new_state(3), new_state(2), other_learner] {
            store.create(&state).await.unwrap();
        }

        let items: Vec<u128> = store
            .list_for_learner(learner())
            .await
            .unwrap()
            .iter()
            .map(|s| s.item_id.as_u128())
            .collect();

        assert_eq!(items, vec![2, 3, 1]);
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = store().await;

        assert!(store.commit(WriteBatch::new()).await.unwrap().is_empty());
    }

    fn graded_batch(current: &LearningState, grade: Grade, session_id: Uuid) -> WriteBatch {
        let next = apply_grade(current, grade, fixed_now(), &SchedulerParams::default());
        let mut batch = WriteBatch::new();
        batch.insert(next.clone());
        batch.append_review(
            ReviewRecord::between(current, &next, grade, fixed_now()).in_session(Some(session_id)),
        );
        batch
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let store = store().await;
        let session = StudySession::start(Uuid::from_u128(50), learner(), fixed_now());
        store.start_session(&session).await.unwrap();

        assert_eq!(store.get_session(session.id).await.unwrap(), Some(session.clone()));

        store
            .commit(graded_batch(&new_state(2), Grade::Good, session.id))
            .await
            .unwrap();
        store
            .commit(graded_batch(&new_state(3), Grade::Failed, session.id))
            .await
            .unwrap();
        let finished = store
            .finish_session(session.id, fixed_now() + Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(finished.finished_at, Some(fixed_now() + Duration::minutes(5)));
        let reviews = store.reviews_for_session(session.id).await.unwrap();
        let grades: Vec<Grade> = reviews.iter().map(|r| r.grade).collect();
        assert_eq!(grades, vec![Grade::Good, Grade::Failed]);
        assert!(reviews.iter().all(|r| r.session_id == Some(session.id)));
    }

    #[tokio::test]
    async fn test_duplicate_session_rejected() {
        let store = store().await;
        let session = StudySession::start(Uuid::from_u128(50), learner(), fixed_now());
        store.start_session(&session).await.unwrap();

        let result = store.start_session(&session).await;

        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
    }

    #[tokio::test]
    async fn test_finish_missing_and_finished_sessions() {
        let store = store().await;
        let session = StudySession::start(Uuid::from_u128(50), learner(), fixed_now());
        store.start_session(&session).await.unwrap();
        let first = store.finish_session(session.id, fixed_now()).await.unwrap();

        let again = store
            .finish_session(session.id, fixed_now() + Duration::hours(1))
            .await;
        let missing = store.finish_session(Uuid::from_u128(51), fixed_now()).await;

        assert_eq!(again, Err(StoreError::SessionFinished { id: session.id }));
        assert_eq!(missing, Err(StoreError::session_not_found(Uuid::from_u128(51))));
        assert_eq!(store.get_session(session.id).await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_review_in_finished_session_rolls_back() {
        let store = store().await;
        let session = StudySession::start(Uuid::from_u128(50), learner(), fixed_now());
        store.start_session(&session).await.unwrap();
        store.finish_session(session.id, fixed_now()).await.unwrap();

        let result = store
            .commit(graded_batch(&new_state(2), Grade::Good, session.id))
            .await;

        assert_eq!(result, Err(StoreError::SessionFinished { id: session.id }));
        assert_eq!(store.get(learner(), Uuid::from_u128(2)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_review_in_unknown_session_is_not_found() {
        let store = store().await;

        let result = store
            .commit(graded_batch(&new_state(2), Grade::Good, Uuid::from_u128(50)))
            .await;

        assert_eq!(result, Err(StoreError::session_not_found(Uuid::from_u128(50))));
    }
}
