//! Review service: grading, study sessions, read-through lookups and due
//! lists.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use recall_core::cache::{
    deserialize_state, deserialize_states, learner_prefix, learner_schedule_key, progress_key,
    serialize_state, serialize_states, Cache,
};
use recall_core::progress::{
    apply_grade, DueItems, Grade, ItemProgress, LearnerStats, LearningState, ReviewRecord,
    SchedulerParams, SessionSummary, StudySession,
};
use recall_core::review::Result;
use recall_core::storage::{ProgressStore, StoreError};

use crate::unit_of_work::{RetryPolicy, Transaction, UnitOfWork};

/// Tunables of a [`ReviewService`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewSettings {
    pub scheduler: SchedulerParams,
    pub cache_ttl: Duration,
    /// Deadline for a single store call outside a unit of work.
    pub store_timeout: Duration,
    /// Deadline for a single cache call.
    pub cache_timeout: Duration,
    /// Create a default state when an unseen item is graded.
    pub implicit_create: bool,
    pub retry: RetryPolicy,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            scheduler: SchedulerParams::default(),
            cache_ttl: Duration::from_secs(300),
            store_timeout: Duration::from_secs(5),
            cache_timeout: Duration::from_millis(250),
            implicit_create: true,
            retry: RetryPolicy::default(),
        }
    }
}

/// Entry point for grading reviews and reading learning state.
///
/// Reads are cache-aside: check the cache, fall back to the store and
/// populate the cache. Writes go through a [`UnitOfWork`] and invalidate the
/// affected keys before returning. Cache failures never fail a call.
///
/// When an invalidation fails, or a grading times out and may still land,
/// the learner's keys bypass the cache for one `cache_ttl`, after which
/// everything cached before the failure has expired.
///
/// # Type Parameters
///
/// * `S` - The progress store implementation
/// * `C` - The cache implementation
pub struct ReviewService<S, C>
where
    S: ProgressStore,
    C: Cache,
{
    store: Arc<S>,
    cache: Arc<C>,
    unit_of_work: UnitOfWork<S>,
    settings: ReviewSettings,
    /// Bumped after every commit. A reader that sees it move while
    /// populating the cache drops what it just wrote.
    invalidations: AtomicU64,
    /// Learners read around the cache, with the instant the bypass ends.
    bypass: RwLock<HashMap<Uuid, Instant>>,
}

impl<S, C> ReviewService<S, C>
where
    S: ProgressStore + 'static,
    C: Cache + 'static,
{
    pub fn new(store: Arc<S>, cache: Arc<C>, settings: ReviewSettings) -> Self {
        let unit_of_work = UnitOfWork::new(Arc::clone(&store), settings.retry.clone());
        Self {
            store,
            cache,
            unit_of_work,
            settings,
            invalidations: AtomicU64::new(0),
            bypass: RwLock::new(HashMap::new()),
        }
    }

    /// Grades one review and returns the committed state.
    ///
    /// The grade is validated before any I/O. Conflicting concurrent
    /// gradings of the same item are retried against fresh state.
    pub async fn grade_review(
        &self,
        learner_id: Uuid,
        item_id: Uuid,
        grade: i64,
        now: DateTime<Utc>,
    ) -> Result<LearningState> {
        let grade = Grade::try_from(grade)?;
        self.grade(learner_id, item_id, grade, None, now).await
    }

    /// Grades one review inside an open study session.
    ///
    /// Fails with `NotFound` for an unknown session and `SessionFinished`
    /// once the session is closed. The session check is repeated by the
    /// store at commit time, so a session finished mid-grading rejects the
    /// review.
    pub async fn grade_in_session(
        &self,
        session_id: Uuid,
        item_id: Uuid,
        grade: i64,
        now: DateTime<Utc>,
    ) -> Result<LearningState> {
        let grade = Grade::try_from(grade)?;
        let session = self.session(session_id).await?;
        if !session.is_open() {
            return Err(StoreError::SessionFinished { id: session_id }.into());
        }
        self.grade(session.learner_id, item_id, grade, Some(session_id), now)
            .await
    }

    /// Opens a study session for a learner.
    pub async fn start_session(&self, learner_id: Uuid, now: DateTime<Utc>) -> Result<StudySession> {
        let session = StudySession::start(Uuid::new_v4(), learner_id, now);
        let session = self.store_call(self.store.start_session(&session)).await?;
        tracing::info!(session_id = %session.id, %learner_id, "study session started");
        Ok(session)
    }

    /// Closes a study session and summarizes the reviews given in it.
    pub async fn finish_session(&self, session_id: Uuid, now: DateTime<Utc>) -> Result<SessionSummary> {
        let session = self
            .store_call(self.store.finish_session(session_id, now))
            .await?;
        let reviews = self
            .store_call(self.store.reviews_for_session(session_id))
            .await?;
        let summary = SessionSummary::from_reviews(session, &reviews);
        tracing::info!(
            %session_id,
            studied = summary.studied,
            correct = summary.correct,
            accuracy = summary.accuracy,
            "study session finished"
        );
        Ok(summary)
    }

    /// Summarizes a study session, open or finished. Not cached.
    pub async fn session_summary(&self, session_id: Uuid) -> Result<SessionSummary> {
        let session = self.session(session_id).await?;
        let reviews = self
            .store_call(self.store.reviews_for_session(session_id))
            .await?;
        Ok(SessionSummary::from_reviews(session, &reviews))
    }

    /// Returns the current state of one item, read-through.
    pub async fn get_state(&self, learner_id: Uuid, item_id: Uuid) -> Result<LearningState> {
        let key = progress_key(learner_id, item_id);

        if let Some(bytes) = self.cache_get(learner_id, &key).await {
            match deserialize_state(&bytes) {
                Ok(state) => {
                    tracing::trace!(%learner_id, %item_id, "cache hit for state");
                    return Ok(state);
                }
                Err(err) => tracing::warn!(%learner_id, %item_id, error = %err, "cached state unreadable"),
            }
        }

        tracing::trace!(%learner_id, %item_id, "cache miss for state");
        let epoch = self.invalidations.load(Ordering::SeqCst);
        let state = self
            .store_call(self.store.get(learner_id, item_id))
            .await?
            .ok_or_else(|| StoreError::state_not_found(learner_id, item_id))?;

        match serialize_state(&state) {
            Ok(bytes) => self.populate(learner_id, &key, &bytes, epoch).await,
            Err(err) => tracing::warn!(%learner_id, %item_id, error = %err, "failed to encode state"),
        }
        Ok(state)
    }

    /// Returns the learner's due items at `now`, at most `limit`, ordered by
    /// due time then item.
    pub async fn get_due_items(
        &self,
        learner_id: Uuid,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<DueItems> {
        let schedule = self.schedule(learner_id).await?;
        Ok(DueItems::new(schedule, now, limit))
    }

    /// Aggregates the learner's schedule at `now`.
    pub async fn learner_stats(&self, learner_id: Uuid, now: DateTime<Utc>) -> Result<LearnerStats> {
        let schedule = self.schedule(learner_id).await?;
        Ok(LearnerStats::from_states(&schedule, now))
    }

    /// Every item of the learner with its mastery and accuracy, in schedule
    /// order.
    pub async fn learner_progress(&self, learner_id: Uuid) -> Result<Vec<ItemProgress>> {
        let schedule = self.schedule(learner_id).await?;
        Ok(schedule.into_iter().map(ItemProgress::from).collect())
    }

    /// Review history of one item, oldest first. Not cached.
    pub async fn review_history(&self, learner_id: Uuid, item_id: Uuid) -> Result<Vec<ReviewRecord>> {
        Ok(self
            .store_call(self.store.reviews_for(learner_id, item_id))
            .await?)
    }

    async fn grade(
        &self,
        learner_id: Uuid,
        item_id: Uuid,
        grade: Grade,
        session_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<LearningState> {
        let outcome = self
            .unit_of_work
            .run(|tx| self.grade_attempt(tx, learner_id, item_id, grade, session_id, now))
            .await;

        match outcome {
            Ok(mut committed) => {
                self.invalidate_learner(learner_id, item_id).await;
                let state = committed
                    .states
                    .pop()
                    .ok_or_else(|| StoreError::state_not_found(learner_id, item_id))?;
                tracing::info!(
                    %learner_id,
                    %item_id,
                    %grade,
                    session_id = ?session_id,
                    version = state.version,
                    interval_days = state.interval_days,
                    attempts = committed.attempts,
                    "review graded"
                );
                Ok(state)
            }
            Err(err) => {
                // A timed-out attempt may still commit after this returns
                if matches!(err, StoreError::Unavailable(_)) {
                    self.invalidate_learner(learner_id, item_id).await;
                    self.start_bypass(learner_id).await;
                }
                tracing::warn!(%learner_id, %item_id, error = %err, "grading failed");
                Err(err.into())
            }
        }
    }

    async fn grade_attempt(
        &self,
        tx: Transaction<S>,
        learner_id: Uuid,
        item_id: Uuid,
        grade: Grade,
        session_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> std::result::Result<LearningState, StoreError> {
        // Only the first attempt may trust the cache; a retry means it was stale
        let current = if tx.attempt() == 1 {
            match self.cached_state(learner_id, item_id).await {
                Some(state) => Some(state),
                None => tx.get(learner_id, item_id).await?,
            }
        } else {
            tx.get(learner_id, item_id).await?
        };

        let current = match current {
            Some(state) => state,
            None if self.settings.implicit_create => {
                LearningState::new(learner_id, item_id, now, &self.settings.scheduler)
            }
            None => return Err(StoreError::state_not_found(learner_id, item_id)),
        };

        let next = apply_grade(&current, grade, now, &self.settings.scheduler);
        if current.version == 0 {
            tx.insert(next.clone()).await;
        } else {
            tx.update(next.clone()).await;
        }
        tx.record_review(ReviewRecord::between(&current, &next, grade, now).in_session(session_id))
            .await;

        Ok(next)
    }

    async fn session(&self, session_id: Uuid) -> std::result::Result<StudySession, StoreError> {
        self.store_call(self.store.get_session(session_id))
            .await?
            .ok_or_else(|| StoreError::session_not_found(session_id))
    }

    async fn cached_state(&self, learner_id: Uuid, item_id: Uuid) -> Option<LearningState> {
        let bytes = self
            .cache_get(learner_id, &progress_key(learner_id, item_id))
            .await?;
        deserialize_state(&bytes).ok()
    }

    /// The learner's full schedule, read-through on the schedule key.
    async fn schedule(&self, learner_id: Uuid) -> Result<Vec<LearningState>> {
        let key = learner_schedule_key(learner_id);

        if let Some(bytes) = self.cache_get(learner_id, &key).await {
            match deserialize_states(&bytes) {
                Ok(states) => {
                    tracing::trace!(%learner_id, count = states.len(), "cache hit for schedule");
                    return Ok(states);
                }
                Err(err) => tracing::warn!(%learner_id, error = %err, "cached schedule unreadable"),
            }
        }

        tracing::trace!(%learner_id, "cache miss for schedule");
        let epoch = self.invalidations.load(Ordering::SeqCst);
        let states = self
            .store_call(self.store.list_for_learner(learner_id))
            .await?;

        match serialize_states(&states) {
            Ok(bytes) => self.populate(learner_id, &key, &bytes, epoch).await,
            Err(err) => tracing::warn!(%learner_id, error = %err, "failed to encode schedule"),
        }
        Ok(states)
    }

    async fn invalidate_learner(&self, learner_id: Uuid, item_id: Uuid) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);

        let key = progress_key(learner_id, item_id);
        let key_dropped = self
            .cache_write(&key, "cache invalidation", self.cache.invalidate(&key))
            .await;

        let prefix = learner_prefix(learner_id);
        let prefix_dropped = self
            .cache_write(
                &prefix,
                "cache prefix invalidation",
                self.cache.invalidate_prefix(&prefix),
            )
            .await;

        if !(key_dropped && prefix_dropped) {
            self.start_bypass(learner_id).await;
        }
    }

    /// Reads `learner_id`'s keys around the cache until anything cached up
    /// to now has expired.
    async fn start_bypass(&self, learner_id: Uuid) {
        let now = Instant::now();
        let until = now
            .checked_add(self.settings.cache_ttl)
            .unwrap_or(now + Duration::from_secs(86_400 * 365));
        let mut bypass = self.bypass.write().await;
        let entry = bypass.entry(learner_id).or_insert(until);
        *entry = (*entry).max(until);
        tracing::warn!(
            %learner_id,
            ttl_ms = self.settings.cache_ttl.as_millis() as u64,
            "learner cache entries may be stale, reading around the cache"
        );
    }

    async fn bypassed(&self, learner_id: Uuid) -> bool {
        let Some(until) = self.bypass.read().await.get(&learner_id).copied() else {
            return false;
        };
        if Instant::now() < until {
            return true;
        }

        let mut bypass = self.bypass.write().await;
        // Another writer may have extended the window meanwhile
        if bypass
            .get(&learner_id)
            .is_some_and(|&until| Instant::now() >= until)
        {
            bypass.remove(&learner_id);
        }
        bypass.contains_key(&learner_id)
    }

    async fn cache_get(&self, learner_id: Uuid, key: &str) -> Option<Vec<u8>> {
        if self.bypassed(learner_id).await {
            tracing::trace!(key, "cache bypassed");
            return None;
        }
        match tokio::time::timeout(self.settings.cache_timeout, self.cache.get(key)).await {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                tracing::warn!(key, error = %err, "cache read failed");
                None
            }
            Err(_) => {
                tracing::warn!(key, "cache read timed out");
                None
            }
        }
    }

    /// Writes a value read at `epoch`, then drops it again if a commit
    /// happened in between.
    async fn populate(&self, learner_id: Uuid, key: &str, bytes: &[u8], epoch: u64) {
        if self.bypassed(learner_id).await {
            return;
        }
        let ttl = self.settings.cache_ttl;
        if !self
            .cache_write(key, "cache populate", self.cache.set(key, bytes, ttl))
            .await
        {
            return;
        }

        if self.invalidations.load(Ordering::SeqCst) != epoch {
            tracing::debug!(key, "write raced with populate, dropping cached value");
            if !self
                .cache_write(key, "cache invalidation", self.cache.invalidate(key))
                .await
            {
                self.start_bypass(learner_id).await;
            }
        }
    }

    /// Runs one cache write under the cache deadline. Returns false on
    /// failure or timeout.
    async fn cache_write(
        &self,
        key: &str,
        operation: &'static str,
        write: impl Future<Output = recall_core::cache::Result<()>>,
    ) -> bool {
        match tokio::time::timeout(self.settings.cache_timeout, write).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::error!(key, operation, error = %err, "cache write failed");
                false
            }
            Err(_) => {
                tracing::error!(key, operation, "cache write timed out");
                false
            }
        }
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, StoreError>>,
    ) -> std::result::Result<T, StoreError> {
        tokio::time::timeout(self.settings.store_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Unavailable(format!(
                    "store call timed out after {}ms",
                    self.settings.store_timeout.as_millis()
                )))
            })
    }
}
