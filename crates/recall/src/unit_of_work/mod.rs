//! Atomic, retried read-modify-write over a [`ProgressStore`].
//!
//! [`UnitOfWork::run`] hands an operation a fresh [`Transaction`], commits
//! what the operation staged when it returns `Ok`, and re-runs the whole
//! operation when a version conflict shows up. Nested units of work are not
//! supported.

mod transaction;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use recall_core::progress::LearningState;
use recall_core::storage::{ProgressStore, Result, StoreError};

pub use transaction::Transaction;

/// Bounds of the conflict retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Sleep before retry `n` is `backoff * n`.
    pub backoff: Duration,
    /// Deadline for one attempt, commit included.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(10),
            attempt_timeout: Duration::from_secs(5),
        }
    }
}

/// Result of a committed unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<T> {
    pub value: T,
    /// States as stored by the commit, in staging order.
    pub states: Vec<LearningState>,
    /// Attempts used, 1 when no conflict happened.
    pub attempts: u32,
}

pub struct UnitOfWork<S> {
    store: Arc<S>,
    policy: RetryPolicy,
}

impl<S> Clone for UnitOfWork<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy.clone(),
        }
    }
}

impl<S: ProgressStore + 'static> UnitOfWork<S> {
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    /// Runs `operation` until its staged writes commit.
    ///
    /// An `Err` from the operation discards its staged writes and is
    /// returned unchanged. `VersionConflict`, from the operation or from the
    /// commit, re-runs the operation with a new transaction until
    /// `max_attempts` is reached, after which the conflict is returned. An
    /// attempt exceeding `attempt_timeout` fails with `Unavailable`.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<Committed<T>>
    where
        F: FnMut(Transaction<S>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let tx = Transaction::new(Arc::clone(&self.store), attempt);
            let outcome = tokio::time::timeout(
                self.policy.attempt_timeout,
                self.attempt(&mut operation, tx),
            )
            .await
            .unwrap_or_else(|_| {
                Err(StoreError::Unavailable(format!(
                    "attempt {attempt} timed out after {}ms",
                    self.policy.attempt_timeout.as_millis()
                )))
            });

            match outcome {
                Ok((value, states)) => {
                    return Ok(Committed {
                        value,
                        states,
                        attempts: attempt,
                    })
                }
                Err(err) if err.is_conflict() && attempt < max_attempts => {
                    tracing::debug!(attempt, error = %err, "version conflict, retrying");
                    tokio::time::sleep(self.policy.backoff * attempt).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_conflict() {
                        tracing::warn!(attempts = attempt, error = %err, "conflict retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    async fn attempt<T, F, Fut>(
        &self,
        operation: &mut F,
        tx: Transaction<S>,
    ) -> Result<(T, Vec<LearningState>)>
    where
        F: FnMut(Transaction<S>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
    {
        let value = operation(tx.clone()).await?;
        let batch = tx.take_batch().await;
        if batch.is_empty() {
            return Ok((value, Vec::new()));
        }
        let states = self.store.commit(batch).await?;
        Ok((value, states))
    }
}
