//! Conflict resolution loop for guarded updates and deletes.
//!
//! A guarded write issues a conditional operation against the caller's
//! expected version. When the store reports a mismatch, the loop adopts the
//! stored version as its new baseline and re-issues the caller's intent
//! against it. Under the default [`LastWriterWinsOnRetry`] strategy the
//! caller's fields are reapplied unchanged, so the retrying writer's values
//! land on top of whatever won the race.
//!
//! Attempts are bounded by [`RetryPolicy::max_attempts`] with exponential
//! backoff between them; running out yields [`Error::ConflictExhausted`].
//! No attempt holds a lock across an await, so dropping the future between
//! attempts leaves the record exactly as the store last committed it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Entity, RecordId, Versioned};
use crate::store::{Conditional, RecordStore};
use crate::version::VersionToken;

/// Bound and pacing of the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub initial_backoff: Duration,
    /// Upper bound for any single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping between attempts
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows the `conflicts`-th conflict
    pub fn backoff(&self, conflicts: u32) -> Duration {
        let factor = 2_u32.saturating_pow(conflicts.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    const fn attempt_limit(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

/// Decides which fields a retried write carries after a conflict.
///
/// Implement this to plug in field-level merging; the loop calls it with the
/// caller's intended fields and the record as currently stored.
pub trait MergeStrategy<T>: Send + Sync {
    /// Name recorded in conflict logs
    fn name(&self) -> &'static str;

    /// Fields to write against `current`'s version
    fn reconcile(&self, proposed: &T, current: &Versioned<T>) -> T;
}

/// Discard the detected conflict and reapply the caller's fields
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWinsOnRetry;

impl<T: Clone> MergeStrategy<T> for LastWriterWinsOnRetry {
    fn name(&self) -> &'static str {
        "last-writer-wins-on-retry"
    }

    fn reconcile(&self, proposed: &T, _current: &Versioned<T>) -> T {
        proposed.clone()
    }
}

/// One absorbed version conflict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictRecord {
    pub record_id: RecordId,
    /// Version the attempt expected
    pub expected: VersionToken,
    /// Version actually stored at the time
    pub found: VersionToken,
    pub strategy: &'static str,
    /// 1-based attempt that hit the conflict
    pub attempt: u32,
}

/// Successful outcome of a guarded operation
#[derive(Debug, Clone, PartialEq)]
pub struct Committed<A> {
    /// What the final attempt produced (the new version for updates)
    pub applied: A,
    /// Attempts made, including the successful one
    pub attempts: u32,
    /// Conflicts absorbed on the way
    pub conflicts: Vec<ConflictRecord>,
}

/// Drives conditional writes and deletes to completion
pub struct GuardedWriter<T> {
    store: Arc<dyn RecordStore<T>>,
    policy: RetryPolicy,
    strategy: Arc<dyn MergeStrategy<T>>,
}

impl<T: Entity> GuardedWriter<T> {
    /// Writer with the default policy and [`LastWriterWinsOnRetry`]
    pub fn new(store: Arc<dyn RecordStore<T>>) -> Self {
        Self {
            store,
            policy: RetryPolicy::default(),
            strategy: Arc::new(LastWriterWinsOnRetry),
        }
    }

    /// Replace the retry bound and backoff
    #[must_use]
    pub const fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replace how a fresh snapshot is reconciled on retry
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn MergeStrategy<T>>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the record's fields, retrying on version conflicts
    pub async fn update(
        &self,
        id: RecordId,
        expected: VersionToken,
        fields: T,
    ) -> Result<Committed<VersionToken>> {
        let write = Write {
            proposed: fields,
            strategy: self.strategy.as_ref(),
        };
        self.drive(id, expected, write).await
    }

    /// Delete the record, re-issuing the delete against each refreshed version
    pub async fn delete(&self, id: RecordId, expected: VersionToken) -> Result<Committed<()>> {
        self.drive(id, expected, Delete).await
    }

    async fn drive<A>(
        &self,
        id: RecordId,
        expected: VersionToken,
        op: A,
    ) -> Result<Committed<A::Applied>>
    where
        A: Attempt<T>,
    {
        let limit = self.policy.attempt_limit();
        let strategy = self.strategy.name();
        let mut expected = expected;
        let mut baseline: Option<Versioned<T>> = None;
        let mut conflicts = Vec::new();

        for attempt in 1..=limit {
            let outcome = op
                .attempt(self.store.as_ref(), id, &expected, baseline.as_ref())
                .await?;

            match outcome {
                Conditional::Applied(applied) => {
                    if !conflicts.is_empty() {
                        tracing::debug!(
                            entity = T::KIND.label(),
                            %id,
                            attempts = attempt,
                            strategy,
                            "Guarded write committed after conflicts"
                        );
                    }
                    return Ok(Committed {
                        applied,
                        attempts: attempt,
                        conflicts,
                    });
                }
                Conditional::NotFound if attempt == 1 => return Err(Error::NotFound(id)),
                Conditional::NotFound => {
                    tracing::warn!(
                        entity = T::KIND.label(),
                        %id,
                        attempt,
                        "Record removed while guarded write was retrying"
                    );
                    return Err(Error::RecordGone(id));
                }
                Conditional::VersionMismatch(current) => {
                    tracing::debug!(
                        entity = T::KIND.label(),
                        %id,
                        attempt,
                        expected = %expected,
                        found = %current.version,
                        strategy,
                        "Version conflict; retrying against refreshed baseline"
                    );
                    conflicts.push(ConflictRecord {
                        record_id: id,
                        expected: expected.clone(),
                        found: current.version.clone(),
                        strategy,
                        attempt,
                    });
                    expected = current.version.clone();
                    baseline = Some(current);

                    if attempt < limit {
                        let delay = self.policy.backoff(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        tracing::warn!(
            entity = T::KIND.label(),
            %id,
            attempts = limit,
            "Guarded write gave up under sustained contention"
        );
        Err(Error::ConflictExhausted {
            id,
            attempts: limit,
        })
    }
}

/// One conditional operation the loop can re-issue
#[async_trait]
trait Attempt<T: Entity>: Send + Sync {
    type Applied: Send;

    async fn attempt(
        &self,
        store: &dyn RecordStore<T>,
        id: RecordId,
        expected: &VersionToken,
        baseline: Option<&Versioned<T>>,
    ) -> Result<Conditional<T, Self::Applied>>;
}

struct Write<'a, T> {
    proposed: T,
    strategy: &'a dyn MergeStrategy<T>,
}

#[async_trait]
impl<T: Entity> Attempt<T> for Write<'_, T> {
    type Applied = VersionToken;

    async fn attempt(
        &self,
        store: &dyn RecordStore<T>,
        id: RecordId,
        expected: &VersionToken,
        baseline: Option<&Versioned<T>>,
    ) -> Result<Conditional<T, VersionToken>> {
        let fields = baseline.map_or_else(
            || self.proposed.clone(),
            |current| self.strategy.reconcile(&self.proposed, current),
        );
        store.conditional_write(id, expected, fields).await
    }
}

struct Delete;

#[async_trait]
impl<T: Entity> Attempt<T> for Delete {
    type Applied = ();

    async fn attempt(
        &self,
        store: &dyn RecordStore<T>,
        id: RecordId,
        expected: &VersionToken,
        _baseline: Option<&Versioned<T>>,
    ) -> Result<Conditional<T, ()>> {
        store.conditional_delete(id, expected).await
    }
}
