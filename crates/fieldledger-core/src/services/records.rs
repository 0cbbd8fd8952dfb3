//! Per-entity operations on top of a record store

use std::sync::Arc;

use chrono::Utc;

use crate::conflict::{Committed, GuardedWriter, MergeStrategy, RetryPolicy};
use crate::error::{Error, Result};
use crate::models::{Actor, Entity, RecordId, Versioned};
use crate::store::RecordStore;
use crate::version::VersionToken;

/// Validated, audited access to one entity's records.
///
/// Creates go straight to the store. Updates and deletes always go through
/// the [`GuardedWriter`].
pub struct RecordService<T> {
    store: Arc<dyn RecordStore<T>>,
    writer: GuardedWriter<T>,
}

impl<T: Entity> RecordService<T> {
    /// Service over `store` retrying guarded writes per `policy`
    pub fn new(store: Arc<dyn RecordStore<T>>, policy: RetryPolicy) -> Self {
        let writer = GuardedWriter::new(Arc::clone(&store)).with_policy(policy);
        Self { store, writer }
    }

    /// Swap the merge strategy used when a guarded update retries
    #[must_use]
    pub fn with_strategy(mut self, strategy: Arc<dyn MergeStrategy<T>>) -> Self {
        self.writer = self.writer.with_strategy(strategy);
        self
    }

    /// Fetch a record, treating an unknown id as an error
    pub async fn get(&self, id: RecordId) -> Result<Versioned<T>> {
        self.store.get(id).await?.ok_or(Error::NotFound(id))
    }

    /// All records in id order
    pub async fn list(&self) -> Result<Vec<Versioned<T>>> {
        self.store.list().await
    }

    /// Validate, stamp creation audit fields, and insert
    pub async fn create(&self, actor: &Actor, mut fields: T) -> Result<Versioned<T>> {
        fields.validate()?;
        fields.stamp_created(actor, Utc::now());
        let record = self.store.insert(fields).await?;
        tracing::debug!(entity = T::KIND.label(), id = %record.id, "Record created");
        Ok(record)
    }

    /// Guarded update.
    ///
    /// Without an `expected` version the current stored version is used as
    /// the starting baseline.
    pub async fn update(
        &self,
        actor: &Actor,
        id: RecordId,
        expected: Option<VersionToken>,
        mut fields: T,
    ) -> Result<Committed<VersionToken>> {
        fields.validate()?;
        fields.stamp_updated(actor, Utc::now());
        let expected = self.baseline(id, expected).await?;
        self.writer.update(id, expected, fields).await
    }

    /// Guarded delete
    pub async fn delete(
        &self,
        id: RecordId,
        expected: Option<VersionToken>,
    ) -> Result<Committed<()>> {
        let expected = self.baseline(id, expected).await?;
        self.writer.delete(id, expected).await
    }

    async fn baseline(&self, id: RecordId, expected: Option<VersionToken>) -> Result<VersionToken> {
        match expected {
            Some(version) => Ok(version),
            None => Ok(self.get(id).await?.version),
        }
    }
}
