//! In-process `RecordStore` used for tests and the default server mode

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Conditional, DeleteOutcome, RecordStore, WriteOutcome};
use crate::error::{Error, Result};
use crate::models::{Entity, RecordId, Versioned};
use crate::version::{VersionClock, VersionToken};

/// Map-backed store. One lock guards the whole map, which makes every
/// conditional operation trivially atomic.
#[derive(Debug)]
pub struct InMemoryStore<T> {
    inner: Mutex<Inner<T>>,
    clock: VersionClock,
}

#[derive(Debug)]
struct Inner<T> {
    records: BTreeMap<RecordId, Versioned<T>>,
    last_id: i64,
}

impl<T> InMemoryStore<T> {
    /// Empty store; ids start at 1
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                records: BTreeMap::new(),
                last_id: 0,
            }),
            clock: VersionClock::new(),
        }
    }
}

impl<T> Default for InMemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Entity> RecordStore<T> for InMemoryStore<T> {
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>> {
        Ok(self.inner.lock().await.records.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        Ok(self.inner.lock().await.records.values().cloned().collect())
    }

    async fn insert(&self, fields: T) -> Result<Versioned<T>> {
        let mut inner = self.inner.lock().await;
        // Ids only move forward, so a deleted id is never handed out again.
        let next = inner
            .last_id
            .checked_add(1)
            .ok_or_else(|| Error::Database(format!("{} id space exhausted", T::KIND.label())))?;
        inner.last_id = next;

        let record = Versioned {
            id: RecordId::new(next),
            version: self.clock.next(),
            fields,
        };
        inner.records.insert(record.id, record.clone());
        Ok(record)
    }

    async fn conditional_write(
        &self,
        id: RecordId,
        expected: &VersionToken,
        mut fields: T,
    ) -> Result<WriteOutcome<T>> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.records.get_mut(&id) else {
            return Ok(Conditional::NotFound);
        };
        if &stored.version != expected {
            return Ok(Conditional::VersionMismatch(stored.clone()));
        }

        fields.preserve_immutable(&stored.fields);
        let version = self.clock.next();
        stored.fields = fields;
        stored.version = version.clone();
        Ok(Conditional::Applied(version))
    }

    async fn conditional_delete(
        &self,
        id: RecordId,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome<T>> {
        let mut inner = self.inner.lock().await;
        let Some(stored) = inner.records.get(&id) else {
            return Ok(Conditional::NotFound);
        };
        if &stored.version != expected {
            return Ok(Conditional::VersionMismatch(stored.clone()));
        }

        inner.records.remove(&id);
        Ok(Conditional::Applied(()))
    }
}
