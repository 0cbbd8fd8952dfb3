//! Store wrappers and fixtures shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use fieldledger_core::models::Entity;
use fieldledger_core::store::{
    Conditional, DeleteOutcome, InMemoryStore, RecordStore, WriteOutcome,
};
use fieldledger_core::{Error, RecordId, Result, Transaction, VersionToken, Versioned};

/// A competing writer's action, committed just before the next conditional call
#[derive(Debug, Clone)]
pub enum Interference<T> {
    Write(T),
    Delete,
}

/// Store that lets a scripted competitor commit between the caller's
/// read and its conditional operation.
pub struct ScriptedStore<T> {
    inner: InMemoryStore<T>,
    script: Mutex<VecDeque<Interference<T>>>,
    committed: Mutex<Vec<VersionToken>>,
    conditional_calls: AtomicUsize,
}

impl<T: Entity> ScriptedStore<T> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            script: Mutex::new(VecDeque::new()),
            committed: Mutex::new(Vec::new()),
            conditional_calls: AtomicUsize::new(0),
        }
    }

    /// Queue competitor actions, consumed one per conditional call
    pub async fn script(&self, steps: impl IntoIterator<Item = Interference<T>>) {
        self.script.lock().await.extend(steps);
    }

    /// Versions committed by the scripted competitor, in order
    pub async fn competitor_versions(&self) -> Vec<VersionToken> {
        self.committed.lock().await.clone()
    }

    pub fn conditional_calls(&self) -> usize {
        self.conditional_calls.load(Ordering::SeqCst)
    }

    async fn interfere(&self, id: RecordId) -> Result<()> {
        self.conditional_calls.fetch_add(1, Ordering::SeqCst);
        let Some(step) = self.script.lock().await.pop_front() else {
            return Ok(());
        };
        let Some(current) = self.inner.get(id).await? else {
            return Ok(());
        };
        match step {
            Interference::Write(fields) => {
                if let Conditional::Applied(version) = self
                    .inner
                    .conditional_write(id, &current.version, fields)
                    .await?
                {
                    self.committed.lock().await.push(version);
                }
            }
            Interference::Delete => {
                self.inner.conditional_delete(id, &current.version).await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Entity> RecordStore<T> for ScriptedStore<T> {
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        self.inner.list().await
    }

    async fn insert(&self, fields: T) -> Result<Versioned<T>> {
        self.inner.insert(fields).await
    }

    async fn conditional_write(
        &self,
        id: RecordId,
        expected: &VersionToken,
        fields: T,
    ) -> Result<WriteOutcome<T>> {
        self.interfere(id).await?;
        self.inner.conditional_write(id, expected, fields).await
    }

    async fn conditional_delete(
        &self,
        id: RecordId,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome<T>> {
        self.interfere(id).await?;
        self.inner.conditional_delete(id, expected).await
    }
}

/// Per-operation call counters around an in-memory store
#[derive(Debug, Default)]
pub struct CallCounts {
    pub gets: AtomicUsize,
    pub lists: AtomicUsize,
    pub inserts: AtomicUsize,
    pub conditional: AtomicUsize,
}

impl CallCounts {
    /// Calls of any kind
    pub fn total(&self) -> usize {
        [&self.gets, &self.lists, &self.inserts, &self.conditional]
            .iter()
            .map(|count| count.load(Ordering::SeqCst))
            .sum()
    }
}

/// Store spy
pub struct SpyStore<T> {
    inner: InMemoryStore<T>,
    pub calls: Arc<CallCounts>,
}

impl<T: Entity> SpyStore<T> {
    pub fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            calls: Arc::new(CallCounts::default()),
        }
    }
}

#[async_trait]
impl<T: Entity> RecordStore<T> for SpyStore<T> {
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>> {
        self.calls.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        self.calls.lists.fetch_add(1, Ordering::SeqCst);
        self.inner.list().await
    }

    async fn insert(&self, fields: T) -> Result<Versioned<T>> {
        self.calls.inserts.fetch_add(1, Ordering::SeqCst);
        self.inner.insert(fields).await
    }

    async fn conditional_write(
        &self,
        id: RecordId,
        expected: &VersionToken,
        fields: T,
    ) -> Result<WriteOutcome<T>> {
        self.calls.conditional.fetch_add(1, Ordering::SeqCst);
        self.inner.conditional_write(id, expected, fields).await
    }

    async fn conditional_delete(
        &self,
        id: RecordId,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome<T>> {
        self.calls.conditional.fetch_add(1, Ordering::SeqCst);
        self.inner.conditional_delete(id, expected).await
    }
}

/// Store whose insert number `fail_at` (zero-based) fails with a database error
pub struct FailingInsertStore<T> {
    inner: InMemoryStore<T>,
    fail_at: usize,
    inserts: AtomicUsize,
}

impl<T: Entity> FailingInsertStore<T> {
    pub fn new(fail_at: usize) -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_at,
            inserts: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl<T: Entity> RecordStore<T> for FailingInsertStore<T> {
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>> {
        self.inner.get(id).await
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        self.inner.list().await
    }

    async fn insert(&self, fields: T) -> Result<Versioned<T>> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) == self.fail_at {
            return Err(Error::Database("disk I/O error".to_string()));
        }
        self.inner.insert(fields).await
    }

    async fn conditional_write(
        &self,
        id: RecordId,
        expected: &VersionToken,
        fields: T,
    ) -> Result<WriteOutcome<T>> {
        self.inner.conditional_write(id, expected, fields).await
    }

    async fn conditional_delete(
        &self,
        id: RecordId,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome<T>> {
        self.inner.conditional_delete(id, expected).await
    }
}

/// Valid transaction payload with the given receipt number
pub fn transaction(receipt: &str) -> Transaction {
    let now = Utc::now();
    Transaction {
        movement_code: "COB".to_string(),
        account_code: "AC-0001".to_string(),
        client_code: "C-001".to_string(),
        client_name: "Ana Quispe".to_string(),
        route_code: "R12".to_string(),
        agent_code: "AG-77".to_string(),
        collected_at: now,
        receipt_number: receipt.to_string(),
        amount: 80.0,
        transaction_code: "PAY".to_string(),
        inserted_at: now,
        user_code: "agent7".to_string(),
        account_type_code: "MC".to_string(),
        reference: format!("ref-{receipt}"),
        app_movement_id: 1,
        app_moved_at: now,
        core_client_id: 1001,
        core_account_id: 2002,
        transaction_type: 1,
        reverses_id: None,
        user_token: "device-token".to_string(),
    }
}
