//! Versioned record persistence.
//!
//! Every mutation goes through a conditional operation that compares the
//! caller's expected [`VersionToken`] with the stored one and applies the
//! change only on a match. The comparison and the change are atomic: no other
//! writer can commit in between. There is deliberately no unconditional
//! overwrite.

mod memory;

pub use memory::InMemoryStore;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entity, RecordId, Versioned};
use crate::version::VersionToken;

/// Outcome of a conditional write or delete
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T, A> {
    /// Versions matched and the change committed
    Applied(A),
    /// Versions differed; carries the record as currently stored
    VersionMismatch(Versioned<T>),
    /// No record with that id
    NotFound,
}

/// Result of `conditional_write`: the new version on success
pub type WriteOutcome<T> = Conditional<T, VersionToken>;

/// Result of `conditional_delete`
pub type DeleteOutcome<T> = Conditional<T, ()>;

/// Trait for versioned record storage operations
///
/// Each method is a potential suspension point. Nothing else in the write
/// path blocks.
#[async_trait]
pub trait RecordStore<T: Entity>: Send + Sync {
    /// Get a record by ID
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>>;

    /// List all records in id order
    async fn list(&self) -> Result<Vec<Versioned<T>>>;

    /// Insert a new record, assigning a fresh id and initial version
    async fn insert(&self, fields: T) -> Result<Versioned<T>>;

    /// Replace a record's fields if its version still equals `expected`
    async fn conditional_write(
        &self,
        id: RecordId,
        expected: &VersionToken,
        fields: T,
    ) -> Result<WriteOutcome<T>>;

    /// Remove a record if its version still equals `expected`
    async fn conditional_delete(
        &self,
        id: RecordId,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome<T>>;
}
