//! Batch ingestion of records uploaded by field devices.
//!
//! Items are validated and inserted one at a time, in submission order. A
//! failing item is reported and skipped; it never undoes or blocks its
//! siblings. Re-submitted payloads are not deduplicated.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::{Actor, Entity, RecordId};
use crate::store::RecordStore;
use crate::version::VersionToken;

/// Default upper bound on items per batch
pub const DEFAULT_MAX_BATCH: usize = 500;

/// Why a batch item was not stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "camelCase")]
pub enum ItemRejected {
    /// Payload could not be decoded or failed field constraints
    Invalid(String),
    /// The store refused the insert
    Storage(String),
}

/// Result for one item, keyed by its position in the batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ItemOutcome {
    Accepted {
        index: usize,
        id: RecordId,
        version: VersionToken,
    },
    Rejected {
        index: usize,
        reason: ItemRejected,
    },
}

impl ItemOutcome {
    /// Position of the item in its batch
    pub const fn index(&self) -> usize {
        match self {
            Self::Accepted { index, .. } | Self::Rejected { index, .. } => *index,
        }
    }

    /// Whether the item was stored
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Aggregate state of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    /// Every item was stored
    FullySynced,
    /// Some items were stored
    PartiallySynced,
    /// No item was stored
    NotSynced,
}

/// Per-item outcomes of one batch, in submission order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub status: SyncStatus,
    pub accepted: usize,
    pub rejected: usize,
    pub items: Vec<ItemOutcome>,
}

impl BatchReport {
    fn from_items(items: Vec<ItemOutcome>) -> Self {
        let accepted = items.iter().filter(|item| item.is_accepted()).count();
        let rejected = items.len() - accepted;
        let status = if rejected == 0 {
            SyncStatus::FullySynced
        } else if accepted == 0 {
            SyncStatus::NotSynced
        } else {
            SyncStatus::PartiallySynced
        };
        Self {
            status,
            accepted,
            rejected,
            items,
        }
    }
}

/// Inserts batches of new records into one store
pub struct SyncIngestor<T> {
    store: Arc<dyn RecordStore<T>>,
    max_batch: usize,
}

impl<T: Entity> SyncIngestor<T> {
    /// Ingestor over `store` accepting up to [`DEFAULT_MAX_BATCH`] items
    pub fn new(store: Arc<dyn RecordStore<T>>) -> Self {
        Self {
            store,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Override the largest accepted batch
    #[must_use]
    pub const fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// Ingest already-decoded payloads
    pub async fn ingest(&self, actor: &Actor, batch: Vec<T>) -> Result<BatchReport> {
        self.run(actor, batch.into_iter().map(Ok).collect()).await
    }

    /// Ingest raw JSON items, rejecting the ones that fail to decode
    pub async fn ingest_json(
        &self,
        actor: &Actor,
        batch: Vec<serde_json::Value>,
    ) -> Result<BatchReport>
    where
        T: DeserializeOwned,
    {
        self.check_size(batch.len())?;
        let decoded = batch
            .into_iter()
            .map(|value| serde_json::from_value(value).map_err(|e| e.to_string()))
            .collect();
        self.run(actor, decoded).await
    }

    async fn run(
        &self,
        actor: &Actor,
        batch: Vec<std::result::Result<T, String>>,
    ) -> Result<BatchReport> {
        self.check_size(batch.len())?;

        let mut items = Vec::with_capacity(batch.len());
        for (index, payload) in batch.into_iter().enumerate() {
            let outcome = match self.ingest_one(actor, payload).await {
                Ok((id, version)) => ItemOutcome::Accepted { index, id, version },
                Err(reason) => {
                    tracing::warn!(
                        entity = T::KIND.label(),
                        index,
                        reason = ?reason,
                        "Rejected sync item"
                    );
                    ItemOutcome::Rejected { index, reason }
                }
            };
            items.push(outcome);
        }

        let report = BatchReport::from_items(items);
        tracing::info!(
            entity = T::KIND.label(),
            accepted = report.accepted,
            rejected = report.rejected,
            status = ?report.status,
            "Sync batch processed"
        );
        Ok(report)
    }

    fn check_size(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(Error::EmptyBatch);
        }
        if len > self.max_batch {
            return Err(Error::BatchTooLarge {
                len,
                max: self.max_batch,
            });
        }
        Ok(())
    }

    async fn ingest_one(
        &self,
        actor: &Actor,
        payload: std::result::Result<T, String>,
    ) -> std::result::Result<(RecordId, VersionToken), ItemRejected> {
        let mut fields = payload.map_err(ItemRejected::Invalid)?;
        fields.validate().map_err(|e| match e {
            Error::InvalidInput(message) => ItemRejected::Invalid(message),
            other => ItemRejected::Invalid(other.to_string()),
        })?;
        fields.stamp_created(actor, Utc::now());

        let record = self
            .store
            .insert(fields)
            .await
            .map_err(|e| ItemRejected::Storage(e.to_string()))?;
        Ok((record.id, record.version))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::{fixtures, Transaction};
    use crate::store::InMemoryStore;

    fn ingestor() -> (Arc<InMemoryStore<Transaction>>, SyncIngestor<Transaction>) {
        let store = Arc::new(InMemoryStore::<Transaction>::new());
        let shared: Arc<dyn RecordStore<Transaction>> = store.clone();
        (store, SyncIngestor::new(shared))
    }

    #[tokio::test]
    async fn test_all_items_accepted() {
        let (store, sync) = ingestor();
        let batch = vec![fixtures::transaction("RC-1"), fixtures::transaction("RC-2")];

        let report = sync.ingest(&Actor::new("agent7"), batch).await.unwrap();

        assert_eq!(report.status, SyncStatus::FullySynced);
        assert_eq!(report.accepted, 2);
        let receipts: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.fields.receipt_number)
            .collect();
        assert_eq!(receipts, vec!["RC-1", "RC-2"]);
    }

    #[tokio::test]
    async fn test_invalid_item_is_isolated() {
        let (store, sync) = ingestor();
        let mut bad = fixtures::transaction("RC-2");
        bad.receipt_number = String::new();
        let batch = vec![fixtures::transaction("RC-1"), bad, fixtures::transaction("RC-3")];

        let report = sync.ingest(&Actor::new("agent7"), batch).await.unwrap();

        assert_eq!(report.status, SyncStatus::PartiallySynced);
        assert_eq!(report.accepted, 2);
        assert!(matches!(
            &report.items[1],
            ItemOutcome::Rejected { index: 1, reason: ItemRejected::Invalid(msg) }
                if msg.contains("receiptNumber")
        ));
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_undecodable_json_item_is_rejected() {
        let (_, sync) = ingestor();
        let good = serde_json::to_value(fixtures::transaction("RC-1")).unwrap();
        let batch = vec![serde_json::json!({ "amount": "lots" }), good];

        let report = sync.ingest_json(&Actor::new("agent7"), batch).await.unwrap();

        assert_eq!(report.status, SyncStatus::PartiallySynced);
        assert!(!report.items[0].is_accepted());
        assert!(report.items[1].is_accepted());
        assert_eq!(report.items[1].index(), 1);
    }

    #[tokio::test]
    async fn test_nothing_accepted() {
        let (_, sync) = ingestor();
        let mut bad = fixtures::transaction("RC-1");
        bad.amount = f64::NAN;

        let report = sync.ingest(&Actor::new("agent7"), vec![bad]).await.unwrap();
        assert_eq!(report.status, SyncStatus::NotSynced);
        assert_eq!(report.rejected, 1);
    }

    #[tokio::test]
    async fn test_empty_and_oversized_batches_fail_up_front() {
        let (store, sync) = ingestor();
        let sync = sync.with_max_batch(1);

        let err = sync.ingest(&Actor::new("a"), Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyBatch));

        let batch = vec![fixtures::transaction("RC-1"), fixtures::transaction("RC-2")];
        let err = sync.ingest(&Actor::new("a"), batch).await.unwrap_err();
        assert!(matches!(err, Error::BatchTooLarge { len: 2, max: 1 }));

        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_json_batch_fails_before_decoding() {
        let (store, sync) = ingestor();
        let sync = sync.with_max_batch(2);
        let batch = vec![serde_json::json!({ "amount": "lots" }); 3];

        let err = sync.ingest_json(&Actor::new("a"), batch).await.unwrap_err();
        assert!(matches!(err, Error::BatchTooLarge { len: 3, max: 2 }));

        let err = sync.ingest_json(&Actor::new("a"), Vec::new()).await.unwrap_err();
        assert!(matches!(err, Error::EmptyBatch));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[test]
    fn test_report_wire_shape() {
        let report = BatchReport::from_items(vec![ItemOutcome::Rejected {
            index: 0,
            reason: ItemRejected::Invalid("amount must be a finite number".to_string()),
        }]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "notSynced",
                "accepted": 0,
                "rejected": 1,
                "items": [{
                    "status": "rejected",
                    "index": 0,
                    "reason": { "kind": "invalid", "message": "amount must be a finite number" }
                }]
            })
        );
    }
}
