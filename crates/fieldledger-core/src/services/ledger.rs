//! Shared ledger service used by the HTTP layer.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::conflict::RetryPolicy;
use crate::db::{Database, SqlRecord, SqliteRecordStore};
use crate::ingest::{SyncIngestor, DEFAULT_MAX_BATCH};
use crate::models::{Account, Client, RecordId, Transaction, Versioned};
use crate::store::{InMemoryStore, RecordStore};
use crate::Result;

use super::records::RecordService;

/// Tuning shared by every entity service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSettings {
    pub retry: RetryPolicy,
    pub max_batch: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}

/// Backing store of a [`Ledger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

/// A client together with the accounts that reference it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientWithAccounts {
    #[serde(flatten)]
    pub client: Versioned<Client>,
    pub accounts: Vec<Versioned<Account>>,
}

/// Every entity service over one backing store
pub struct Ledger {
    pub clients: RecordService<Client>,
    pub accounts: RecordService<Account>,
    pub transactions: RecordService<Transaction>,
    pub sync: SyncIngestor<Transaction>,
    kind: StoreKind,
}

impl Ledger {
    /// Ledger over process-local maps (primarily for tests and demos).
    pub fn in_memory(settings: LedgerSettings) -> Self {
        tracing::info!("Running with the in-memory store; data is lost on exit");
        Self::assemble(
            Arc::new(InMemoryStore::<Client>::new()),
            Arc::new(InMemoryStore::<Account>::new()),
            Arc::new(InMemoryStore::<Transaction>::new()),
            settings,
            StoreKind::Memory,
        )
    }

    /// Ledger over a `SQLite` file, created and migrated if needed.
    pub async fn open_sqlite(path: impl AsRef<Path>, settings: LedgerSettings) -> Result<Self> {
        let path = path.as_ref();
        let db = Database::open(path).await?;
        tracing::info!(path = %path.display(), "Opened SQLite ledger");
        Ok(Self::over_database(&db, settings))
    }

    /// Ledger over an already opened database
    pub fn over_database(db: &Database, settings: LedgerSettings) -> Self {
        Self::assemble(
            sqlite::<Client>(db),
            sqlite::<Account>(db),
            sqlite::<Transaction>(db),
            settings,
            StoreKind::Sqlite,
        )
    }

    fn assemble(
        clients: Arc<dyn RecordStore<Client>>,
        accounts: Arc<dyn RecordStore<Account>>,
        transactions: Arc<dyn RecordStore<Transaction>>,
        settings: LedgerSettings,
        kind: StoreKind,
    ) -> Self {
        let sync = SyncIngestor::new(Arc::clone(&transactions)).with_max_batch(settings.max_batch);
        Self {
            clients: RecordService::new(clients, settings.retry),
            accounts: RecordService::new(accounts, settings.retry),
            transactions: RecordService::new(transactions, settings.retry),
            sync,
            kind,
        }
    }

    pub const fn store_kind(&self) -> StoreKind {
        self.kind
    }

    /// One client with its accounts
    pub async fn client_with_accounts(&self, id: RecordId) -> Result<ClientWithAccounts> {
        let client = self.clients.get(id).await?;
        let accounts = self
            .accounts
            .list()
            .await?
            .into_iter()
            .filter(|account| account.fields.client_id == id)
            .collect();
        Ok(ClientWithAccounts { client, accounts })
    }

    /// Every client with its accounts, in id order
    pub async fn clients_with_accounts(&self) -> Result<Vec<ClientWithAccounts>> {
        let clients = self.clients.list().await?;
        let mut accounts = self.accounts.list().await?;

        Ok(clients
            .into_iter()
            .map(|client| {
                let (owned, rest): (Vec<_>, Vec<_>) = accounts
                    .drain(..)
                    .partition(|account| account.fields.client_id == client.id);
                accounts = rest;
                ClientWithAccounts {
                    client,
                    accounts: owned,
                }
            })
            .collect())
    }
}

fn sqlite<T: SqlRecord>(db: &Database) -> Arc<dyn RecordStore<T>> {
    Arc::new(SqliteRecordStore::<T>::new(db.clone()))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;
    use crate::models::{fixtures, Actor};

    fn account(code: &str, client_id: RecordId) -> Account {
        Account {
            portfolio_agent_id: 4,
            account_code: code.to_string(),
            product_description: "Microcredit".to_string(),
            account_type_code: "MC".to_string(),
            created_at: Utc::now(),
            client_id,
        }
    }

    async fn seed(ledger: &Ledger) -> (RecordId, RecordId) {
        let actor = Actor::new("admin");
        let ana = ledger
            .clients
            .create(&actor, Client::new("C-1", "Ana", "R1"))
            .await
            .unwrap();
        let luis = ledger
            .clients
            .create(&actor, Client::new("C-2", "Luis", "R1"))
            .await
            .unwrap();
        for (code, owner) in [("AC-1", ana.id), ("AC-2", luis.id), ("AC-3", ana.id)] {
            ledger
                .accounts
                .create(&actor, account(code, owner))
                .await
                .unwrap();
        }
        (ana.id, luis.id)
    }

    #[tokio::test]
    async fn test_clients_are_grouped_with_their_accounts() {
        let ledger = Ledger::in_memory(LedgerSettings::default());
        let (ana, luis) = seed(&ledger).await;

        let one = ledger.client_with_accounts(ana).await.unwrap();
        let codes: Vec<_> = one
            .accounts
            .iter()
            .map(|a| a.fields.account_code.as_str())
            .collect();
        assert_eq!(codes, vec!["AC-1", "AC-3"]);

        let all = ledger.clients_with_accounts().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].client.id, luis);
        assert_eq!(all[1].accounts.len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_ledger_persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("ledger.db");

        {
            let ledger = Ledger::open_sqlite(&path, LedgerSettings::default())
                .await
                .unwrap();
            assert_eq!(ledger.store_kind(), StoreKind::Sqlite);
            seed(&ledger).await;
            let report = ledger
                .sync
                .ingest(&Actor::new("agent7"), vec![fixtures::transaction("RC-1")])
                .await
                .unwrap();
            assert_eq!(report.accepted, 1);
        }

        let ledger = Ledger::open_sqlite(&path, LedgerSettings::default())
            .await
            .unwrap();
        assert_eq!(ledger.clients.list().await.unwrap().len(), 2);
        assert_eq!(ledger.transactions.list().await.unwrap().len(), 1);
    }

    #[test]
    fn test_client_view_flattens_record() {
        let view = ClientWithAccounts {
            client: Versioned {
                id: RecordId::new(1),
                version: crate::version::VersionToken::from_bytes(vec![0, 1]),
                fields: Client::new("C-1", "Ana", "R1"),
            },
            accounts: Vec::new(),
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["clientCode"], "C-1");
        assert_eq!(json["version"], "AAE");
        assert_eq!(json["accounts"], serde_json::json!([]));
    }
}
