//! Database connection management

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use super::migrations;
use crate::error::{Error, Result};
use crate::version::{VersionClock, VersionToken};

/// Shared handle to one `SQLite` connection.
///
/// Cloning is cheap. All statements run on the blocking thread pool while
/// holding the connection lock, so each closure passed to [`Database::run`]
/// observes no interleaved writes from this process.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<VersionClock>,
}

impl Database {
    /// Open a database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Database(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            Self::prepare(Connection::open(&path)?)
        })
        .await
        .map_err(join_error)?
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        tokio::task::spawn_blocking(|| Self::prepare(Connection::open_in_memory()?))
            .await
            .map_err(join_error)?
    }

    fn prepare(mut conn: Connection) -> Result<Self> {
        configure(&conn)?;
        migrations::run(&mut conn)?;
        let latest = latest_version(&conn)?;
        tracing::debug!(resumed = latest.is_some(), "Database ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock: Arc::new(VersionClock::resume_after(latest.as_ref())),
        })
    }

    /// Run `f` against the connection on the blocking pool
    pub(crate) async fn run<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection, &VersionClock) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let clock = Arc::clone(&self.clock);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| Error::Database("connection lock poisoned".into()))?;
            f(&mut guard, &clock)
        })
        .await
        .map_err(join_error)?
    }
}

/// Configure `SQLite` for a single-writer service
fn configure(conn: &Connection) -> Result<()> {
    // WAL is unavailable for in-memory databases; the pragma simply reports "memory".
    conn.pragma_update(None, "journal_mode", "WAL").ok();
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Highest version stamp persisted in any table.
///
/// Tokens are big-endian stamps, so `SQLite`'s bytewise BLOB ordering matches
/// mint order.
fn latest_version(conn: &Connection) -> Result<Option<VersionToken>> {
    let latest: Option<Vec<u8>> = conn.query_row(
        "SELECT MAX(v) FROM (
            SELECT MAX(version) AS v FROM clients
            UNION ALL SELECT MAX(version) FROM accounts
            UNION ALL SELECT MAX(version) FROM transactions
        )",
        [],
        |row| row.get(0),
    )?;
    Ok(latest.map(VersionToken::from_bytes))
}

fn join_error(error: tokio::task::JoinError) -> Error {
    Error::Database(format!("blocking database task failed: {error}"))
}
