//! Database migrations

use crate::error::Result;
use rusqlite::{Connection, OptionalExtension};

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &mut Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        apply(conn, 1, V1)?;
    }
    if version < 2 {
        apply(conn, 2, V2)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get::<_, Option<i32>>(0)
        })
        .optional()?
        .flatten()
        .unwrap_or(0);

    Ok(version)
}

/// Version 1: versioned entity tables.
///
/// `AUTOINCREMENT` keeps SQLite from handing out the id of a deleted row again.
const V1: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER PRIMARY KEY
    )",
    "CREATE TABLE IF NOT EXISTS clients (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version BLOB NOT NULL,
        client_code TEXT NOT NULL,
        name TEXT NOT NULL,
        route_code TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 1,
        created_by TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_by TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS accounts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version BLOB NOT NULL,
        portfolio_agent_id INTEGER NOT NULL,
        account_code TEXT NOT NULL,
        product_description TEXT NOT NULL,
        account_type_code TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        client_id INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS transactions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version BLOB NOT NULL,
        movement_code TEXT NOT NULL,
        account_code TEXT NOT NULL,
        client_code TEXT NOT NULL,
        client_name TEXT NOT NULL,
        route_code TEXT NOT NULL,
        agent_code TEXT NOT NULL,
        collected_at INTEGER NOT NULL,
        receipt_number TEXT NOT NULL,
        amount REAL NOT NULL,
        transaction_code TEXT NOT NULL,
        inserted_at INTEGER NOT NULL,
        user_code TEXT NOT NULL,
        account_type_code TEXT NOT NULL,
        reference TEXT NOT NULL,
        app_movement_id INTEGER NOT NULL,
        app_moved_at INTEGER NOT NULL,
        core_client_id INTEGER NOT NULL,
        core_account_id INTEGER NOT NULL,
        transaction_type INTEGER NOT NULL,
        reverses_id INTEGER,
        user_token TEXT NOT NULL
    )",
];

/// Version 2: lookup indexes for client accounts and reversals
const V2: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_accounts_client ON accounts(client_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_reverses ON transactions(reverses_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_reference ON transactions(reference)",
];

fn apply(conn: &mut Connection, version: i32, statements: &[&str]) -> Result<()> {
    let tx = conn.transaction()?;
    for stmt in statements {
        tx.execute(stmt, [])?;
    }
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    tx.commit()?;

    tracing::info!("Migrated database to version {version} of {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let mut conn = setup();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_creates_entity_tables() {
        let mut conn = setup();
        run(&mut conn).unwrap();

        for table in ["clients", "accounts", "transactions"] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert!(exists, "missing table {table}");
        }
    }
}
