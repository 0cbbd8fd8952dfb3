//! `SQLite` implementation of `RecordStore`

use std::marker::PhantomData;

use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};

use super::connection::Database;
use super::mapping::SqlRecord;
use crate::error::{Error, Result};
use crate::models::{RecordId, Versioned};
use crate::store::{Conditional, DeleteOutcome, RecordStore, WriteOutcome};
use crate::version::VersionToken;

/// Table-per-entity store over a shared [`Database`]
pub struct SqliteRecordStore<T> {
    db: Database,
    _entity: PhantomData<fn() -> T>,
}

impl<T: SqlRecord> SqliteRecordStore<T> {
    /// Create a store for `T`'s table on the given database
    pub const fn new(db: Database) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }
}

fn select_sql<T: SqlRecord>() -> String {
    format!(
        "SELECT id, version, {} FROM {}",
        T::COLUMNS.join(", "),
        T::TABLE
    )
}

/// Parse a record from a database row
fn parse_record<T: SqlRecord>(row: &Row<'_>) -> rusqlite::Result<Versioned<T>> {
    Ok(Versioned {
        id: RecordId::new(row.get(0)?),
        version: VersionToken::from_bytes(row.get::<_, Vec<u8>>(1)?),
        fields: T::from_row(row, 2)?,
    })
}

fn fetch<T: SqlRecord>(conn: &Connection, id: RecordId) -> Result<Option<Versioned<T>>> {
    let sql = format!("{} WHERE id = ?1", select_sql::<T>());
    Ok(conn
        .query_row(&sql, [id.get()], parse_record::<T>)
        .optional()?)
}

fn version_value(version: &VersionToken) -> Value {
    Value::Blob(version.as_bytes().to_vec())
}

#[async_trait]
impl<T: SqlRecord> RecordStore<T> for SqliteRecordStore<T> {
    async fn get(&self, id: RecordId) -> Result<Option<Versioned<T>>> {
        self.db.run(move |conn, _| fetch::<T>(conn, id)).await
    }

    async fn list(&self) -> Result<Vec<Versioned<T>>> {
        self.db
            .run(|conn, _| {
                let mut stmt = conn.prepare(&format!("{} ORDER BY id", select_sql::<T>()))?;
                let records = stmt
                    .query_map([], parse_record::<T>)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(records)
            })
            .await
    }

    async fn insert(&self, fields: T) -> Result<Versioned<T>> {
        self.db
            .run(move |conn, clock| {
                let placeholders = (2..=T::COLUMNS.len() + 1)
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let columns = T::COLUMNS.join(", ");
                // Returned as stored so the caller sees the persisted precision.
                let sql = format!(
                    "INSERT INTO {} (version, {columns}) VALUES (?1, {placeholders}) \
                     RETURNING id, version, {columns}",
                    T::TABLE,
                );

                let mut values = vec![version_value(&clock.next())];
                values.extend(fields.to_values());
                Ok(conn.query_row(&sql, params_from_iter(values), parse_record::<T>)?)
            })
            .await
    }

    async fn conditional_write(
        &self,
        id: RecordId,
        expected: &VersionToken,
        mut fields: T,
    ) -> Result<WriteOutcome<T>> {
        let expected = expected.clone();
        self.db
            .run(move |conn, clock| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(stored) = fetch::<T>(&tx, id)? else {
                    return Ok(Conditional::NotFound);
                };
                if stored.version != expected {
                    return Ok(Conditional::VersionMismatch(stored));
                }

                fields.preserve_immutable(&stored.fields);
                let assignments = T::COLUMNS
                    .iter()
                    .enumerate()
                    .map(|(i, column)| format!("{column} = ?{}", i + 2))
                    .collect::<Vec<_>>()
                    .join(", ");
                let n = T::COLUMNS.len() + 2;
                let sql = format!(
                    "UPDATE {} SET version = ?1, {assignments} WHERE id = ?{n} AND version = ?{}",
                    T::TABLE,
                    n + 1
                );

                let version = clock.next();
                let mut values = vec![version_value(&version)];
                values.extend(fields.to_values());
                values.push(Value::Integer(id.get()));
                values.push(version_value(&expected));

                let changed = tx.execute(&sql, params_from_iter(values))?;
                if changed != 1 {
                    return Err(Error::Database(format!(
                        "conditional update of {} {id} touched {changed} rows",
                        T::KIND.label()
                    )));
                }
                tx.commit()?;
                Ok(Conditional::Applied(version))
            })
            .await
    }

    async fn conditional_delete(
        &self,
        id: RecordId,
        expected: &VersionToken,
    ) -> Result<DeleteOutcome<T>> {
        let expected = expected.clone();
        self.db
            .run(move |conn, _| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let Some(stored) = fetch::<T>(&tx, id)? else {
                    return Ok(Conditional::NotFound);
                };
                if stored.version != expected {
                    return Ok(Conditional::VersionMismatch(stored));
                }

                let sql = format!("DELETE FROM {} WHERE id = ?1 AND version = ?2", T::TABLE);
                let changed = tx.execute(
                    &sql,
                    params_from_iter([Value::Integer(id.get()), version_value(&expected)]),
                )?;
                if changed != 1 {
                    return Err(Error::Database(format!(
                        "conditional delete of {} {id} touched {changed} rows",
                        T::KIND.label()
                    )));
                }
                tx.commit()?;
                Ok(Conditional::Applied(()))
            })
            .await
    }
}
