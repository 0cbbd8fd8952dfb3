//! Column mappings between entities and their tables

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::Row;

use crate::models::{Account, Client, Entity, RecordId, Transaction};

/// Entity with a flat column layout in its own table.
///
/// Every table also carries `id INTEGER PRIMARY KEY AUTOINCREMENT` and
/// `version BLOB NOT NULL`; `COLUMNS` lists only the entity's own fields, in
/// the order produced by `to_values` and consumed by `from_row`.
pub trait SqlRecord: Entity {
    const TABLE: &'static str;
    const COLUMNS: &'static [&'static str];

    fn to_values(&self) -> Vec<Value>;

    /// Read the entity's columns starting at `offset`
    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self>;
}

impl SqlRecord for Client {
    const TABLE: &'static str = "clients";
    const COLUMNS: &'static [&'static str] = &[
        "client_code",
        "name",
        "route_code",
        "active",
        "created_by",
        "created_at",
        "updated_by",
        "updated_at",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.client_code.clone()),
            Value::Text(self.name.clone()),
            Value::Text(self.route_code.clone()),
            Value::Integer(i64::from(self.active)),
            Value::Text(self.created_by.clone()),
            micros(self.created_at),
            Value::Text(self.updated_by.clone()),
            micros(self.updated_at),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            client_code: row.get(offset)?,
            name: row.get(offset + 1)?,
            route_code: row.get(offset + 2)?,
            active: row.get(offset + 3)?,
            created_by: row.get(offset + 4)?,
            created_at: timestamp(row, offset + 5)?,
            updated_by: row.get(offset + 6)?,
            updated_at: timestamp(row, offset + 7)?,
        })
    }
}

impl SqlRecord for Account {
    const TABLE: &'static str = "accounts";
    const COLUMNS: &'static [&'static str] = &[
        "portfolio_agent_id",
        "account_code",
        "product_description",
        "account_type_code",
        "created_at",
        "client_id",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Integer(self.portfolio_agent_id),
            Value::Text(self.account_code.clone()),
            Value::Text(self.product_description.clone()),
            Value::Text(self.account_type_code.clone()),
            micros(self.created_at),
            Value::Integer(self.client_id.get()),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            portfolio_agent_id: row.get(offset)?,
            account_code: row.get(offset + 1)?,
            product_description: row.get(offset + 2)?,
            account_type_code: row.get(offset + 3)?,
            created_at: timestamp(row, offset + 4)?,
            client_id: RecordId::new(row.get(offset + 5)?),
        })
    }
}

impl SqlRecord for Transaction {
    const TABLE: &'static str = "transactions";
    const COLUMNS: &'static [&'static str] = &[
        "movement_code",
        "account_code",
        "client_code",
        "client_name",
        "route_code",
        "agent_code",
        "collected_at",
        "receipt_number",
        "amount",
        "transaction_code",
        "inserted_at",
        "user_code",
        "account_type_code",
        "reference",
        "app_movement_id",
        "app_moved_at",
        "core_client_id",
        "core_account_id",
        "transaction_type",
        "reverses_id",
        "user_token",
    ];

    fn to_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.movement_code.clone()),
            Value::Text(self.account_code.clone()),
            Value::Text(self.client_code.clone()),
            Value::Text(self.client_name.clone()),
            Value::Text(self.route_code.clone()),
            Value::Text(self.agent_code.clone()),
            micros(self.collected_at),
            Value::Text(self.receipt_number.clone()),
            Value::Real(self.amount),
            Value::Text(self.transaction_code.clone()),
            micros(self.inserted_at),
            Value::Text(self.user_code.clone()),
            Value::Text(self.account_type_code.clone()),
            Value::Text(self.reference.clone()),
            Value::Integer(self.app_movement_id),
            micros(self.app_moved_at),
            Value::Integer(self.core_client_id),
            Value::Integer(self.core_account_id),
            Value::Integer(self.transaction_type),
            self.reverses_id
                .map_or(Value::Null, |id| Value::Integer(id.get())),
            Value::Text(self.user_token.clone()),
        ]
    }

    fn from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            movement_code: row.get(offset)?,
            account_code: row.get(offset + 1)?,
            client_code: row.get(offset + 2)?,
            client_name: row.get(offset + 3)?,
            route_code: row.get(offset + 4)?,
            agent_code: row.get(offset + 5)?,
            collected_at: timestamp(row, offset + 6)?,
            receipt_number: row.get(offset + 7)?,
            amount: row.get(offset + 8)?,
            transaction_code: row.get(offset + 9)?,
            inserted_at: timestamp(row, offset + 10)?,
            user_code: row.get(offset + 11)?,
            account_type_code: row.get(offset + 12)?,
            reference: row.get(offset + 13)?,
            app_movement_id: row.get(offset + 14)?,
            app_moved_at: timestamp(row, offset + 15)?,
            core_client_id: row.get(offset + 16)?,
            core_account_id: row.get(offset + 17)?,
            transaction_type: row.get(offset + 18)?,
            reverses_id: row.get::<_, Option<i64>>(offset + 19)?.map(RecordId::new),
            user_token: row.get(offset + 20)?,
        })
    }
}

/// Timestamps are stored as Unix microseconds
fn micros(at: DateTime<Utc>) -> Value {
    Value::Integer(at.timestamp_micros())
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let us: i64 = row.get(idx)?;
    DateTime::from_timestamp_micros(us).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {us} out of range").into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_counts_match_values() {
        let client = Client::new("C-1", "Ana", "R1");
        assert_eq!(client.to_values().len(), Client::COLUMNS.len());

        let account = Account {
            portfolio_agent_id: 1,
            account_code: "AC".to_string(),
            product_description: "P".to_string(),
            account_type_code: "T".to_string(),
            created_at: Utc::now(),
            client_id: RecordId::new(1),
        };
        assert_eq!(account.to_values().len(), Account::COLUMNS.len());

        let tx = crate::models::fixtures::transaction("RC-1");
        assert_eq!(tx.to_values().len(), Transaction::COLUMNS.len());
    }
}
