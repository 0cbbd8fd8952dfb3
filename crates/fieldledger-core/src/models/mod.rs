//! Data models for fieldledger

mod account;
mod client;
mod record;
mod transaction;
mod validate;

pub use account::Account;
pub use client::Client;
pub use record::{Actor, Entity, EntityKind, RecordId, Versioned};
pub use transaction::Transaction;
pub use validate::FieldCheck;

#[cfg(test)]
pub(crate) use transaction::fixtures;
