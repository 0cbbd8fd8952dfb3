//! `SQLite` persistence for fieldledger

mod connection;
mod mapping;
mod migrations;
mod repository;

pub use connection::Database;
pub use mapping::SqlRecord;
pub use repository::SqliteRecordStore;
