//! fieldledger-core - Core library for fieldledger
//!
//! Versioned records for a field-collection back office: clients, their
//! accounts, and the payment transactions agents upload from the road.
//! Every change to an existing record is a compare-and-write against an
//! opaque version token, driven to completion by the conflict loop in
//! [`conflict`]. Batches from devices are ingested item by item by
//! [`ingest::SyncIngestor`].

pub mod conflict;
pub mod db;
pub mod error;
pub mod ingest;
pub mod models;
pub mod services;
pub mod store;
pub mod version;

pub use error::{Error, Result};
pub use models::{Account, Actor, Client, RecordId, Transaction, Versioned};
pub use version::VersionToken;
