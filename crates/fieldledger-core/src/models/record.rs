//! Versioned record envelope shared by every entity

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::version::VersionToken;

/// Store-assigned record identifier. Never reused within a store's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    /// Wrap a raw identifier
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw identifier value
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// A persisted record: identity, version stamp, and the entity's own fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Store-assigned identifier
    pub id: RecordId,
    /// Stamp of the last committed write
    pub version: VersionToken,
    /// Entity fields
    #[serde(flatten)]
    pub fields: T,
}

/// Which table/collection a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Account,
    Transaction,
}

impl EntityKind {
    /// Stable lowercase label for logs
    pub const fn label(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Account => "account",
            Self::Transaction => "transaction",
        }
    }
}

/// Verified caller identity supplied by the auth layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    user_code: String,
}

impl Actor {
    /// Maximum length of the audit columns the identity is stamped into
    pub const MAX_CODE_LEN: usize = 20;

    /// Build an actor from a verified subject.
    ///
    /// The code is clipped to the width of the audit columns.
    pub fn new(user_code: impl AsRef<str>) -> Self {
        Self {
            user_code: user_code
                .as_ref()
                .trim()
                .chars()
                .take(Self::MAX_CODE_LEN)
                .collect(),
        }
    }

    /// Code stamped into audit fields
    pub fn code(&self) -> &str {
        &self.user_code
    }
}

/// Domain entity stored as a [`Versioned`] record
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    /// Collection the entity lives in
    const KIND: EntityKind;

    /// Check declarative field constraints
    fn validate(&self) -> Result<()>;

    /// Stamp audit fields before the first insert
    fn stamp_created(&mut self, _actor: &Actor, _at: DateTime<Utc>) {}

    /// Stamp audit fields before a guarded update
    fn stamp_updated(&mut self, _actor: &Actor, _at: DateTime<Utc>) {}

    /// Copy fields that are fixed at creation from the stored record.
    ///
    /// Stores call this inside a conditional write after the version check
    /// passes, so an update can never rewrite creation-time audit data.
    fn preserve_immutable(&mut self, _stored: &Self) {}
}
