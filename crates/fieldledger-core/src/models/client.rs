//! Client model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{Actor, Entity, EntityKind};
use super::validate::FieldCheck;
use crate::error::Result;

/// A customer visited by field agents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    /// Business code of the client
    pub client_code: String,
    /// Display name
    pub name: String,
    /// Collection route the client belongs to
    pub route_code: String,
    /// Logical deactivation flag
    #[serde(default = "default_active")]
    pub active: bool,
    /// Audit: who created the record (server stamped)
    #[serde(default)]
    pub created_by: String,
    /// Audit: creation time (server stamped)
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Audit: who last updated the record (server stamped)
    #[serde(default)]
    pub updated_by: String,
    /// Audit: last update time (server stamped)
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

const fn default_active() -> bool {
    true
}

impl Client {
    /// Create an active client with empty audit fields
    pub fn new(
        client_code: impl Into<String>,
        name: impl Into<String>,
        route_code: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            client_code: client_code.into(),
            name: name.into(),
            route_code: route_code.into(),
            active: true,
            created_by: String::new(),
            created_at: now,
            updated_by: String::new(),
            updated_at: now,
        }
    }
}

impl Entity for Client {
    const KIND: EntityKind = EntityKind::Client;

    fn validate(&self) -> Result<()> {
        FieldCheck::new()
            .text("clientCode", &self.client_code, 10)
            .text("name", &self.name, 100)
            .text("routeCode", &self.route_code, 20)
            .finish()
    }

    fn stamp_created(&mut self, actor: &Actor, at: DateTime<Utc>) {
        self.created_by = actor.code().to_string();
        self.created_at = at;
        self.updated_by = actor.code().to_string();
        self.updated_at = at;
    }

    fn stamp_updated(&mut self, actor: &Actor, at: DateTime<Utc>) {
        self.updated_by = actor.code().to_string();
        self.updated_at = at;
    }

    fn preserve_immutable(&mut self, stored: &Self) {
        self.created_by.clone_from(&stored.created_by);
        self.created_at = stored.created_at;
    }
}
