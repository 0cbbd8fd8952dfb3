//! Account model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{Actor, Entity, EntityKind, RecordId};
use super::validate::FieldCheck;
use crate::error::Result;

/// A product account held by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Portfolio of the executive managing the account
    pub portfolio_agent_id: i64,
    /// Business code of the account
    pub account_code: String,
    /// Product description
    pub product_description: String,
    /// Account type code
    pub account_type_code: String,
    /// Creation time (server stamped)
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Owning client. Not enforced as a foreign key.
    pub client_id: RecordId,
}

impl Entity for Account {
    const KIND: EntityKind = EntityKind::Account;

    fn validate(&self) -> Result<()> {
        FieldCheck::new()
            .text("accountCode", &self.account_code, 20)
            .text("productDescription", &self.product_description, 100)
            .text("accountTypeCode", &self.account_type_code, 5)
            .positive("clientId", self.client_id.get())
            .finish()
    }

    fn stamp_created(&mut self, _actor: &Actor, at: DateTime<Utc>) {
        self.created_at = at;
    }

    fn preserve_immutable(&mut self, stored: &Self) {
        self.created_at = stored.created_at;
    }
}
