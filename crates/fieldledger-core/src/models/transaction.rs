//! Collection transaction model
//!
//! A transaction is a business fact recorded by a field agent. Updates and
//! deletes exist only to correct sync mistakes; a business reversal is a new
//! transaction whose `reverses_id` points at the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::{Actor, Entity, EntityKind, RecordId};
use super::validate::FieldCheck;
use crate::error::Result;

/// A single monetary collection event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub movement_code: String,
    /// Denormalized account code
    pub account_code: String,
    /// Denormalized client code
    pub client_code: String,
    pub client_name: String,
    pub route_code: String,
    /// Agent that collected the payment
    pub agent_code: String,
    /// When the money changed hands
    pub collected_at: DateTime<Utc>,
    pub receipt_number: String,
    pub amount: f64,
    pub transaction_code: String,
    /// Server-side insert time (server stamped)
    #[serde(default = "Utc::now")]
    pub inserted_at: DateTime<Utc>,
    pub user_code: String,
    pub account_type_code: String,
    /// Client-generated reference, usually a UUID
    pub reference: String,
    /// Identifier of the movement in the agent's local queue
    pub app_movement_id: i64,
    /// When the movement was recorded on the device
    #[serde(default = "Utc::now")]
    pub app_moved_at: DateTime<Utc>,
    /// Client id in the core banking system
    pub core_client_id: i64,
    /// Account id in the core banking system
    pub core_account_id: i64,
    pub transaction_type: i64,
    /// Back-reference to the transaction this one reverses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reverses_id: Option<RecordId>,
    pub user_token: String,
}

impl Transaction {
    /// Whether this record reverses an earlier transaction
    pub const fn is_reversal(&self) -> bool {
        self.reverses_id.is_some()
    }
}

impl Entity for Transaction {
    const KIND: EntityKind = EntityKind::Transaction;

    fn validate(&self) -> Result<()> {
        let check = FieldCheck::new()
            .text("movementCode", &self.movement_code, 10)
            .text("accountCode", &self.account_code, 20)
            .text("clientCode", &self.client_code, 20)
            .text("clientName", &self.client_name, 100)
            .text("routeCode", &self.route_code, 20)
            .text("agentCode", &self.agent_code, 30)
            .text("receiptNumber", &self.receipt_number, 40)
            .finite("amount", self.amount)
            .text("transactionCode", &self.transaction_code, 5)
            .text("userCode", &self.user_code, 20)
            .text("accountTypeCode", &self.account_type_code, 5)
            .text("reference", &self.reference, 36)
            .text("userToken", &self.user_token, 300);

        match self.reverses_id {
            Some(original) => check.positive("reversesId", original.get()).finish(),
            None => check.finish(),
        }
    }

    fn stamp_created(&mut self, _actor: &Actor, at: DateTime<Utc>) {
        self.inserted_at = at;
    }

    fn preserve_immutable(&mut self, stored: &Self) {
        self.inserted_at = stored.inserted_at;
    }
}
