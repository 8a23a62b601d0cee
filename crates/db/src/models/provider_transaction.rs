//! Provider transaction rows: the source of the realtime change feed.

use raffle_core::types::{DbId, IntentId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Provider-side status of a transaction row.
pub const TX_PENDING: &str = "pending";
pub const TX_APPROVED: &str = "approved";
pub const TX_CANCELED: &str = "canceled";

/// A row from the `provider_transactions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProviderTransaction {
    pub id: DbId,
    pub payment_intent_id: IntentId,
    pub provider: String,
    pub provider_reference: Option<String>,
    pub status: String,
    pub amount_cents: Option<i64>,
    pub raw_payload: Option<serde_json::Value>,
    pub reconciled_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl ProviderTransaction {
    pub fn is_terminal(&self) -> bool {
        self.status != TX_PENDING
    }
}

/// Upsert payload written by provider adapters.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertProviderTransaction {
    pub payment_intent_id: IntentId,
    pub provider: String,
    pub provider_reference: Option<String>,
    pub status: String,
    pub amount_cents: Option<i64>,
    pub raw_payload: Option<serde_json::Value>,
}
