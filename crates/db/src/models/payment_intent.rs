//! Payment intent entity model and DTOs.

use raffle_core::provider::PaymentProvider;
use raffle_core::types::{DbId, IntentId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{IntentStatus, StatusId};

/// A row from the `payment_intents` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct PaymentIntent {
    /// Client-generated idempotency key.
    pub id: IntentId,
    pub tenant_id: DbId,
    pub participant_id: DbId,
    pub raffle_id: DbId,
    pub provider: String,
    pub requested_quantity: i32,
    pub amount_cents: i64,
    pub status_id: StatusId,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub assignment_id: Option<DbId>,
    pub resolved_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl PaymentIntent {
    /// Decoded status. Rows always carry a seeded id, so `None` means the
    /// lookup table and the enum have drifted apart.
    pub fn status(&self) -> Option<IntentStatus> {
        IntentStatus::from_id(self.status_id)
    }

    pub fn payment_provider(&self) -> Result<PaymentProvider, String> {
        self.provider.parse()
    }

    /// Whether a create request carries the same parameters as this row.
    pub fn matches(&self, input: &NewPaymentIntent) -> bool {
        self.participant_id == input.participant_id
            && self.raffle_id == input.raffle_id
            && self.provider == input.provider.as_str()
            && self.requested_quantity == input.requested_quantity
            && self.amount_cents == input.amount_cents
    }
}

/// Insert payload for a new pending intent. `amount_cents` is always
/// computed server-side.
#[derive(Debug, Clone)]
pub struct NewPaymentIntent {
    pub id: IntentId,
    pub tenant_id: DbId,
    pub participant_id: DbId,
    pub raffle_id: DbId,
    pub provider: PaymentProvider,
    pub requested_quantity: i32,
    pub amount_cents: i64,
}

/// Query parameters for `GET /api/v1/admin/intents`.
#[derive(Debug, Deserialize)]
pub struct IntentListQuery {
    /// Status name, e.g. `completed_unallocated`.
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
