//! Assignment entity model.

use raffle_core::types::{DbId, IntentId, Timestamp, TicketNumber};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `assignments` table. Immutable once inserted.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Assignment {
    pub id: DbId,
    pub payment_intent_id: IntentId,
    pub participant_id: DbId,
    pub raffle_id: DbId,
    pub pool_id: DbId,
    /// Issued numbers in ascending order.
    pub numbers: Vec<TicketNumber>,
    pub created_at: Timestamp,
}

/// Everything needed to commit one draw.
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub payment_intent_id: IntentId,
    pub participant_id: DbId,
    pub raffle_id: DbId,
    pub pool_id: DbId,
    pub numbers: Vec<TicketNumber>,
    /// Pool version observed when the numbers were drawn.
    pub expected_pool_version: i64,
}

/// Result of [`crate::repositories::AssignmentRepo::commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// This call created the assignment.
    Committed(Assignment),
    /// Another caller already committed an assignment for the intent.
    AlreadyAssigned(Assignment),
    /// The pool changed since it was read; nothing was written.
    PoolConflict,
}
