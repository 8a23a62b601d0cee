//! Prize tag entity model.

use raffle_core::types::{DbId, Timestamp, TicketNumber};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `prize_tags` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct PrizeTag {
    pub id: DbId,
    pub assignment_id: DbId,
    pub raffle_id: DbId,
    pub number: TicketNumber,
    pub tier: String,
    pub created_at: Timestamp,
}
