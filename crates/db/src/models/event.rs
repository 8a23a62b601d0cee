//! Persisted platform event model.

use raffle_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `events` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Event {
    pub id: DbId,
    pub event_type: String,
    pub source_entity_type: Option<String>,
    pub source_entity_id: Option<String>,
    pub payload: serde_json::Value,
    pub occurred_at: Timestamp,
    pub created_at: Timestamp,
}
