//! Number pool entity model and DTOs.

use raffle_core::pool::PoolKind;
use raffle_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `number_pools` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct NumberPool {
    pub id: DbId,
    pub tenant_id: DbId,
    pub kind: String,
    pub capacity: Option<i32>,
    pub numbers_issued: i32,
    /// Optimistic-concurrency token, bumped by every committed draw.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl NumberPool {
    pub fn pool_kind(&self) -> Result<PoolKind, String> {
        self.kind.parse()
    }
}

/// DTO for `POST /api/v1/admin/pools`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCustomPool {
    /// Advisory capacity. `None` leaves the pool unbounded.
    pub capacity: Option<i32>,
}

/// DTO for `PUT /api/v1/admin/pools/{id}/capacity`.
#[derive(Debug, Clone, Deserialize)]
pub struct ResizePool {
    pub capacity: i32,
}
