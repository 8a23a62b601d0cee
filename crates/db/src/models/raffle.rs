//! Raffle entity model and DTOs.

use raffle_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{RaffleStatus, StatusId};

/// A row from the `raffles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Raffle {
    pub id: DbId,
    pub tenant_id: DbId,
    pub pool_id: DbId,
    pub title: String,
    pub price_cents: i64,
    pub total_numbers: i32,
    pub min_tickets_to_activate: i32,
    pub max_tickets_per_user: Option<i32>,
    pub status_id: StatusId,
    pub draw_date: Option<Timestamp>,
    pub prize_rules: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Raffle {
    pub fn status(&self) -> Option<RaffleStatus> {
        RaffleStatus::from_id(self.status_id)
    }
}

/// Input for creating a raffle.
///
/// Raffles are authored by the tenant platform; this DTO exists for seeding
/// and tests.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRaffle {
    pub title: String,
    pub price_cents: i64,
    pub total_numbers: i32,
    pub min_tickets_to_activate: Option<i32>,
    pub max_tickets_per_user: Option<i32>,
    pub draw_date: Option<Timestamp>,
    pub prize_rules: Option<serde_json::Value>,
    /// Draw from an existing custom pool instead of a new dedicated one.
    pub custom_pool_id: Option<DbId>,
}

/// DTO for `POST /api/v1/admin/raffles/{id}/status`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionRaffle {
    pub status: RaffleStatus,
}
