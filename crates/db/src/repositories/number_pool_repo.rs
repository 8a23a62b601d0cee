//! Repository for the `number_pools` and `issued_numbers` tables.

use raffle_core::pool::PoolKind;
use raffle_core::types::{DbId, TicketNumber};
use sqlx::PgPool;

use crate::models::number_pool::NumberPool;

/// Column list for `number_pools` queries.
const COLUMNS: &str =
    "id, tenant_id, kind, capacity, numbers_issued, version, created_at, updated_at";

/// Provides read access to pools and admin-side pool management. Draws are
/// committed through [`crate::repositories::AssignmentRepo::commit`].
pub struct NumberPoolRepo;

impl NumberPoolRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<NumberPool>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM number_pools WHERE id = $1");
        sqlx::query_as::<_, NumberPool>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's pools, newest first.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: DbId,
    ) -> Result<Vec<NumberPool>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM number_pools WHERE tenant_id = $1 ORDER BY id DESC"
        );
        sqlx::query_as::<_, NumberPool>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Create a shared custom pool.
    pub async fn create_custom(
        pool: &PgPool,
        tenant_id: DbId,
        capacity: Option<i32>,
    ) -> Result<NumberPool, sqlx::Error> {
        let query = format!(
            "INSERT INTO number_pools (tenant_id, kind, capacity) \
             VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NumberPool>(&query)
            .bind(tenant_id)
            .bind(PoolKind::Custom.as_str())
            .bind(capacity)
            .fetch_one(pool)
            .await
    }

    /// Change a custom pool's advisory capacity.
    ///
    /// The guard is re-checked in SQL so a draw committed between the
    /// caller's read and this update cannot leave capacity below the
    /// issued count. Returns `None` when the guard rejects the change.
    pub async fn update_capacity(
        pool: &PgPool,
        id: DbId,
        capacity: i32,
    ) -> Result<Option<NumberPool>, sqlx::Error> {
        let query = format!(
            "UPDATE number_pools SET capacity = $2 \
             WHERE id = $1 AND kind = $3 AND numbers_issued <= $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, NumberPool>(&query)
            .bind(id)
            .bind(capacity)
            .bind(PoolKind::Custom.as_str())
            .fetch_optional(pool)
            .await
    }

    /// All numbers issued from a pool, ascending.
    pub async fn list_issued(
        pool: &PgPool,
        pool_id: DbId,
    ) -> Result<Vec<TicketNumber>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT number FROM issued_numbers WHERE pool_id = $1 ORDER BY number",
        )
        .bind(pool_id)
        .fetch_all(pool)
        .await
    }

    /// Number of `issued_numbers` rows for a pool. Always equals
    /// `numbers_issued`; exposed for consistency checks.
    pub async fn count_issued(pool: &PgPool, pool_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM issued_numbers WHERE pool_id = $1")
            .bind(pool_id)
            .fetch_one(pool)
            .await
    }
}
