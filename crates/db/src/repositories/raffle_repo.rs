//! Repository for the `raffles` table.

use raffle_core::pool::PoolKind;
use raffle_core::types::DbId;
use sqlx::PgPool;

use crate::models::raffle::{CreateRaffle, Raffle};
use crate::models::status::RaffleStatus;

/// Column list for `raffles` queries.
const COLUMNS: &str = "\
    id, tenant_id, pool_id, title, price_cents, total_numbers, \
    min_tickets_to_activate, max_tickets_per_user, status_id, draw_date, \
    prize_rules, created_at, updated_at";

pub struct RaffleRepo;

impl RaffleRepo {
    /// Insert a draft raffle.
    ///
    /// Without `custom_pool_id` a dedicated pool of `total_numbers` is created
    /// in the same transaction.
    pub async fn create(
        pool: &PgPool,
        tenant_id: DbId,
        input: &CreateRaffle,
    ) -> Result<Raffle, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let pool_id: DbId = match input.custom_pool_id {
            Some(id) => id,
            None => {
                sqlx::query_scalar(
                    "INSERT INTO number_pools (tenant_id, kind, capacity) \
                     VALUES ($1, $2, $3) RETURNING id",
                )
                .bind(tenant_id)
                .bind(PoolKind::Dedicated.as_str())
                .bind(input.total_numbers)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        let query = format!(
            "INSERT INTO raffles \
                (tenant_id, pool_id, title, price_cents, total_numbers, \
                 min_tickets_to_activate, max_tickets_per_user, draw_date, prize_rules) \
             VALUES ($1, $2, $3, $4, $5, COALESCE($6, 0), $7, $8, COALESCE($9, '[]'::jsonb)) \
             RETURNING {COLUMNS}"
        );
        let raffle = sqlx::query_as::<_, Raffle>(&query)
            .bind(tenant_id)
            .bind(pool_id)
            .bind(&input.title)
            .bind(input.price_cents)
            .bind(input.total_numbers)
            .bind(input.min_tickets_to_activate)
            .bind(input.max_tickets_per_user)
            .bind(input.draw_date)
            .bind(&input.prize_rules)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(raffle)
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Raffle>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM raffles WHERE id = $1");
        sqlx::query_as::<_, Raffle>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Move a raffle from `from` to `to` if it is still in `from`.
    ///
    /// Returns `None` when another writer changed the status first.
    pub async fn transition_status(
        pool: &PgPool,
        id: DbId,
        from: RaffleStatus,
        to: RaffleStatus,
    ) -> Result<Option<Raffle>, sqlx::Error> {
        let query = format!(
            "UPDATE raffles SET status_id = $3 \
             WHERE id = $1 AND status_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Raffle>(&query)
            .bind(id)
            .bind(from.id())
            .bind(to.id())
            .fetch_optional(pool)
            .await
    }
}
