//! Repository for the `prize_tags` and `prize_evaluations` tables.

use raffle_core::prize::PrizeHit;
use raffle_core::types::{DbId, TicketNumber};
use sqlx::PgPool;

use crate::models::prize::PrizeTag;

/// Column list for `prize_tags` queries.
const COLUMNS: &str = "id, assignment_id, raffle_id, number, tier, created_at";

pub struct PrizeTagRepo;

impl PrizeTagRepo {
    pub async fn list_for_assignment(
        pool: &PgPool,
        assignment_id: DbId,
    ) -> Result<Vec<PrizeTag>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM prize_tags WHERE assignment_id = $1 ORDER BY number"
        );
        sqlx::query_as::<_, PrizeTag>(&query)
            .bind(assignment_id)
            .fetch_all(pool)
            .await
    }

    /// Whether the tagger already ran for this assignment.
    pub async fn is_evaluated(pool: &PgPool, assignment_id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM prize_evaluations WHERE assignment_id = $1)",
        )
        .bind(assignment_id)
        .fetch_one(pool)
        .await
    }

    /// Record the tagging outcome for an assignment exactly once.
    ///
    /// Returns `None` if the assignment was already evaluated (nothing is
    /// written), otherwise the number of tags inserted. A number already
    /// tagged in the raffle keeps its existing tag.
    pub async fn record_evaluation(
        pool: &PgPool,
        assignment_id: DbId,
        raffle_id: DbId,
        hits: &[PrizeHit],
    ) -> Result<Option<i32>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let claimed: Option<DbId> = sqlx::query_scalar(
            "INSERT INTO prize_evaluations (assignment_id, tag_count) VALUES ($1, 0) \
             ON CONFLICT (assignment_id) DO NOTHING \
             RETURNING id",
        )
        .bind(assignment_id)
        .fetch_optional(&mut *tx)
        .await?;
        if claimed.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let numbers: Vec<TicketNumber> = hits.iter().map(|h| h.number).collect();
        let tiers: Vec<&str> = hits.iter().map(|h| h.tier.as_str()).collect();
        let inserted = sqlx::query(
            "INSERT INTO prize_tags (assignment_id, raffle_id, number, tier) \
             SELECT $1, $2, t.number, t.tier \
             FROM UNNEST($3::INTEGER[], $4::TEXT[]) AS t(number, tier) \
             ON CONFLICT (raffle_id, number) DO NOTHING",
        )
        .bind(assignment_id)
        .bind(raffle_id)
        .bind(&numbers)
        .bind(&tiers)
        .execute(&mut *tx)
        .await?
        .rows_affected() as i32;

        sqlx::query("UPDATE prize_evaluations SET tag_count = $2 WHERE assignment_id = $1")
            .bind(assignment_id)
            .bind(inserted)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(inserted))
    }
}
