//! Repository for the `assignments` and `issued_numbers` tables.
//!
//! [`AssignmentRepo::commit`] is the only code path that issues numbers.

use raffle_core::types::{DbId, IntentId};
use sqlx::PgPool;

use crate::is_unique_violation;
use crate::models::assignment::{Assignment, CommitOutcome, NewAssignment};

/// Column list for `assignments` queries.
const COLUMNS: &str =
    "id, payment_intent_id, participant_id, raffle_id, pool_id, numbers, created_at";

const UQ_ISSUED_NUMBER: &str = "uq_issued_numbers_pool_number";

pub struct AssignmentRepo;

impl AssignmentRepo {
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Assignment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assignments WHERE id = $1");
        sqlx::query_as::<_, Assignment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_intent(
        pool: &PgPool,
        payment_intent_id: IntentId,
    ) -> Result<Option<Assignment>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM assignments WHERE payment_intent_id = $1");
        sqlx::query_as::<_, Assignment>(&query)
            .bind(payment_intent_id)
            .fetch_optional(pool)
            .await
    }

    /// A participant's assignments in a raffle, oldest first.
    pub async fn list_for_participant(
        pool: &PgPool,
        raffle_id: DbId,
        participant_id: DbId,
    ) -> Result<Vec<Assignment>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM assignments \
             WHERE raffle_id = $1 AND participant_id = $2 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Assignment>(&query)
            .bind(raffle_id)
            .bind(participant_id)
            .fetch_all(pool)
            .await
    }

    /// Total numbers a participant already holds in a raffle.
    pub async fn count_numbers_for_participant(
        pool: &PgPool,
        raffle_id: DbId,
        participant_id: DbId,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(SUM(cardinality(numbers)), 0)::BIGINT FROM assignments \
             WHERE raffle_id = $1 AND participant_id = $2",
        )
        .bind(raffle_id)
        .bind(participant_id)
        .fetch_one(pool)
        .await
    }

    /// Largest quantity among the raffle's assignments created before
    /// `assignment_id`.
    pub async fn largest_earlier_purchase(
        pool: &PgPool,
        raffle_id: DbId,
        assignment_id: DbId,
    ) -> Result<Option<i32>, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT MAX(cardinality(numbers)) FROM assignments \
             WHERE raffle_id = $1 AND id < $2",
        )
        .bind(raffle_id)
        .bind(assignment_id)
        .fetch_one(pool)
        .await
    }

    /// Persist a draw in one transaction: the assignment row, one
    /// `issued_numbers` row per number, the pool counter and version, and
    /// the intent's back-reference.
    ///
    /// Losing the `payment_intent_id` race yields
    /// [`CommitOutcome::AlreadyAssigned`] with the winner's row. A stale
    /// pool version or a number issued concurrently yields
    /// [`CommitOutcome::PoolConflict`]. In both cases nothing is written.
    pub async fn commit(
        pool: &PgPool,
        input: &NewAssignment,
    ) -> Result<CommitOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let insert = format!(
            "INSERT INTO assignments \
                (payment_intent_id, participant_id, raffle_id, pool_id, numbers) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (payment_intent_id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Assignment>(&insert)
            .bind(input.payment_intent_id)
            .bind(input.participant_id)
            .bind(input.raffle_id)
            .bind(input.pool_id)
            .bind(&input.numbers)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(assignment) = inserted else {
            tx.rollback().await?;
            let existing = Self::find_by_intent(pool, input.payment_intent_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound)?;
            return Ok(CommitOutcome::AlreadyAssigned(existing));
        };

        let bumped = sqlx::query(
            "UPDATE number_pools \
             SET numbers_issued = numbers_issued + $3, version = version + 1 \
             WHERE id = $1 AND version = $2",
        )
        .bind(input.pool_id)
        .bind(input.expected_pool_version)
        .bind(input.numbers.len() as i32)
        .execute(&mut *tx)
        .await?;
        if bumped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CommitOutcome::PoolConflict);
        }

        let issued = sqlx::query(
            "INSERT INTO issued_numbers (pool_id, number, assignment_id) \
             SELECT $1, n, $2 FROM UNNEST($3::INTEGER[]) AS n",
        )
        .bind(input.pool_id)
        .bind(assignment.id)
        .bind(&input.numbers)
        .execute(&mut *tx)
        .await;
        match issued {
            Ok(_) => {}
            Err(err) if is_unique_violation(&err, UQ_ISSUED_NUMBER) => {
                tx.rollback().await?;
                return Ok(CommitOutcome::PoolConflict);
            }
            Err(err) => return Err(err),
        }

        sqlx::query("UPDATE payment_intents SET assignment_id = $2 WHERE id = $1")
            .bind(input.payment_intent_id)
            .bind(assignment.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(CommitOutcome::Committed(assignment))
    }
}
