//! Repository for the `provider_transactions` table.

use raffle_core::types::DbId;
use sqlx::PgPool;

use crate::models::provider_transaction::{
    ProviderTransaction, UpsertProviderTransaction, TX_PENDING,
};

/// Column list for `provider_transactions` queries.
const COLUMNS: &str = "\
    id, payment_intent_id, provider, provider_reference, status, amount_cents, \
    raw_payload, reconciled_at, created_at, updated_at";

pub struct ProviderTransactionRepo;

impl ProviderTransactionRepo {
    /// Insert or update the row for `(payment_intent_id, provider)`.
    ///
    /// A status change to a terminal value fires the change-feed trigger.
    pub async fn upsert(
        pool: &PgPool,
        input: &UpsertProviderTransaction,
    ) -> Result<ProviderTransaction, sqlx::Error> {
        let query = format!(
            "INSERT INTO provider_transactions \
                (payment_intent_id, provider, provider_reference, status, amount_cents, raw_payload) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (payment_intent_id, provider) DO UPDATE SET \
                provider_reference = COALESCE(EXCLUDED.provider_reference, provider_transactions.provider_reference), \
                status = EXCLUDED.status, \
                amount_cents = COALESCE(EXCLUDED.amount_cents, provider_transactions.amount_cents), \
                raw_payload = COALESCE(EXCLUDED.raw_payload, provider_transactions.raw_payload) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ProviderTransaction>(&query)
            .bind(input.payment_intent_id)
            .bind(&input.provider)
            .bind(&input.provider_reference)
            .bind(&input.status)
            .bind(input.amount_cents)
            .bind(&input.raw_payload)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ProviderTransaction>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM provider_transactions WHERE id = $1");
        sqlx::query_as::<_, ProviderTransaction>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Terminal rows not yet reconciled, oldest change first. Used to catch
    /// up on notifications emitted while no listener was connected.
    pub async fn list_unreconciled(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<ProviderTransaction>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM provider_transactions \
             WHERE reconciled_at IS NULL AND status <> $1 \
             ORDER BY updated_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ProviderTransaction>(&query)
            .bind(TX_PENDING)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Stamp a row as reconciled. Returns `false` if it already was.
    pub async fn mark_reconciled(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE provider_transactions SET reconciled_at = NOW() \
             WHERE id = $1 AND reconciled_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
