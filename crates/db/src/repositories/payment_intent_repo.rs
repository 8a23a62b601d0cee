//! Repository for the `payment_intents` table.
//!
//! Every resolution is a compare-and-swap on `status_id`, so exactly one
//! writer moves an intent out of `pending` no matter how many ingress paths
//! race. A `None` return means the guard did not match and the caller
//! should re-read the row.

use raffle_core::provider::PaymentProvider;
use raffle_core::types::{DbId, IntentId, Timestamp};
use sqlx::PgPool;

use crate::models::operator_alert::{NewOperatorAlert, OperatorAlert};
use crate::models::payment_intent::{NewPaymentIntent, PaymentIntent};
use crate::models::status::IntentStatus;
use crate::repositories::OperatorAlertRepo;

/// Column list for `payment_intents` queries.
const COLUMNS: &str = "\
    id, tenant_id, participant_id, raffle_id, provider, requested_quantity, \
    amount_cents, status_id, provider_reference, failure_reason, assignment_id, \
    resolved_at, created_at, updated_at";

/// Maximum page size for intent listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for intent listing.
const DEFAULT_LIMIT: i64 = 50;

/// One completed intent per `(provider, provider_reference)`.
pub const UQ_PROVIDER_REFERENCE: &str = "uq_payment_intents_provider_reference";

pub struct PaymentIntentRepo;

impl PaymentIntentRepo {
    /// Insert a pending intent keyed by the client idempotency key.
    ///
    /// Returns the stored row and whether this call created it. A repeated
    /// key returns the existing row untouched.
    pub async fn create_idempotent(
        pool: &PgPool,
        input: &NewPaymentIntent,
    ) -> Result<(PaymentIntent, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO payment_intents \
                (id, tenant_id, participant_id, raffle_id, provider, \
                 requested_quantity, amount_cents, status_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (id) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(input.id)
            .bind(input.tenant_id)
            .bind(input.participant_id)
            .bind(input.raffle_id)
            .bind(input.provider.as_str())
            .bind(input.requested_quantity)
            .bind(input.amount_cents)
            .bind(IntentStatus::Pending.id())
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(intent) => Ok((intent, true)),
            None => {
                let existing = Self::find_by_id(pool, input.id)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, false))
            }
        }
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: IntentId,
    ) -> Result<Option<PaymentIntent>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM payment_intents WHERE id = $1");
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// `pending -> completed`, recording the provider reference.
    ///
    /// Fails with a unique violation on [`UQ_PROVIDER_REFERENCE`] when the
    /// reference already completed another intent.
    pub async fn mark_completed(
        pool: &PgPool,
        id: IntentId,
        provider_reference: &str,
    ) -> Result<Option<PaymentIntent>, sqlx::Error> {
        let query = format!(
            "UPDATE payment_intents \
             SET status_id = $2, provider_reference = $3, resolved_at = NOW() \
             WHERE id = $1 AND status_id = $4 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(id)
            .bind(IntentStatus::Completed.id())
            .bind(provider_reference)
            .bind(IntentStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// `pending -> failed` or `pending -> expired`.
    pub async fn mark_unsuccessful(
        pool: &PgPool,
        id: IntentId,
        status: IntentStatus,
        provider_reference: Option<&str>,
        reason: Option<&str>,
    ) -> Result<Option<PaymentIntent>, sqlx::Error> {
        debug_assert!(matches!(status, IntentStatus::Failed | IntentStatus::Expired));
        let query = format!(
            "UPDATE payment_intents \
             SET status_id = $2, \
                 provider_reference = COALESCE($3, provider_reference), \
                 failure_reason = $4, resolved_at = NOW() \
             WHERE id = $1 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(id)
            .bind(status.id())
            .bind(provider_reference)
            .bind(reason)
            .bind(IntentStatus::Pending.id())
            .fetch_optional(pool)
            .await
    }

    /// `completed -> completed_unallocated`, only while no assignment exists.
    ///
    /// The operator alert is inserted in the same transaction: the intent is
    /// never parked without its alert. Returns `None`, writing nothing, when
    /// the guard does not match.
    pub async fn mark_unallocated(
        pool: &PgPool,
        id: IntentId,
        reason: &str,
        alert: &NewOperatorAlert,
    ) -> Result<Option<(PaymentIntent, OperatorAlert)>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let query = format!(
            "UPDATE payment_intents \
             SET status_id = $2, failure_reason = $3 \
             WHERE id = $1 AND status_id = $4 AND assignment_id IS NULL \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(id)
            .bind(IntentStatus::CompletedUnallocated.id())
            .bind(reason)
            .bind(IntentStatus::Completed.id())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(intent) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        let alert = OperatorAlertRepo::create_in_tx(&mut tx, alert).await?;
        tx.commit().await?;
        Ok(Some((intent, alert)))
    }

    /// `pending -> completed_unallocated` for a capture that cannot be
    /// honoured, such as an underpayment. Records the provider reference and
    /// inserts the operator alert in the same transaction.
    pub async fn park_capture(
        pool: &PgPool,
        id: IntentId,
        provider_reference: &str,
        reason: &str,
        alert: &NewOperatorAlert,
    ) -> Result<Option<(PaymentIntent, OperatorAlert)>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let query = format!(
            "UPDATE payment_intents \
             SET status_id = $2, provider_reference = $3, failure_reason = $4, \
                 resolved_at = NOW() \
             WHERE id = $1 AND status_id = $5 \
             RETURNING {COLUMNS}"
        );
        let updated = sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(id)
            .bind(IntentStatus::CompletedUnallocated.id())
            .bind(provider_reference)
            .bind(reason)
            .bind(IntentStatus::Pending.id())
            .fetch_optional(&mut *tx)
            .await?;
        let Some(intent) = updated else {
            tx.rollback().await?;
            return Ok(None);
        };

        let alert = OperatorAlertRepo::create_in_tx(&mut tx, alert).await?;
        tx.commit().await?;
        Ok(Some((intent, alert)))
    }

    /// Pending intents for `provider` created before `created_before`,
    /// oldest first.
    pub async fn list_stale_pending(
        pool: &PgPool,
        provider: PaymentProvider,
        created_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<PaymentIntent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM payment_intents \
             WHERE status_id = $1 AND provider = $2 AND created_at < $3 \
             ORDER BY created_at ASC \
             LIMIT $4"
        );
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(IntentStatus::Pending.id())
            .bind(provider.as_str())
            .bind(created_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Completed intents still lacking an assignment, resolved before
    /// `resolved_before`.
    pub async fn list_completed_unassigned(
        pool: &PgPool,
        resolved_before: Timestamp,
        limit: i64,
    ) -> Result<Vec<PaymentIntent>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM payment_intents \
             WHERE status_id = $1 AND assignment_id IS NULL AND resolved_at < $2 \
             ORDER BY resolved_at ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(IntentStatus::Completed.id())
            .bind(resolved_before)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// List a tenant's intents, optionally filtered by status, newest first.
    pub async fn list_by_tenant(
        pool: &PgPool,
        tenant_id: DbId,
        status: Option<IntentStatus>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<PaymentIntent>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        let query = format!(
            "SELECT {COLUMNS} FROM payment_intents \
             WHERE tenant_id = $1 AND ($2::SMALLINT IS NULL OR status_id = $2) \
             ORDER BY created_at DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, PaymentIntent>(&query)
            .bind(tenant_id)
            .bind(status.map(IntentStatus::id))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }
}
