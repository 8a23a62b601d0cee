//! Repository for the `operator_alerts` table.

use raffle_core::types::{DbId, IntentId};
use sqlx::PgPool;

use crate::models::operator_alert::{NewOperatorAlert, OperatorAlert};

/// Column list for `operator_alerts` queries.
const COLUMNS: &str = "\
    id, tenant_id, payment_intent_id, kind, severity, message, details, \
    acknowledged_at, acknowledged_by, created_at, updated_at";

/// Maximum page size for alert listing.
const MAX_LIMIT: i64 = 200;

/// Default page size for alert listing.
const DEFAULT_LIMIT: i64 = 50;

pub struct OperatorAlertRepo;

impl OperatorAlertRepo {
    pub async fn create(
        pool: &PgPool,
        input: &NewOperatorAlert,
    ) -> Result<OperatorAlert, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let alert = Self::create_in_tx(&mut tx, input).await?;
        tx.commit().await?;
        Ok(alert)
    }

    /// Insert an alert within an existing transaction, so it commits or
    /// rolls back together with the state change it reports.
    pub async fn create_in_tx(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        input: &NewOperatorAlert,
    ) -> Result<OperatorAlert, sqlx::Error> {
        let query = format!(
            "INSERT INTO operator_alerts \
                (tenant_id, payment_intent_id, kind, severity, message, details) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperatorAlert>(&query)
            .bind(input.tenant_id)
            .bind(input.payment_intent_id)
            .bind(&input.kind)
            .bind(input.severity.as_str())
            .bind(&input.message)
            .bind(&input.details)
            .fetch_one(&mut **tx)
            .await
    }

    /// Open (unacknowledged) alert of `kind` for an intent, if any.
    pub async fn find_open_for_intent(
        pool: &PgPool,
        payment_intent_id: IntentId,
        kind: &str,
    ) -> Result<Option<OperatorAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM operator_alerts \
             WHERE payment_intent_id = $1 AND kind = $2 AND acknowledged_at IS NULL \
             ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, OperatorAlert>(&query)
            .bind(payment_intent_id)
            .bind(kind)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's alerts newest first.
    pub async fn list(
        pool: &PgPool,
        tenant_id: DbId,
        include_acknowledged: bool,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<OperatorAlert>, sqlx::Error> {
        let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = offset.unwrap_or(0).max(0);
        let query = format!(
            "SELECT {COLUMNS} FROM operator_alerts \
             WHERE tenant_id = $1 AND ($2 OR acknowledged_at IS NULL) \
             ORDER BY created_at DESC, id DESC \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, OperatorAlert>(&query)
            .bind(tenant_id)
            .bind(include_acknowledged)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Acknowledge an open alert. Returns `None` if the alert does not exist
    /// for this tenant or was already acknowledged.
    pub async fn acknowledge(
        pool: &PgPool,
        id: DbId,
        tenant_id: DbId,
        user_id: DbId,
    ) -> Result<Option<OperatorAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE operator_alerts \
             SET acknowledged_at = NOW(), acknowledged_by = $3 \
             WHERE id = $1 AND tenant_id = $2 AND acknowledged_at IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, OperatorAlert>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }
}
