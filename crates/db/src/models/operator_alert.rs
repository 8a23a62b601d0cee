//! Operator alert entity model and DTOs.

use raffle_core::alert::AlertSeverity;
use raffle_core::types::{DbId, IntentId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `operator_alerts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct OperatorAlert {
    pub id: DbId,
    pub tenant_id: DbId,
    pub payment_intent_id: Option<IntentId>,
    pub kind: String,
    pub severity: String,
    pub message: String,
    pub details: serde_json::Value,
    pub acknowledged_at: Option<Timestamp>,
    pub acknowledged_by: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a new alert.
#[derive(Debug, Clone)]
pub struct NewOperatorAlert {
    pub tenant_id: DbId,
    pub payment_intent_id: Option<IntentId>,
    pub kind: String,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: serde_json::Value,
}

/// Query parameters for `GET /api/v1/admin/alerts`.
#[derive(Debug, Deserialize)]
pub struct AlertListQuery {
    /// Include acknowledged alerts. Defaults to `false`.
    pub include_acknowledged: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
