//! Raising operator alerts.
//!
//! An alert is a durable `operator_alerts` row plus an `alert.<kind>` event
//! on the bus, which the alert dispatcher forwards to the alert webhook.
//! One open alert per intent and kind is kept; repeats are logged only.

use raffle_core::alert::severity_for;
use raffle_core::types::{DbId, IntentId};
use raffle_db::models::operator_alert::{NewOperatorAlert, OperatorAlert};
use raffle_db::repositories::OperatorAlertRepo;
use raffle_db::DbPool;
use raffle_events::bus::names;
use raffle_events::{EventBus, PlatformEvent};

/// Insert payload with the severity that belongs to `kind`.
pub fn new_alert(
    tenant_id: DbId,
    intent_id: Option<IntentId>,
    kind: &str,
    message: String,
    details: serde_json::Value,
) -> NewOperatorAlert {
    NewOperatorAlert {
        tenant_id,
        payment_intent_id: intent_id,
        kind: kind.to_string(),
        severity: severity_for(kind),
        message,
        details,
    }
}

pub async fn raise(
    pool: &DbPool,
    bus: &EventBus,
    tenant_id: DbId,
    intent_id: Option<IntentId>,
    kind: &str,
    message: String,
    details: serde_json::Value,
) -> Result<OperatorAlert, sqlx::Error> {
    if let Some(intent_id) = intent_id {
        if let Some(open) = OperatorAlertRepo::find_open_for_intent(pool, intent_id, kind).await? {
            tracing::debug!(alert_id = open.id, %intent_id, kind, "Alert already open");
            return Ok(open);
        }
    }

    let alert = OperatorAlertRepo::create(
        pool,
        &new_alert(tenant_id, intent_id, kind, message, details),
    )
    .await?;

    announce(bus, &alert);
    Ok(alert)
}

/// Log a freshly stored alert and publish its `alert.<kind>` event.
pub fn announce(bus: &EventBus, alert: &OperatorAlert) {
    tracing::warn!(
        alert_id = alert.id,
        tenant_id = alert.tenant_id,
        intent_id = ?alert.payment_intent_id,
        kind = %alert.kind,
        severity = %alert.severity,
        message = %alert.message,
        "Operator alert raised"
    );

    let mut event = PlatformEvent::new(format!("{}{}", names::ALERT_PREFIX, alert.kind))
        .with_payload(serde_json::json!({
            "alert_id": alert.id,
            "tenant_id": alert.tenant_id,
            "severity": alert.severity,
            "message": alert.message,
            "details": alert.details,
        }));
    if let Some(intent_id) = alert.payment_intent_id {
        event = event.for_intent(intent_id);
    }
    bus.publish(event);
}
