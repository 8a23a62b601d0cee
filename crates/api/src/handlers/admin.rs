//! Operator endpoints: alerts, intent review, manual transfers, number
//! pools and raffle status.
//!
//! Every query is scoped to the tenant in the operator's token. Rows of
//! another tenant are reported as not found.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use raffle_core::error::CoreError;
use raffle_core::pool;
use raffle_core::status::IntentStatus;
use raffle_core::types::{DbId, IntentId};
use raffle_db::models::number_pool::{CreateCustomPool, NumberPool, ResizePool};
use raffle_db::models::operator_alert::{AlertListQuery, OperatorAlert};
use raffle_db::models::payment_intent::{IntentListQuery, PaymentIntent};
use raffle_db::models::raffle::{Raffle, TransitionRaffle};
use raffle_db::repositories::{
    NumberPoolRepo, OperatorAlertRepo, PaymentIntentRepo, RaffleRepo,
};
use raffle_engine::Resolution;
use raffle_events::bus::names;
use raffle_events::PlatformEvent;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::middleware::rbac::{RequireAdmin, RequireOperator};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/alerts
pub async fn list_alerts(
    RequireOperator(user): RequireOperator,
    State(state): State<AppState>,
    Query(params): Query<AlertListQuery>,
) -> AppResult<Json<DataResponse<Vec<OperatorAlert>>>> {
    let alerts = OperatorAlertRepo::list(
        &state.pool,
        user.tenant_id,
        params.include_acknowledged.unwrap_or(false),
        params.limit,
        params.offset,
    )
    .await?;
    Ok(Json(DataResponse { data: alerts }))
}

/// POST /api/v1/admin/alerts/{id}/acknowledge
pub async fn acknowledge_alert(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<OperatorAlert>>> {
    let alert = OperatorAlertRepo::acknowledge(&state.pool, id, user.tenant_id, user.user_id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("OpenOperatorAlert", id)))?;
    tracing::info!(alert_id = id, user_id = user.user_id, kind = %alert.kind, "Alert acknowledged");
    Ok(Json(DataResponse { data: alert }))
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// GET /api/v1/admin/intents?status=completed_unallocated
pub async fn list_intents(
    RequireOperator(user): RequireOperator,
    State(state): State<AppState>,
    Query(params): Query<IntentListQuery>,
) -> AppResult<Json<DataResponse<Vec<PaymentIntent>>>> {
    let status = params
        .status
        .as_deref()
        .map(|name| {
            IntentStatus::from_name(name).ok_or_else(|| {
                AppError::Core(CoreError::Validation(format!(
                    "Unknown intent status '{name}'"
                )))
            })
        })
        .transpose()?;
    let intents = PaymentIntentRepo::list_by_tenant(
        &state.pool,
        user.tenant_id,
        status,
        params.limit,
        params.offset,
    )
    .await?;
    Ok(Json(DataResponse { data: intents }))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmTransferInput {
    pub bank_reference: String,
}

/// POST /api/v1/admin/intents/{id}/confirm-transfer
pub async fn confirm_transfer(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<IntentId>,
    Json(input): Json<ConfirmTransferInput>,
) -> AppResult<Json<DataResponse<Resolution>>> {
    match PaymentIntentRepo::find_by_id(&state.pool, id).await? {
        Some(intent) if intent.tenant_id == user.tenant_id => {}
        _ => return Err(AppError::Core(CoreError::not_found("PaymentIntent", id))),
    }
    let resolution = state
        .engine
        .reconciler
        .confirm_transfer(id, &input.bank_reference, user.user_id)
        .await?;
    Ok(Json(DataResponse { data: resolution }))
}

// ---------------------------------------------------------------------------
// Number pools
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/pools
pub async fn create_pool(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateCustomPool>,
) -> AppResult<(StatusCode, Json<DataResponse<NumberPool>>)> {
    if let Some(capacity) = input.capacity.filter(|c| *c < 1) {
        return Err(AppError::Core(CoreError::Validation(format!(
            "Capacity must be at least 1, got {capacity}"
        ))));
    }
    let created = NumberPoolRepo::create_custom(&state.pool, user.tenant_id, input.capacity).await?;
    tracing::info!(pool_id = created.id, capacity = ?created.capacity, "Custom number pool created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// PUT /api/v1/admin/pools/{id}/capacity
pub async fn resize_pool(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<ResizePool>,
) -> AppResult<Json<DataResponse<NumberPool>>> {
    let current = NumberPoolRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|p| p.tenant_id == user.tenant_id)
        .ok_or_else(|| AppError::Core(CoreError::not_found("NumberPool", id)))?;
    let kind = current
        .pool_kind()
        .map_err(|e| AppError::Core(CoreError::Internal(e)))?;
    pool::validate_resize(kind, current.numbers_issued, input.capacity)
        .map_err(|e| AppError::Core(CoreError::Validation(e)))?;

    let resized = NumberPoolRepo::update_capacity(&state.pool, id, input.capacity)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict(format!(
                "Capacity {} is below the numbers issued since the pool was read",
                input.capacity
            )))
        })?;

    state.event_bus.publish(
        PlatformEvent::new(names::POOL_RESIZED)
            .with_source("number_pool", id)
            .with_actor(user.user_id)
            .with_payload(serde_json::json!({
                "old_capacity": current.capacity,
                "new_capacity": resized.capacity,
                "numbers_issued": resized.numbers_issued,
            })),
    );
    Ok(Json(DataResponse { data: resized }))
}

// ---------------------------------------------------------------------------
// Raffles
// ---------------------------------------------------------------------------

/// POST /api/v1/admin/raffles/{id}/status
pub async fn transition_raffle(
    RequireAdmin(user): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<TransitionRaffle>,
) -> AppResult<Json<DataResponse<Raffle>>> {
    let raffle = RaffleRepo::find_by_id(&state.pool, id)
        .await?
        .filter(|r| r.tenant_id == user.tenant_id)
        .ok_or_else(|| AppError::Core(CoreError::not_found("Raffle", id)))?;
    let from = raffle
        .status()
        .ok_or_else(|| AppError::Core(CoreError::Internal(format!(
            "Raffle {id} has unknown status id {}",
            raffle.status_id
        ))))?;
    from.validate_transition(input.status)
        .map_err(|e| AppError::Core(CoreError::Conflict(e.to_string())))?;

    let updated = RaffleRepo::transition_status(&state.pool, id, from, input.status)
        .await?
        .ok_or_else(|| {
            AppError::Core(CoreError::Conflict(
                "Raffle status changed concurrently; reload and retry".into(),
            ))
        })?;

    tracing::info!(
        raffle_id = id,
        from = from.name(),
        to = input.status.name(),
        user_id = user.user_id,
        "Raffle status changed"
    );
    state.event_bus.publish(
        PlatformEvent::new(names::RAFFLE_STATUS_CHANGED)
            .with_source("raffle", id)
            .with_actor(user.user_id)
            .with_payload(serde_json::json!({
                "from": from.name(),
                "to": input.status.name(),
            })),
    );
    Ok(Json(DataResponse { data: updated }))
}
