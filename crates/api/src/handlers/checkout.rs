//! Handlers for buyer-facing checkout: intent creation, the result-page
//! read model, provider redirect returns and ticket listings.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use raffle_core::error::CoreError;
use raffle_core::types::{DbId, IntentId};
use raffle_db::models::assignment::Assignment;
use raffle_db::models::payment_intent::PaymentIntent;
use raffle_db::repositories::AssignmentRepo;
use raffle_engine::checkout::{self, CheckoutRequest, IntentSnapshot};
use raffle_engine::{Ingress, Verification};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/checkout/intents
///
/// Returns 201 when the intent was created, 200 when the same key was
/// already used with identical parameters.
pub async fn create_intent(
    State(state): State<AppState>,
    Json(input): Json<CheckoutRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<PaymentIntent>>)> {
    let (intent, created) = checkout::create_intent(
        &state.pool,
        &state.event_bus,
        state.engine.reconciler.gateways(),
        &input,
    )
    .await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(DataResponse { data: intent })))
}

/// GET /api/v1/checkout/intents/{id}
pub async fn get_intent(
    State(state): State<AppState>,
    Path(id): Path<IntentId>,
) -> AppResult<Json<DataResponse<IntentSnapshot>>> {
    let snapshot = snapshot_or_404(&state, id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// What the provider reported on the redirect back to the result page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnResult {
    Success,
    Cancel,
}

#[derive(Debug, Deserialize)]
pub struct ReturnInput {
    pub provider_reference: Option<String>,
    pub result: ReturnResult,
}

/// POST /api/v1/checkout/intents/{id}/return
///
/// The redirect is only a hint: the provider is asked directly either way
/// and the fresh snapshot is returned.
pub async fn provider_return(
    State(state): State<AppState>,
    Path(id): Path<IntentId>,
    Json(input): Json<ReturnInput>,
) -> AppResult<Json<DataResponse<IntentSnapshot>>> {
    tracing::debug!(intent_id = %id, result = ?input.result, "Provider redirect received");

    let verification = state
        .engine
        .reconciler
        .verify_and_resolve(id, input.provider_reference.as_deref(), Ingress::Redirect)
        .await?;
    if let Verification::StillPending(_) = verification {
        if input.result == ReturnResult::Success {
            tracing::info!(intent_id = %id, "Redirect claims success but provider has not settled");
        }
    }

    let snapshot = snapshot_or_404(&state, id).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// GET /api/v1/raffles/{raffle_id}/participants/{participant_id}/assignments
pub async fn list_participant_assignments(
    State(state): State<AppState>,
    Path((raffle_id, participant_id)): Path<(DbId, DbId)>,
) -> AppResult<Json<DataResponse<Vec<Assignment>>>> {
    let assignments =
        AssignmentRepo::list_for_participant(&state.pool, raffle_id, participant_id).await?;
    Ok(Json(DataResponse { data: assignments }))
}

async fn snapshot_or_404(state: &AppState, id: IntentId) -> AppResult<IntentSnapshot> {
    checkout::load_snapshot(&state.pool, id)
        .await?
        .ok_or_else(|| AppError::Core(CoreError::not_found("PaymentIntent", id)))
}
