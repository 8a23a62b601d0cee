//! Provider webhook receivers.
//!
//! Webhook bodies are hints. Each one that names an intent of ours is
//! re-verified with the provider before anything is resolved, so a forged
//! or replayed body can at most trigger a lookup.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use raffle_core::provider::PaymentProvider;
use raffle_core::signature::{self, DEFAULT_TOLERANCE_SECS};
use raffle_core::types::IntentId;
use raffle_engine::Verification;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

/// Acknowledgement returned to the provider.
#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub intent_id: Option<IntentId>,
    /// Intent status after handling, `None` when the event was ignored.
    pub status: Option<&'static str>,
}

/// POST /api/v1/webhooks/stripe
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<DataResponse<WebhookAck>>> {
    let secret = state
        .stripe_webhook_secret
        .as_deref()
        .ok_or(AppError::NotConfigured("Stripe webhook secret"))?;
    let header = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing Stripe-Signature header".into()))?;
    signature::verify(
        secret,
        header,
        &body,
        chrono::Utc::now().timestamp(),
        DEFAULT_TOLERANCE_SECS,
    )?;

    handle(&state, PaymentProvider::Stripe, &body).await
}

/// POST /api/v1/webhooks/paypal
pub async fn paypal(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<DataResponse<WebhookAck>>> {
    handle(&state, PaymentProvider::Paypal, &body).await
}

async fn handle(
    state: &AppState,
    provider: PaymentProvider,
    body: &[u8],
) -> AppResult<Json<DataResponse<WebhookAck>>> {
    let event: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook body: {e}")))?;

    let verification = state
        .engine
        .reconciler
        .handle_provider_event(provider, &event)
        .await?;

    let ack = match verification {
        None => WebhookAck {
            received: true,
            intent_id: None,
            status: None,
        },
        Some(Verification::Resolved(resolution)) => WebhookAck {
            received: true,
            intent_id: Some(resolution.intent.id),
            status: resolution.intent.status().map(|s| s.name()),
        },
        Some(Verification::StillPending(intent)) | Some(Verification::Underpaid { intent, .. }) => {
            WebhookAck {
                received: true,
                intent_id: Some(intent.id),
                status: intent.status().map(|s| s.name()),
            }
        }
    };
    Ok(Json(DataResponse { data: ack }))
}
