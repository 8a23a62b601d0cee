use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use raffle_core::error::CoreError;
use raffle_core::signature::SignatureError;
use raffle_engine::checkout::CheckoutError;
use raffle_engine::{ReconcileError, TrackerError};
use raffle_payments::GatewayError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] and the engine's error enums and adds HTTP-specific
/// variants. Implements [`IntoResponse`] to produce consistent
/// `{ "error", "code" }` JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("Invalid webhook signature: {0}")]
    Signature(#[from] SignatureError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A feature whose credentials are not configured on this deployment.
    #[error("Not configured: {0}")]
    NotConfigured(&'static str),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

type Classified = (StatusCode, &'static str, String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => classify_core(core),
            AppError::Checkout(err) => classify_checkout(err),
            AppError::Tracker(err) => classify_tracker(err),
            AppError::Reconcile(err) => classify_reconcile(err),
            AppError::Signature(err) => {
                tracing::warn!(error = %err, "Rejected webhook signature");
                (
                    StatusCode::BAD_REQUEST,
                    "INVALID_SIGNATURE",
                    err.to_string(),
                )
            }
            AppError::Database(err) => classify_sqlx_error(err),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::NotConfigured(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "NOT_CONFIGURED",
                format!("{what} is not configured"),
            ),
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

fn internal() -> Classified {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}

fn classify_core(core: &CoreError) -> Classified {
    match core {
        CoreError::NotFound { entity, id } => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
        ),
        CoreError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
        CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
        CoreError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
        CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
        CoreError::Internal(msg) => {
            tracing::error!(error = %msg, "Internal core error");
            internal()
        }
    }
}

fn classify_checkout(err: &CheckoutError) -> Classified {
    let message = err.to_string();
    match err {
        CheckoutError::RaffleNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", message),
        CheckoutError::RaffleNotActive { .. } => {
            (StatusCode::CONFLICT, "RAFFLE_NOT_ACTIVE", message)
        }
        CheckoutError::InvalidQuantity(_) | CheckoutError::AmountOverflow => {
            (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
        }
        CheckoutError::ProviderNotConfigured(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "PROVIDER_UNAVAILABLE",
            message,
        ),
        CheckoutError::QuotaExceeded(_) => (StatusCode::CONFLICT, "QUOTA_EXCEEDED", message),
        CheckoutError::PoolExhausted { .. } => (StatusCode::CONFLICT, "POOL_EXHAUSTED", message),
        CheckoutError::KeyReused(_) => (StatusCode::CONFLICT, "CONFLICT", message),
        CheckoutError::Database(db) => classify_sqlx_error(db),
    }
}

fn classify_tracker(err: &TrackerError) -> Classified {
    match err {
        TrackerError::IntentNotFound(id) => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("PaymentIntent with id {id} not found"),
        ),
        TrackerError::MissingProviderReference(_) => (
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            err.to_string(),
        ),
        // Paid and recorded; the sweep finishes allocation.
        TrackerError::PoolContention { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            "POOL_CONTENTION",
            "Payment recorded; number assignment is still in progress".to_string(),
        ),
        TrackerError::ReferenceAlreadyUsed { .. } => (
            StatusCode::CONFLICT,
            "REFERENCE_ALREADY_USED",
            err.to_string(),
        ),
        TrackerError::Transition(e) => (StatusCode::CONFLICT, "CONFLICT", e.to_string()),
        TrackerError::Allocation(e) => {
            tracing::error!(error = %e, "Allocation error surfaced to HTTP");
            internal()
        }
        TrackerError::Database(db) => classify_sqlx_error(db),
    }
}

fn classify_reconcile(err: &ReconcileError) -> Classified {
    match err {
        ReconcileError::Tracker(inner) => classify_tracker(inner),
        ReconcileError::Gateway(GatewayError::NotConfigured(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            "PROVIDER_UNAVAILABLE",
            err.to_string(),
        ),
        ReconcileError::Gateway(GatewayError::ReferenceMismatch { .. }) => {
            tracing::warn!(error = %err, "Provider reference does not belong to the intent");
            (StatusCode::CONFLICT, "REFERENCE_MISMATCH", err.to_string())
        }
        ReconcileError::Gateway(e) => {
            tracing::warn!(error = %e, "Provider verification failed");
            (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_UNAVAILABLE",
                "The payment provider could not be reached".to_string(),
            )
        }
        ReconcileError::WrongProvider { .. } => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        ReconcileError::Database(db) => classify_sqlx_error(db),
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map to 409.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> Classified {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            internal()
        }
        other => {
            tracing::error!(error = %other, "Database error");
            internal()
        }
    }
}

#[cfg(test)]
mod tests {
    use raffle_core::provider::PaymentProvider;
    use raffle_core::quota::QuotaExceeded;

    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn checkout_rejections_map_to_client_errors() {
        assert_eq!(
            status_of(CheckoutError::InvalidQuantity(0).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(CheckoutError::RaffleNotFound(9).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                CheckoutError::QuotaExceeded(QuotaExceeded {
                    held: 5,
                    requested: 3,
                    limit: 5,
                })
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(CheckoutError::ProviderNotConfigured(PaymentProvider::Paypal).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn contention_is_retryable() {
        let err = TrackerError::PoolContention {
            intent_id: uuid::Uuid::new_v4(),
            attempts: 5,
        };
        assert_eq!(
            status_of(ReconcileError::Tracker(err).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn gateway_failures_hide_details() {
        let err = ReconcileError::Gateway(GatewayError::Api {
            status: 500,
            body: "secret internals".into(),
        });
        assert_eq!(status_of(err.into()), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn replayed_references_conflict() {
        let intent_id = uuid::Uuid::new_v4();
        let mismatch = ReconcileError::Gateway(GatewayError::ReferenceMismatch {
            reference: "cs_other".into(),
            intent_id,
        });
        assert_eq!(status_of(mismatch.into()), StatusCode::CONFLICT);

        let reused = TrackerError::ReferenceAlreadyUsed {
            intent_id,
            reference: "cs_other".into(),
        };
        assert_eq!(status_of(reused.into()), StatusCode::CONFLICT);
    }

    #[test]
    fn bad_signature_is_bad_request() {
        assert_eq!(
            status_of(SignatureError::Mismatch.into()),
            StatusCode::BAD_REQUEST
        );
    }
}
