//! Provider-agnostic gateway trait.

use async_trait::async_trait;
use raffle_core::provider::PaymentProvider;
use raffle_core::types::IntentId;

/// What the provider says about a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderStatus {
    /// Funds were captured. `amount_cents` is `None` when the provider does
    /// not report the amount.
    Captured {
        reference: String,
        amount_cents: Option<i64>,
    },
    /// Not settled yet, or the provider has no record of it.
    Pending,
    /// Declined, cancelled or expired at the provider.
    Declined { reason: String },
}

/// Identifies the transaction to look up.
#[derive(Debug, Clone, Copy)]
pub struct LookupRequest<'a> {
    pub intent_id: IntentId,
    /// Provider-side reference when one is known (redirect parameter,
    /// webhook payload, stored on the intent).
    pub reference: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Provider '{0}' is not configured")]
    NotConfigured(PaymentProvider),

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// The provider answered with a body we could not interpret.
    #[error("Unexpected provider response: {0}")]
    Decode(String),

    /// The provider object is tagged with another intent, or not at all.
    #[error("Provider reference '{reference}' does not belong to intent {intent_id}")]
    ReferenceMismatch {
        reference: String,
        intent_id: IntentId,
    },
}

/// Server-side verification against one payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;

    /// Ask the provider for the current state of a transaction.
    async fn lookup(&self, request: LookupRequest<'_>) -> Result<ProviderStatus, GatewayError>;
}

/// Turn a non-2xx response into [`GatewayError::Api`].
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(GatewayError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body.
pub(crate) async fn parse_json(
    response: reqwest::Response,
) -> Result<serde_json::Value, GatewayError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<serde_json::Value>().await?)
}

/// Check that the provider object behind `reference` was created for
/// `intent_id`. `bound_to` is the intent id the provider echoes back
/// (client reference, custom id, client transaction id).
pub(crate) fn ensure_bound(
    reference: &str,
    bound_to: Option<&str>,
    intent_id: IntentId,
) -> Result<(), GatewayError> {
    let bound = bound_to.and_then(|value| value.trim().parse::<IntentId>().ok());
    if bound == Some(intent_id) {
        return Ok(());
    }
    tracing::warn!(
        reference,
        %intent_id,
        bound_to = bound_to.unwrap_or(""),
        "Provider object is bound to a different intent"
    );
    Err(GatewayError::ReferenceMismatch {
        reference: reference.to_string(),
        intent_id,
    })
}
