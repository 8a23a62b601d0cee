//! Stripe gateway.
//!
//! With a checkout session id the session is fetched directly. Without one
//! the payment intent search API is queried for the `intent_id` metadata the
//! checkout attaches when it creates the session.

use async_trait::async_trait;
use raffle_core::provider::PaymentProvider;
use raffle_core::types::IntentId;
use serde_json::Value;

use crate::gateway::{
    ensure_bound, parse_json, GatewayError, LookupRequest, PaymentGateway, ProviderStatus,
};

pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(client: reqwest::Client, api_base: String, secret_key: String) -> Self {
        Self {
            client,
            api_base,
            secret_key,
        }
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn search_by_intent(&self, intent_id: &str) -> Result<Value, GatewayError> {
        let query = format!("metadata['intent_id']:'{intent_id}'");
        let response = self
            .client
            .get(format!("{}/v1/payment_intents/search", self.api_base))
            .bearer_auth(&self.secret_key)
            .query(&[("query", query.as_str())])
            .send()
            .await?;
        parse_json(response).await
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    async fn lookup(&self, request: LookupRequest<'_>) -> Result<ProviderStatus, GatewayError> {
        match request.reference {
            Some(session_id) => {
                let session = self.fetch_session(session_id).await?;
                parse_session(&session, request.intent_id)
            }
            None => {
                let results = self.search_by_intent(&request.intent_id.to_string()).await?;
                parse_search(&results)
            }
        }
    }
}

/// Interpret a `checkout.session` object created for `intent_id`.
pub fn parse_session(session: &Value, intent_id: IntentId) -> Result<ProviderStatus, GatewayError> {
    let id = session["id"]
        .as_str()
        .ok_or_else(|| GatewayError::Decode("checkout session without id".into()))?;
    ensure_bound(id, session_intent(session), intent_id)?;
    let payment_status = session["payment_status"].as_str().unwrap_or_default();
    let status = session["status"].as_str().unwrap_or_default();

    Ok(match (status, payment_status) {
        (_, "paid") => ProviderStatus::Captured {
            reference: id.to_string(),
            amount_cents: session["amount_total"].as_i64(),
        },
        ("expired", _) => ProviderStatus::Declined {
            reason: "Checkout session expired".into(),
        },
        _ => ProviderStatus::Pending,
    })
}

/// Our intent id as tagged on a checkout session.
fn session_intent(session: &Value) -> Option<&str> {
    session["client_reference_id"]
        .as_str()
        .or_else(|| session["metadata"]["intent_id"].as_str())
}

/// Interpret a payment intent search result. Any succeeded payment wins;
/// otherwise a cancelled one declines.
pub fn parse_search(results: &Value) -> Result<ProviderStatus, GatewayError> {
    let data = results["data"]
        .as_array()
        .ok_or_else(|| GatewayError::Decode("search result without data".into()))?;

    if let Some(paid) = data
        .iter()
        .find(|pi| pi["status"].as_str() == Some("succeeded"))
    {
        let reference = paid["id"]
            .as_str()
            .ok_or_else(|| GatewayError::Decode("payment intent without id".into()))?;
        return Ok(ProviderStatus::Captured {
            reference: reference.to_string(),
            amount_cents: paid["amount_received"].as_i64(),
        });
    }
    if !data.is_empty()
        && data
            .iter()
            .all(|pi| pi["status"].as_str() == Some("canceled"))
    {
        let reason = data[0]["cancellation_reason"]
            .as_str()
            .unwrap_or("canceled")
            .to_string();
        return Ok(ProviderStatus::Declined { reason });
    }
    Ok(ProviderStatus::Pending)
}

/// Pull the session id and our intent id from a webhook event body
/// (`checkout.session.*`). Returns `None` for events that carry no
/// checkout session.
pub fn session_from_event(event: &Value) -> Option<(String, Option<String>)> {
    let object = &event["data"]["object"];
    if object["object"].as_str() != Some("checkout.session") {
        return None;
    }
    let session_id = object["id"].as_str()?.to_string();
    Some((session_id, session_intent(object).map(str::to_string)))
}
