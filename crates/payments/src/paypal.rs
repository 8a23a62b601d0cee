//! PayPal Orders v2 gateway.
//!
//! An `APPROVED` order has been authorised by the buyer but not captured;
//! the gateway captures it before reporting success. Orders cannot be
//! looked up by our intent id, so a lookup without a reference stays
//! pending.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use raffle_core::money::parse_decimal_cents;
use raffle_core::provider::PaymentProvider;
use raffle_core::types::IntentId;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::gateway::{
    ensure_bound, parse_json, GatewayError, LookupRequest, PaymentGateway, ProviderStatus,
};

/// Refresh the OAuth token this long before PayPal says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PaypalGateway {
    client: reqwest::Client,
    api_base: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl PaypalGateway {
    pub fn new(
        client: reqwest::Client,
        api_base: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            client,
            api_base,
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.api_base))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let body = parse_json(response).await?;
        let token: TokenResponse =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn get_order(&self, order_id: &str) -> Result<Value, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/v2/checkout/orders/{}", self.api_base, order_id))
            .bearer_auth(token)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn capture_order(&self, order_id: &str) -> Result<Value, GatewayError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.api_base, order_id
            ))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .header("PayPal-Request-Id", format!("capture-{order_id}"))
            .body("{}")
            .send()
            .await?;
        parse_json(response).await
    }
}

#[async_trait]
impl PaymentGateway for PaypalGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Paypal
    }

    async fn lookup(&self, request: LookupRequest<'_>) -> Result<ProviderStatus, GatewayError> {
        let Some(order_id) = request.reference else {
            return Ok(ProviderStatus::Pending);
        };

        let order = self.get_order(order_id).await?;
        ensure_order_bound(&order, order_id, request.intent_id)?;
        if order["status"].as_str() == Some("APPROVED") {
            tracing::info!(order_id, intent_id = %request.intent_id, "Capturing approved PayPal order");
            let captured = self.capture_order(order_id).await?;
            return parse_order(&captured);
        }
        parse_order(&order)
    }
}

/// Reject an order whose purchase unit is tagged with another intent. Runs
/// before capture so a foreign order is never captured on our behalf.
pub fn ensure_order_bound(
    order: &Value,
    order_id: &str,
    intent_id: IntentId,
) -> Result<(), GatewayError> {
    ensure_bound(
        order_id,
        order["purchase_units"][0]["custom_id"].as_str(),
        intent_id,
    )
}

/// Interpret an order object (or a capture response, which has the same
/// shape).
pub fn parse_order(order: &Value) -> Result<ProviderStatus, GatewayError> {
    let id = order["id"]
        .as_str()
        .ok_or_else(|| GatewayError::Decode("order without id".into()))?;

    match order["status"].as_str().unwrap_or_default() {
        "COMPLETED" => Ok(ProviderStatus::Captured {
            reference: id.to_string(),
            amount_cents: captured_amount(order)?,
        }),
        "VOIDED" => Ok(ProviderStatus::Declined {
            reason: "Order voided".into(),
        }),
        _ => Ok(ProviderStatus::Pending),
    }
}

/// Amount of the first purchase unit, preferring the capture amount when
/// the response includes captures.
fn captured_amount(order: &Value) -> Result<Option<i64>, GatewayError> {
    let unit = &order["purchase_units"][0];
    let value = unit["payments"]["captures"][0]["amount"]["value"]
        .as_str()
        .or_else(|| unit["amount"]["value"].as_str());
    value
        .map(|v| parse_decimal_cents(v).map_err(GatewayError::Decode))
        .transpose()
}

/// Order id from a webhook event body (`CHECKOUT.ORDER.*` or
/// `PAYMENT.CAPTURE.*`), plus our intent id if the order carries it.
pub fn order_from_event(event: &Value) -> Option<(String, Option<String>)> {
    let resource = &event["resource"];
    let order_id = resource["supplementary_data"]["related_ids"]["order_id"]
        .as_str()
        .or_else(|| {
            event["event_type"]
                .as_str()
                .filter(|t| t.starts_with("CHECKOUT.ORDER."))
                .and(resource["id"].as_str())
        })?
        .to_string();
    let intent_id = resource["custom_id"]
        .as_str()
        .or_else(|| resource["purchase_units"][0]["custom_id"].as_str())
        .map(str::to_string);
    Some((order_id, intent_id))
}
