//! PayPhone button gateway.
//!
//! A transaction id from the redirect (or the provider-side transaction
//! row) is confirmed through `POST /api/button/V2/Confirm`. Without one the
//! sale is looked up by our client transaction id, which the checkout sets
//! to the intent id.

use async_trait::async_trait;
use raffle_core::provider::PaymentProvider;
use raffle_core::types::IntentId;
use serde_json::Value;

use crate::gateway::{
    ensure_bound, parse_json, GatewayError, LookupRequest, PaymentGateway, ProviderStatus,
};

/// `statusCode` values reported by PayPhone.
const STATUS_CANCELED: i64 = 2;
const STATUS_APPROVED: i64 = 3;

pub struct PayphoneGateway {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl PayphoneGateway {
    pub fn new(client: reqwest::Client, api_base: String, token: String) -> Self {
        Self {
            client,
            api_base,
            token,
        }
    }

    async fn confirm(&self, transaction_id: i64, client_tx_id: &str) -> Result<Value, GatewayError> {
        let body = serde_json::json!({
            "id": transaction_id,
            "clientTxId": client_tx_id,
        });
        let response = self
            .client
            .post(format!("{}/api/button/V2/Confirm", self.api_base))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        parse_json(response).await
    }

    async fn sales_for_client_tx(&self, client_tx_id: &str) -> Result<Value, GatewayError> {
        let response = self
            .client
            .get(format!("{}/api/Sale/client/{}", self.api_base, client_tx_id))
            .bearer_auth(&self.token)
            .send()
            .await?;
        // 404 means PayPhone never saw the transaction.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Value::Array(Vec::new()));
        }
        parse_json(response).await
    }
}

#[async_trait]
impl PaymentGateway for PayphoneGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Payphone
    }

    async fn lookup(&self, request: LookupRequest<'_>) -> Result<ProviderStatus, GatewayError> {
        let client_tx_id = request.intent_id.to_string();
        match request.reference {
            Some(reference) => {
                let transaction_id: i64 = reference.trim().parse().map_err(|_| {
                    GatewayError::Decode(format!("PayPhone transaction id '{reference}' is not numeric"))
                })?;
                let sale = self.confirm(transaction_id, &client_tx_id).await?;
                parse_confirmed(&sale, reference, request.intent_id)
            }
            None => {
                let sales = self.sales_for_client_tx(&client_tx_id).await?;
                parse_sales(&sales)
            }
        }
    }
}

/// Interpret a confirm response for `intent_id`. The sale must echo our
/// client transaction id.
pub fn parse_confirmed(
    sale: &Value,
    reference: &str,
    intent_id: IntentId,
) -> Result<ProviderStatus, GatewayError> {
    ensure_bound(reference, sale["clientTransactionId"].as_str(), intent_id)?;
    parse_sale(sale)
}

/// Interpret a single sale / confirm response.
pub fn parse_sale(sale: &Value) -> Result<ProviderStatus, GatewayError> {
    let status = sale["statusCode"]
        .as_i64()
        .ok_or_else(|| GatewayError::Decode("sale without statusCode".into()))?;
    match status {
        STATUS_APPROVED => {
            let reference = sale["transactionId"]
                .as_i64()
                .map(|id| id.to_string())
                .or_else(|| sale["transactionId"].as_str().map(str::to_string))
                .ok_or_else(|| GatewayError::Decode("approved sale without transactionId".into()))?;
            Ok(ProviderStatus::Captured {
                reference,
                // PayPhone reports amounts in cents.
                amount_cents: sale["amount"].as_i64(),
            })
        }
        STATUS_CANCELED => Ok(ProviderStatus::Declined {
            reason: sale["message"]
                .as_str()
                .unwrap_or("Canceled at PayPhone")
                .to_string(),
        }),
        _ => Ok(ProviderStatus::Pending),
    }
}

/// Interpret the list returned for a client transaction id.
pub fn parse_sales(sales: &Value) -> Result<ProviderStatus, GatewayError> {
    let list = sales
        .as_array()
        .ok_or_else(|| GatewayError::Decode("sales lookup did not return a list".into()))?;
    let mut outcome = ProviderStatus::Pending;
    for sale in list {
        match parse_sale(sale)? {
            captured @ ProviderStatus::Captured { .. } => return Ok(captured),
            declined @ ProviderStatus::Declined { .. } => outcome = declined,
            ProviderStatus::Pending => {}
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn approved_sale_is_captured_in_cents() {
        let sale = json!({
            "statusCode": 3,
            "transactionStatus": "Approved",
            "transactionId": 23178284,
            "amount": 1500
        });
        assert_eq!(
            parse_sale(&sale).unwrap(),
            ProviderStatus::Captured {
                reference: "23178284".into(),
                amount_cents: Some(1500)
            }
        );
    }

    #[test]
    fn confirmed_sale_must_echo_the_intent() {
        let intent_id: IntentId = "6f1c1f0e-8f0a-4c1e-9b7a-2f6b8f9e1a11".parse().unwrap();
        let ours = json!({
            "statusCode": 3,
            "transactionId": 77,
            "clientTransactionId": intent_id.to_string(),
            "amount": 500
        });
        assert!(matches!(
            parse_confirmed(&ours, "77", intent_id).unwrap(),
            ProviderStatus::Captured { .. }
        ));

        let replayed = json!({
            "statusCode": 3,
            "transactionId": 77,
            "clientTransactionId": "0b6f3c52-0d55-4a8e-8c0c-3a1d9c1f2e77",
            "amount": 500
        });
        assert!(matches!(
            parse_confirmed(&replayed, "77", intent_id),
            Err(GatewayError::ReferenceMismatch { .. })
        ));
    }

    #[test]
    fn canceled_sale_declines() {
        let sale = json!({ "statusCode": 2, "message": "Transacción cancelada" });
        assert_eq!(
            parse_sale(&sale).unwrap(),
            ProviderStatus::Declined {
                reason: "Transacción cancelada".into()
            }
        );
    }

    #[test]
    fn missing_status_is_a_decode_error() {
        assert!(matches!(
            parse_sale(&json!({ "transactionId": 1 })),
            Err(GatewayError::Decode(_))
        ));
    }

    #[test]
    fn sales_list_prefers_any_approval() {
        let sales = json!([
            { "statusCode": 2 },
            { "statusCode": 3, "transactionId": 9, "amount": 100 }
        ]);
        assert!(matches!(
            parse_sales(&sales).unwrap(),
            ProviderStatus::Captured { .. }
        ));
        assert_eq!(parse_sales(&json!([])).unwrap(), ProviderStatus::Pending);
        assert!(matches!(
            parse_sales(&json!([{ "statusCode": 2 }])).unwrap(),
            ProviderStatus::Declined { .. }
        ));
    }
}
