//! Registry of configured gateways keyed by provider.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use raffle_core::provider::PaymentProvider;

use crate::config::GatewayConfig;
use crate::gateway::{GatewayError, PaymentGateway};
use crate::paypal::PaypalGateway;
use crate::payphone::PayphoneGateway;
use crate::stripe::StripeGateway;
use crate::transfer::TransferGateway;

/// HTTP timeout for provider API calls.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    /// Empty registry. Tests register stub gateways on it.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every provider that has credentials. Bank transfer needs
    /// none and is always available.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()?;
        let mut registry = Self::new();

        if let Some(key) = &config.stripe_secret_key {
            registry.register(Arc::new(StripeGateway::new(
                client.clone(),
                config.stripe_api_base.clone(),
                key.clone(),
            )));
        }
        if let (Some(id), Some(secret)) = (&config.paypal_client_id, &config.paypal_client_secret) {
            registry.register(Arc::new(PaypalGateway::new(
                client.clone(),
                config.paypal_api_base.clone(),
                id.clone(),
                secret.clone(),
            )));
        }
        if let Some(token) = &config.payphone_token {
            registry.register(Arc::new(PayphoneGateway::new(
                client,
                config.payphone_api_base.clone(),
                token.clone(),
            )));
        }
        registry.register(Arc::new(TransferGateway));

        tracing::info!(
            providers = ?registry.providers(),
            "Payment gateways registered"
        );
        Ok(registry)
    }

    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<Arc<dyn PaymentGateway>, GatewayError> {
        self.gateways
            .get(&provider)
            .cloned()
            .ok_or(GatewayError::NotConfigured(provider))
    }

    pub fn is_configured(&self, provider: PaymentProvider) -> bool {
        self.gateways.contains_key(&provider)
    }

    /// Configured providers in display order.
    pub fn providers(&self) -> Vec<PaymentProvider> {
        raffle_core::provider::ALL_PROVIDERS
            .into_iter()
            .filter(|p| self.is_configured(*p))
            .collect()
    }
}
