//! Manual bank transfer "gateway".
//!
//! There is no provider API: transfers are confirmed by an operator, so an
//! automated lookup never reports captured funds.

use async_trait::async_trait;
use raffle_core::provider::PaymentProvider;

use crate::gateway::{GatewayError, LookupRequest, PaymentGateway, ProviderStatus};

#[derive(Debug, Default)]
pub struct TransferGateway;

#[async_trait]
impl PaymentGateway for TransferGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Transfer
    }

    async fn lookup(&self, _request: LookupRequest<'_>) -> Result<ProviderStatus, GatewayError> {
        Ok(ProviderStatus::Pending)
    }
}
