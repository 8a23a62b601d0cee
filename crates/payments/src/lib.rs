//! Payment provider gateways.
//!
//! The reconciliation engine never trusts a client-side success signal; it
//! asks the provider through a [`PaymentGateway`] whether a reference
//! corresponds to captured funds. Each provider has its own client here.

pub mod config;
pub mod gateway;
pub mod paypal;
pub mod payphone;
pub mod registry;
pub mod stripe;
pub mod transfer;

pub use config::GatewayConfig;
pub use gateway::{GatewayError, LookupRequest, PaymentGateway, ProviderStatus};
pub use registry::GatewayRegistry;
