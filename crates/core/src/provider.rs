//! Payment providers and their per-provider confirmation timeouts.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// External provider through which a payment intent is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    Paypal,
    Payphone,
    /// Manual bank transfer confirmed by an operator.
    Transfer,
}

/// All providers, in display order.
pub const ALL_PROVIDERS: [PaymentProvider; 4] = [
    PaymentProvider::Stripe,
    PaymentProvider::Paypal,
    PaymentProvider::Payphone,
    PaymentProvider::Transfer,
];

impl PaymentProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
            Self::Payphone => "payphone",
            Self::Transfer => "transfer",
        }
    }

    /// Default window after which an unconfirmed intent is considered
    /// abandoned by the provider.
    pub fn default_timeout(self) -> Duration {
        match self {
            Self::Stripe | Self::Paypal => Duration::from_secs(15 * 60),
            Self::Payphone => Duration::from_secs(10 * 60),
            // Bank transfers take days to land.
            Self::Transfer => Duration::from_secs(72 * 3600),
        }
    }
}

impl std::fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            "payphone" => Ok(Self::Payphone),
            "transfer" => Ok(Self::Transfer),
            other => Err(format!(
                "Unknown payment provider '{other}'. Must be one of: stripe, paypal, payphone, transfer"
            )),
        }
    }
}
