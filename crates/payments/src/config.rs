//! Provider credentials loaded from the environment.

/// Credentials and endpoints for every provider.
///
/// | Env var                 | Default                                    |
/// |-------------------------|--------------------------------------------|
/// | `STRIPE_SECRET_KEY`     | unset (Stripe disabled)                    |
/// | `STRIPE_WEBHOOK_SECRET` | unset (Stripe webhooks rejected)           |
/// | `STRIPE_API_BASE`       | `https://api.stripe.com`                   |
/// | `PAYPAL_CLIENT_ID`      | unset (PayPal disabled)                    |
/// | `PAYPAL_CLIENT_SECRET`  | unset (PayPal disabled)                    |
/// | `PAYPAL_API_BASE`       | `https://api-m.paypal.com`                 |
/// | `PAYPHONE_TOKEN`        | unset (PayPhone disabled)                  |
/// | `PAYPHONE_API_BASE`     | `https://pay.payphonetodoesposible.com`    |
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub stripe_secret_key: Option<String>,
    pub stripe_webhook_secret: Option<String>,
    pub stripe_api_base: String,
    pub paypal_client_id: Option<String>,
    pub paypal_client_secret: Option<String>,
    pub paypal_api_base: String,
    pub payphone_token: Option<String>,
    pub payphone_api_base: String,
}

pub const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
pub const DEFAULT_PAYPAL_API_BASE: &str = "https://api-m.paypal.com";
pub const DEFAULT_PAYPHONE_API_BASE: &str = "https://pay.payphonetodoesposible.com";

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            stripe_secret_key: non_empty_env("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: non_empty_env("STRIPE_WEBHOOK_SECRET"),
            stripe_api_base: non_empty_env("STRIPE_API_BASE")
                .unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.into()),
            paypal_client_id: non_empty_env("PAYPAL_CLIENT_ID"),
            paypal_client_secret: non_empty_env("PAYPAL_CLIENT_SECRET"),
            paypal_api_base: non_empty_env("PAYPAL_API_BASE")
                .unwrap_or_else(|| DEFAULT_PAYPAL_API_BASE.into()),
            payphone_token: non_empty_env("PAYPHONE_TOKEN"),
            payphone_api_base: non_empty_env("PAYPHONE_API_BASE")
                .unwrap_or_else(|| DEFAULT_PAYPHONE_API_BASE.into()),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
