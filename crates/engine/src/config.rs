//! Reconciliation tuning loaded from the environment.

use std::time::Duration;

use raffle_core::backoff::RetryPolicy;
use raffle_core::provider::PaymentProvider;

/// A malformed environment variable.
#[derive(Debug, thiserror::Error)]
#[error("{key} must be a valid {expected}, got '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub expected: &'static str,
    pub value: String,
}

/// Allocation retry and reconciliation timing.
///
/// | Env Var                        | Default |
/// |--------------------------------|---------|
/// | `ALLOCATION_MAX_ATTEMPTS`      | `5`     |
/// | `ALLOCATION_BACKOFF_BASE_MS`   | `25`    |
/// | `ALLOCATION_BACKOFF_MAX_MS`    | `400`   |
/// | `INTENT_TIMEOUT_STRIPE_MINS`   | `15`    |
/// | `INTENT_TIMEOUT_PAYPAL_MINS`   | `15`    |
/// | `INTENT_TIMEOUT_PAYPHONE_MINS` | `10`    |
/// | `INTENT_TIMEOUT_TRANSFER_MINS` | `4320`  |
/// | `FALLBACK_GRACE_SECS`          | `120`   |
/// | `POLL_INTERVAL_SECS`           | `30`    |
/// | `POLL_BATCH_SIZE`              | `100`   |
/// | `UNALLOCATED_RETRY_AFTER_SECS` | `60`    |
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub retry: RetryPolicy,
    pub stripe_timeout: Duration,
    pub paypal_timeout: Duration,
    pub payphone_timeout: Duration,
    pub transfer_timeout: Duration,
    /// Extra wait past the provider timeout before the poller steps in.
    pub fallback_grace: Duration,
    pub poll_interval: Duration,
    pub poll_batch_size: i64,
    /// How long a completed intent may sit without an assignment before the
    /// poller re-drives allocation.
    pub unallocated_retry_after: Duration,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            stripe_timeout: PaymentProvider::Stripe.default_timeout(),
            paypal_timeout: PaymentProvider::Paypal.default_timeout(),
            payphone_timeout: PaymentProvider::Payphone.default_timeout(),
            transfer_timeout: PaymentProvider::Transfer.default_timeout(),
            fallback_grace: Duration::from_secs(120),
            poll_interval: Duration::from_secs(30),
            poll_batch_size: 100,
            unallocated_retry_after: Duration::from_secs(60),
        }
    }
}

impl ReconcileConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            retry: RetryPolicy {
                max_attempts: env_or("ALLOCATION_MAX_ATTEMPTS", defaults.retry.max_attempts)?,
                base_delay: Duration::from_millis(env_or("ALLOCATION_BACKOFF_BASE_MS", 25)?),
                max_delay: Duration::from_millis(env_or("ALLOCATION_BACKOFF_MAX_MS", 400)?),
            },
            stripe_timeout: minutes(env_or("INTENT_TIMEOUT_STRIPE_MINS", 15)?),
            paypal_timeout: minutes(env_or("INTENT_TIMEOUT_PAYPAL_MINS", 15)?),
            payphone_timeout: minutes(env_or("INTENT_TIMEOUT_PAYPHONE_MINS", 10)?),
            transfer_timeout: minutes(env_or("INTENT_TIMEOUT_TRANSFER_MINS", 4320)?),
            fallback_grace: Duration::from_secs(env_or("FALLBACK_GRACE_SECS", 120)?),
            poll_interval: Duration::from_secs(env_or("POLL_INTERVAL_SECS", 30)?),
            poll_batch_size: env_or("POLL_BATCH_SIZE", defaults.poll_batch_size)?,
            unallocated_retry_after: Duration::from_secs(env_or(
                "UNALLOCATED_RETRY_AFTER_SECS",
                60,
            )?),
        })
    }

    /// Provider-specific confirmation window.
    pub fn intent_timeout(&self, provider: PaymentProvider) -> Duration {
        match provider {
            PaymentProvider::Stripe => self.stripe_timeout,
            PaymentProvider::Paypal => self.paypal_timeout,
            PaymentProvider::Payphone => self.payphone_timeout,
            PaymentProvider::Transfer => self.transfer_timeout,
        }
    }

    /// Age after which a pending intent is handed to the fallback poller.
    pub fn fallback_after(&self, provider: PaymentProvider) -> Duration {
        self.intent_timeout(provider) + self.fallback_grace
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m * 60)
}

/// Parse `key` from the environment, falling back to `default` when unset or
/// blank.
pub fn env_or<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            value.trim().parse().map_err(|_| ConfigError {
                key,
                expected: std::any::type_name::<T>(),
                value,
            })
        }
        _ => Ok(default),
    }
}
