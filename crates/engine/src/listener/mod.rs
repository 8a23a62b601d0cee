//! Reconciliation Listener.
//!
//! Bridges the confirmation channels (browser redirect, provider webhook,
//! realtime change feed, fallback poll, operator) into
//! [`IntentTracker::resolve`]. Client- and webhook-supplied claims are
//! hints only: the provider is asked directly before anything is resolved.

pub mod change_feed;
pub mod poller;

use std::sync::Arc;

use raffle_core::alert::ALERT_UNDERPAID;
use raffle_core::provider::PaymentProvider;
use raffle_core::status::IntentStatus;
use raffle_core::types::{DbId, IntentId};
use raffle_db::models::payment_intent::PaymentIntent;
use raffle_db::repositories::PaymentIntentRepo;
use raffle_db::DbPool;
use raffle_events::EventBus;
use raffle_payments::{GatewayError, GatewayRegistry, LookupRequest, ProviderStatus};

use crate::alerts;
use crate::tracker::{IntentTracker, Outcome, Resolution, ResolutionOutcome, TrackerError};

pub use change_feed::ChangeFeedListener;
pub use poller::{FallbackPoller, SweepReport};

/// The channel a confirmation arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingress {
    Redirect,
    Webhook,
    ChangeFeed,
    Poller,
    Operator,
}

impl Ingress {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redirect => "redirect",
            Self::Webhook => "webhook",
            Self::ChangeFeed => "change_feed",
            Self::Poller => "poller",
            Self::Operator => "operator",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error("Provider verification failed: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Intent {intent_id} uses provider '{provider}'")]
    WrongProvider { intent_id: IntentId, provider: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// What a verification attempt concluded.
#[derive(Debug, Clone)]
pub enum Verification {
    Resolved(Resolution),
    /// The provider has not settled the payment yet.
    StillPending(PaymentIntent),
    /// Captured amount is below the order total. The intent was parked as
    /// `completed_unallocated` with a critical operator alert.
    Underpaid {
        intent: PaymentIntent,
        paid_cents: i64,
    },
}

#[derive(Clone)]
pub struct Reconciler {
    pool: DbPool,
    bus: Arc<EventBus>,
    tracker: IntentTracker,
    gateways: GatewayRegistry,
}

impl Reconciler {
    pub fn new(
        pool: DbPool,
        bus: Arc<EventBus>,
        tracker: IntentTracker,
        gateways: GatewayRegistry,
    ) -> Self {
        Self {
            pool,
            bus,
            tracker,
            gateways,
        }
    }

    pub fn tracker(&self) -> &IntentTracker {
        &self.tracker
    }

    pub fn gateways(&self) -> &GatewayRegistry {
        &self.gateways
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Ask the provider about `intent_id` and resolve accordingly.
    ///
    /// `reference` is whatever the channel claims (redirect parameter,
    /// webhook object id); the stored reference is used when absent.
    pub async fn verify_and_resolve(
        &self,
        intent_id: IntentId,
        reference: Option<&str>,
        ingress: Ingress,
    ) -> Result<Verification, ReconcileError> {
        let intent = PaymentIntentRepo::find_by_id(&self.pool, intent_id)
            .await?
            .ok_or(TrackerError::IntentNotFound(intent_id))?;

        match intent.status() {
            Some(IntentStatus::Pending) => {}
            Some(IntentStatus::Completed) if intent.assignment_id.is_none() => {
                // Paid but unassigned: a fresh signal re-drives allocation.
                let reference = intent.provider_reference.clone().unwrap_or_default();
                return Ok(Verification::Resolved(
                    self.tracker
                        .resolve(
                            intent_id,
                            Outcome::Completed {
                                provider_reference: reference,
                            },
                        )
                        .await?,
                ));
            }
            _ => {
                return Ok(Verification::Resolved(
                    self.tracker.current_state(intent).await?,
                ));
            }
        }

        let provider = intent
            .payment_provider()
            .map_err(GatewayError::Decode)?;
        let gateway = self.gateways.get(provider)?;
        let reference = reference
            .filter(|r| !r.trim().is_empty())
            .or(intent.provider_reference.as_deref());
        let status = gateway
            .lookup(LookupRequest {
                intent_id,
                reference,
            })
            .await?;

        tracing::debug!(
            %intent_id,
            provider = provider.as_str(),
            ingress = ingress.as_str(),
            status = ?status,
            "Provider verification"
        );

        match status {
            ProviderStatus::Captured {
                reference,
                amount_cents,
            } => self.apply_capture(intent, reference, amount_cents, ingress).await,
            ProviderStatus::Declined { reason } => {
                let resolution = self
                    .tracker
                    .resolve(
                        intent_id,
                        Outcome::Failed {
                            reason: Some(reason),
                            provider_reference: reference.map(str::to_string),
                        },
                    )
                    .await?;
                Ok(Verification::Resolved(resolution))
            }
            ProviderStatus::Pending => Ok(Verification::StillPending(intent)),
        }
    }

    /// Resolve a capture reported by the provider, checking the amount when
    /// the provider reports one.
    pub async fn apply_capture(
        &self,
        intent: PaymentIntent,
        reference: String,
        amount_cents: Option<i64>,
        ingress: Ingress,
    ) -> Result<Verification, ReconcileError> {
        if let Some(paid_cents) = amount_cents.filter(|paid| *paid < intent.amount_cents) {
            let resolution = self
                .park_underpayment(&intent, &reference, paid_cents, ingress)
                .await?;
            return Ok(match resolution.outcome {
                ResolutionOutcome::Applied => Verification::Underpaid {
                    intent: resolution.intent,
                    paid_cents,
                },
                ResolutionOutcome::AlreadyResolved => Verification::Resolved(resolution),
            });
        }

        let resolution = self
            .tracker
            .resolve(
                intent.id,
                Outcome::Completed {
                    provider_reference: reference,
                },
            )
            .await?;
        tracing::info!(
            intent_id = %intent.id,
            ingress = ingress.as_str(),
            outcome = ?resolution.outcome,
            "Payment capture reconciled"
        );
        Ok(Verification::Resolved(resolution))
    }

    /// Handle a provider webhook body. Events that do not identify one of
    /// our intents are ignored.
    pub async fn handle_provider_event(
        &self,
        provider: PaymentProvider,
        event: &serde_json::Value,
    ) -> Result<Option<Verification>, ReconcileError> {
        let extracted = match provider {
            PaymentProvider::Stripe => raffle_payments::stripe::session_from_event(event),
            PaymentProvider::Paypal => raffle_payments::paypal::order_from_event(event),
            PaymentProvider::Payphone | PaymentProvider::Transfer => None,
        };
        let Some((reference, Some(intent_ref))) = extracted else {
            tracing::debug!(provider = provider.as_str(), "Webhook event carries no intent");
            return Ok(None);
        };
        let Ok(intent_id) = intent_ref.parse::<IntentId>() else {
            tracing::warn!(provider = provider.as_str(), intent_ref, "Webhook intent id is not a UUID");
            return Ok(None);
        };

        let verification = self
            .verify_and_resolve(intent_id, Some(&reference), Ingress::Webhook)
            .await;
        match verification {
            Err(ReconcileError::Tracker(TrackerError::IntentNotFound(_))) => {
                tracing::warn!(%intent_id, provider = provider.as_str(), "Webhook for unknown intent");
                Ok(None)
            }
            other => other.map(Some),
        }
    }

    /// Operator confirmation of a bank transfer. The operator is the
    /// verifier, so no gateway is consulted.
    pub async fn confirm_transfer(
        &self,
        intent_id: IntentId,
        bank_reference: &str,
        operator_id: DbId,
    ) -> Result<Resolution, ReconcileError> {
        let intent = PaymentIntentRepo::find_by_id(&self.pool, intent_id)
            .await?
            .ok_or(TrackerError::IntentNotFound(intent_id))?;
        if intent.payment_provider() != Ok(PaymentProvider::Transfer) {
            return Err(ReconcileError::WrongProvider {
                intent_id,
                provider: intent.provider,
            });
        }

        let resolution = self
            .tracker
            .resolve(
                intent_id,
                Outcome::Completed {
                    provider_reference: bank_reference.to_string(),
                },
            )
            .await?;
        tracing::info!(
            %intent_id,
            operator_id,
            ingress = Ingress::Operator.as_str(),
            outcome = ?resolution.outcome,
            "Bank transfer confirmed"
        );
        Ok(resolution)
    }

    async fn park_underpayment(
        &self,
        intent: &PaymentIntent,
        reference: &str,
        paid_cents: i64,
        ingress: Ingress,
    ) -> Result<Resolution, TrackerError> {
        let reason = format!(
            "Captured {paid_cents} cents but the order total is {}",
            intent.amount_cents
        );
        let alert = alerts::new_alert(
            intent.tenant_id,
            Some(intent.id),
            ALERT_UNDERPAID,
            format!("Payment {} underpaid: {reason}", intent.id),
            serde_json::json!({
                "provider": intent.provider,
                "provider_reference": reference,
                "paid_cents": paid_cents,
                "expected_cents": intent.amount_cents,
                "ingress": ingress.as_str(),
            }),
        );
        self.tracker
            .park_capture(intent.id, reference, &reason, &alert)
            .await
    }
}
