//! Payment Intent Tracker.
//!
//! Owns the `pending -> completed | failed | expired` lifecycle. Every
//! confirmation channel funnels into [`IntentTracker::resolve`]; repeated or
//! racing calls converge on the same terminal state and the same
//! assignment. Captured funds always end with either an assignment or a
//! `completed_unallocated` intent and an operator alert.

use std::sync::Arc;

use raffle_core::alert::ALERT_UNALLOCATED;
use raffle_core::backoff::RetryPolicy;
use raffle_core::status::{IntentStatus, TransitionError};
use raffle_core::types::IntentId;
use raffle_db::models::assignment::Assignment;
use raffle_db::models::operator_alert::NewOperatorAlert;
use raffle_db::models::payment_intent::PaymentIntent;
use raffle_db::repositories::payment_intent_repo::UQ_PROVIDER_REFERENCE;
use raffle_db::repositories::{AssignmentRepo, PaymentIntentRepo};
use raffle_db::{is_unique_violation, DbPool};
use raffle_events::bus::names;
use raffle_events::{EventBus, PlatformEvent};
use serde::Serialize;

use crate::alerts;
use crate::allocation::{AllocationError, Allocator};
use crate::tagger::PrizeTagger;

/// Reason recorded on intents that time out without confirmation.
pub const EXPIRED_REASON: &str = "No provider confirmation before the intent timed out";

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Payment intent {0} not found")]
    IntentNotFound(IntentId),

    #[error("Completion of intent {0} requires a provider reference")]
    MissingProviderReference(IntentId),

    /// The reference already paid for another intent. The intent stays
    /// pending.
    #[error("Provider reference '{reference}' already completed another intent; {intent_id} left pending")]
    ReferenceAlreadyUsed {
        intent_id: IntentId,
        reference: String,
    },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// The intent is completed but allocation lost every pool race. It stays
    /// `completed` without an assignment until the next signal or sweep.
    #[error("Allocation for intent {intent_id} hit pool contention after {attempts} attempts")]
    PoolContention { intent_id: IntentId, attempts: u32 },

    #[error("Allocation failed: {0}")]
    Allocation(AllocationError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A provider verdict to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed {
        provider_reference: String,
    },
    Failed {
        reason: Option<String>,
        provider_reference: Option<String>,
    },
}

/// Whether a call changed the intent's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOutcome {
    Applied,
    /// The intent was already terminal; its current state is returned.
    AlreadyResolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolution {
    pub intent: PaymentIntent,
    pub assignment: Option<Assignment>,
    pub outcome: ResolutionOutcome,
}

#[derive(Clone)]
pub struct IntentTracker {
    pool: DbPool,
    allocator: Allocator,
    tagger: PrizeTagger,
    bus: Arc<EventBus>,
}

impl IntentTracker {
    pub fn new(pool: DbPool, bus: Arc<EventBus>, retry: RetryPolicy) -> Self {
        Self {
            allocator: Allocator::new(pool.clone(), retry),
            tagger: PrizeTagger::new(pool.clone(), Arc::clone(&bus)),
            pool,
            bus,
        }
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    pub fn tagger(&self) -> &PrizeTagger {
        &self.tagger
    }

    /// Apply a provider verdict.
    ///
    /// A terminal intent is returned unchanged with
    /// [`ResolutionOutcome::AlreadyResolved`]. A `completed` intent still
    /// lacking its assignment has allocation re-driven on every call, so
    /// duplicate signals double as retries.
    pub async fn resolve(
        &self,
        intent_id: IntentId,
        outcome: Outcome,
    ) -> Result<Resolution, TrackerError> {
        let intent = self.load(intent_id).await?;
        if !admits(&intent, outcome.target())? {
            return self.already_resolved(intent, &outcome).await;
        }

        match &outcome {
            Outcome::Completed { provider_reference } => {
                let reference = provider_reference.trim();
                if reference.is_empty() {
                    return Err(TrackerError::MissingProviderReference(intent_id));
                }
                let marked = PaymentIntentRepo::mark_completed(&self.pool, intent_id, reference)
                    .await
                    .map_err(|e| reference_reuse(e, intent_id, reference))?;
                let Some(completed) = marked else {
                    // Another channel resolved it between our read and write.
                    let current = self.load(intent_id).await?;
                    return self.already_resolved(current, &outcome).await;
                };

                tracing::info!(%intent_id, provider_reference = reference, "Payment intent completed");
                self.publish_resolved(&completed);

                let (intent, assignment) = self.allocate_completed(completed).await?;
                Ok(Resolution {
                    intent,
                    assignment,
                    outcome: ResolutionOutcome::Applied,
                })
            }
            Outcome::Failed {
                reason,
                provider_reference,
            } => {
                let updated = PaymentIntentRepo::mark_unsuccessful(
                    &self.pool,
                    intent_id,
                    IntentStatus::Failed,
                    provider_reference.as_deref(),
                    reason.as_deref(),
                )
                .await?;
                self.finish_unsuccessful(intent_id, updated, &outcome).await
            }
        }
    }

    /// Move a still-pending intent to `expired`.
    pub async fn expire(&self, intent_id: IntentId) -> Result<Resolution, TrackerError> {
        let intent = self.load(intent_id).await?;
        if !admits(&intent, IntentStatus::Expired)? {
            return self.current_state(intent).await;
        }
        let updated = PaymentIntentRepo::mark_unsuccessful(
            &self.pool,
            intent_id,
            IntentStatus::Expired,
            None,
            Some(EXPIRED_REASON),
        )
        .await?;
        let outcome = Outcome::Failed {
            reason: Some(EXPIRED_REASON.to_string()),
            provider_reference: None,
        };
        self.finish_unsuccessful(intent_id, updated, &outcome).await
    }

    /// Park a captured payment that cannot be honoured (an underpayment)
    /// as `completed_unallocated`, together with its operator alert.
    ///
    /// A concurrent resolution wins: the intent is then returned as
    /// [`ResolutionOutcome::AlreadyResolved`] and no alert is written.
    pub async fn park_capture(
        &self,
        intent_id: IntentId,
        provider_reference: &str,
        reason: &str,
        alert: &NewOperatorAlert,
    ) -> Result<Resolution, TrackerError> {
        let intent = self.load(intent_id).await?;
        if !admits(&intent, IntentStatus::CompletedUnallocated)?
            || intent.status() != Some(IntentStatus::Pending)
        {
            return self.current_state(intent).await;
        }

        let parked =
            PaymentIntentRepo::park_capture(&self.pool, intent_id, provider_reference, reason, alert)
                .await
                .map_err(|e| reference_reuse(e, intent_id, provider_reference))?;
        let Some((intent, alert)) = parked else {
            let current = self.load(intent_id).await?;
            return self.current_state(current).await;
        };

        tracing::error!(%intent_id, provider_reference, reason, "Captured payment parked without numbers");
        alerts::announce(&self.bus, &alert);
        self.publish_resolved(&intent);
        self.bus.publish(
            PlatformEvent::new(names::INTENT_UNALLOCATED)
                .for_intent(intent_id)
                .with_payload(serde_json::json!({ "reason": reason })),
        );
        Ok(Resolution {
            intent,
            assignment: None,
            outcome: ResolutionOutcome::Applied,
        })
    }

    /// Re-drive allocation for a `completed` intent without an assignment.
    pub async fn retry_allocation(&self, intent_id: IntentId) -> Result<Resolution, TrackerError> {
        let intent = self.load(intent_id).await?;
        if intent.status() != Some(IntentStatus::Completed) {
            return self.current_state(intent).await;
        }
        let (intent, assignment) = self.allocate_completed(intent).await?;
        Ok(Resolution {
            intent,
            assignment,
            outcome: ResolutionOutcome::AlreadyResolved,
        })
    }

    /// Current intent plus assignment, without any transition.
    pub async fn current_state(&self, intent: PaymentIntent) -> Result<Resolution, TrackerError> {
        let assignment = AssignmentRepo::find_by_intent(&self.pool, intent.id).await?;
        Ok(Resolution {
            intent,
            assignment,
            outcome: ResolutionOutcome::AlreadyResolved,
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn load(&self, intent_id: IntentId) -> Result<PaymentIntent, TrackerError> {
        PaymentIntentRepo::find_by_id(&self.pool, intent_id)
            .await?
            .ok_or(TrackerError::IntentNotFound(intent_id))
    }

    async fn already_resolved(
        &self,
        intent: PaymentIntent,
        outcome: &Outcome,
    ) -> Result<Resolution, TrackerError> {
        tracing::debug!(
            intent_id = %intent.id,
            status = intent.status().map(|s| s.name()).unwrap_or("unknown"),
            "Resolution for already resolved intent ignored"
        );
        let stranded = intent.status() == Some(IntentStatus::Completed)
            && intent.assignment_id.is_none()
            && matches!(outcome, Outcome::Completed { .. });
        if !stranded {
            return self.current_state(intent).await;
        }
        let (intent, assignment) = self.allocate_completed(intent).await?;
        Ok(Resolution {
            intent,
            assignment,
            outcome: ResolutionOutcome::AlreadyResolved,
        })
    }

    async fn finish_unsuccessful(
        &self,
        intent_id: IntentId,
        updated: Option<PaymentIntent>,
        outcome: &Outcome,
    ) -> Result<Resolution, TrackerError> {
        let Some(intent) = updated else {
            let current = self.load(intent_id).await?;
            return self.already_resolved(current, outcome).await;
        };
        tracing::info!(
            %intent_id,
            status = intent.status().map(|s| s.name()).unwrap_or("unknown"),
            reason = intent.failure_reason.as_deref().unwrap_or(""),
            "Payment intent resolved without payment"
        );
        self.publish_resolved(&intent);
        Ok(Resolution {
            intent,
            assignment: None,
            outcome: ResolutionOutcome::Applied,
        })
    }

    /// Allocate for a completed intent and handle every failure mode.
    async fn allocate_completed(
        &self,
        intent: PaymentIntent,
    ) -> Result<(PaymentIntent, Option<Assignment>), TrackerError> {
        let intent_id = intent.id;
        match self.allocator.allocate(intent_id).await {
            Ok(allocation) => {
                if allocation.created {
                    self.bus.publish(
                        PlatformEvent::new(names::ASSIGNMENT_CREATED)
                            .for_intent(intent_id)
                            .with_payload(serde_json::json!({
                                "assignment_id": allocation.assignment.id,
                                "raffle_id": allocation.assignment.raffle_id,
                                "participant_id": allocation.assignment.participant_id,
                                "numbers": allocation.assignment.numbers,
                            })),
                    );
                }
                self.tagger.tag_best_effort(&allocation.assignment).await;
                let intent = self.load(intent_id).await?;
                Ok((intent, Some(allocation.assignment)))
            }
            Err(e) if e.is_unallocatable() => {
                let intent = self.mark_unallocated(intent, &e).await?;
                Ok((intent, None))
            }
            Err(AllocationError::PoolContention { attempts }) => {
                Err(TrackerError::PoolContention {
                    intent_id,
                    attempts,
                })
            }
            Err(AllocationError::IntentNotResolved { .. }) => {
                // A concurrent call already moved it to completed_unallocated.
                let intent = self.load(intent_id).await?;
                let assignment = AssignmentRepo::find_by_intent(&self.pool, intent_id).await?;
                Ok((intent, assignment))
            }
            Err(AllocationError::Database(e)) => Err(TrackerError::Database(e)),
            Err(e) => {
                tracing::error!(%intent_id, error = %e, "Allocation failed for a paid intent");
                Err(TrackerError::Allocation(e))
            }
        }
    }

    async fn mark_unallocated(
        &self,
        intent: PaymentIntent,
        cause: &AllocationError,
    ) -> Result<PaymentIntent, TrackerError> {
        if !admits(&intent, IntentStatus::CompletedUnallocated)? {
            return self.load(intent.id).await;
        }
        let reason = cause.to_string();
        let alert = alerts::new_alert(
            intent.tenant_id,
            Some(intent.id),
            ALERT_UNALLOCATED,
            format!(
                "Payment {} was captured but numbers could not be assigned: {reason}",
                intent.id
            ),
            serde_json::json!({
                "raffle_id": intent.raffle_id,
                "participant_id": intent.participant_id,
                "requested_quantity": intent.requested_quantity,
                "amount_cents": intent.amount_cents,
                "provider": intent.provider,
                "provider_reference": intent.provider_reference,
            }),
        );
        let parked = PaymentIntentRepo::mark_unallocated(&self.pool, intent.id, &reason, &alert)
            .await
            .inspect_err(|e| {
                // Nothing was written; the intent stays completed and the
                // sweep retries it.
                tracing::error!(intent_id = %intent.id, error = %e, "Failed to park unallocated intent");
            })?;
        let Some((updated, alert)) = parked else {
            return self.load(intent.id).await;
        };

        tracing::error!(
            intent_id = %intent.id,
            raffle_id = intent.raffle_id,
            participant_id = intent.participant_id,
            amount_cents = intent.amount_cents,
            reason = %reason,
            "Paid intent could not be allocated"
        );
        alerts::announce(&self.bus, &alert);

        self.bus.publish(
            PlatformEvent::new(names::INTENT_UNALLOCATED)
                .for_intent(intent.id)
                .with_payload(serde_json::json!({ "reason": reason })),
        );
        Ok(updated)
    }

    fn publish_resolved(&self, intent: &PaymentIntent) {
        self.bus.publish(
            PlatformEvent::new(names::INTENT_RESOLVED)
                .for_intent(intent.id)
                .with_payload(serde_json::json!({
                    "status": intent.status().map(|s| s.name()),
                    "provider": intent.provider,
                    "provider_reference": intent.provider_reference,
                })),
        );
    }
}

impl Outcome {
    /// Status this outcome moves a pending intent to.
    pub fn target(&self) -> IntentStatus {
        match self {
            Self::Completed { .. } => IntentStatus::Completed,
            Self::Failed { .. } => IntentStatus::Failed,
        }
    }
}

/// Whether `intent` may move to `to`. Terminal intents answer `false` so
/// callers take the idempotent path; moves outside the state machine are
/// errors.
fn admits(intent: &PaymentIntent, to: IntentStatus) -> Result<bool, TrackerError> {
    let Some(current) = intent.status() else {
        tracing::warn!(intent_id = %intent.id, status_id = intent.status_id, "Intent has an unknown status");
        return Ok(false);
    };
    match current.validate_transition(to) {
        Ok(()) => Ok(true),
        Err(TransitionError::AlreadyResolved { .. }) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn reference_reuse(err: sqlx::Error, intent_id: IntentId, reference: &str) -> TrackerError {
    if is_unique_violation(&err, UQ_PROVIDER_REFERENCE) {
        tracing::warn!(%intent_id, provider_reference = reference, "Provider reference replayed against another intent");
        return TrackerError::ReferenceAlreadyUsed {
            intent_id,
            reference: reference.to_string(),
        };
    }
    TrackerError::Database(err)
}
