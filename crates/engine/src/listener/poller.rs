//! Fallback poller.
//!
//! Catches what the push channels missed. Pending intents older than their
//! provider timeout plus a grace period get one direct provider lookup and
//! are expired if still unsettled. Completed intents that have sat without
//! an assignment (lost pool races, crashes between resolve and allocate)
//! get allocation re-driven.

use std::time::Duration;

use chrono::Utc;
use raffle_core::alert::ALERT_ALLOCATION_STALLED;
use raffle_core::provider::ALL_PROVIDERS;
use raffle_db::models::payment_intent::PaymentIntent;
use raffle_db::repositories::PaymentIntentRepo;
use raffle_db::DbPool;
use raffle_payments::GatewayError;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::{Ingress, ReconcileError, Reconciler, Verification};
use crate::alerts;
use crate::config::ReconcileConfig;
use crate::tracker::TrackerError;

/// Counters from one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Stale intents the provider had settled.
    pub resolved: usize,
    pub expired: usize,
    /// Stale intents captured below their total and parked
    /// `completed_unallocated`.
    pub underpaid: usize,
    /// Stale intents left pending because the provider could not be asked.
    pub lookup_failures: usize,
    /// Stranded intents that now have an assignment.
    pub reallocated: usize,
    /// Stranded intents that ended `completed_unallocated`.
    pub unallocated: usize,
    /// Stranded intents whose allocation failed again.
    pub stalled: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

pub struct FallbackPoller {
    pool: DbPool,
    reconciler: Reconciler,
    config: ReconcileConfig,
}

impl FallbackPoller {
    pub fn new(pool: DbPool, reconciler: Reconciler, config: ReconcileConfig) -> Self {
        Self {
            pool,
            reconciler,
            config,
        }
    }

    /// Sweep every `poll_interval` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        tracing::info!(
            poll_interval_secs = self.config.poll_interval.as_secs(),
            "Fallback poller started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Fallback poller shutting down");
                    break;
                }
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(report) if !report.is_empty() => {
                            tracing::info!(?report, "Fallback sweep finished");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::error!(error = %e, "Fallback sweep failed"),
                    }
                }
            }
        }
    }

    /// One pass over stale pending and stranded completed intents.
    pub async fn sweep_once(&self) -> Result<SweepReport, sqlx::Error> {
        let mut report = SweepReport::default();
        let now = Utc::now();

        for provider in ALL_PROVIDERS {
            let cutoff = now - age(self.config.fallback_after(provider));
            let stale = PaymentIntentRepo::list_stale_pending(
                &self.pool,
                provider,
                cutoff,
                self.config.poll_batch_size,
            )
            .await?;
            for intent in stale {
                self.settle_stale(intent, &mut report).await?;
            }
        }

        let cutoff = now - age(self.config.unallocated_retry_after);
        let stranded = PaymentIntentRepo::list_completed_unassigned(
            &self.pool,
            cutoff,
            self.config.poll_batch_size,
        )
        .await?;
        for intent in stranded {
            self.redrive(intent, &mut report).await?;
        }

        Ok(report)
    }

    async fn settle_stale(
        &self,
        intent: PaymentIntent,
        report: &mut SweepReport,
    ) -> Result<(), sqlx::Error> {
        let intent_id = intent.id;
        let verified = self
            .reconciler
            .verify_and_resolve(intent_id, None, Ingress::Poller)
            .await;

        let expire = match verified {
            Ok(Verification::Resolved(_)) => {
                report.resolved += 1;
                false
            }
            Ok(Verification::Underpaid { .. }) => {
                report.underpaid += 1;
                false
            }
            Ok(Verification::StillPending(_)) => true,
            // Nobody can confirm this provider any more.
            Err(ReconcileError::Gateway(GatewayError::NotConfigured(_))) => true,
            // The only capture on record pays for some other intent.
            Err(ReconcileError::Gateway(GatewayError::ReferenceMismatch { .. }))
            | Err(ReconcileError::Tracker(TrackerError::ReferenceAlreadyUsed { .. })) => {
                tracing::warn!(%intent_id, "Stale intent only matches another intent's payment");
                true
            }
            Err(ReconcileError::Database(e))
            | Err(ReconcileError::Tracker(TrackerError::Database(e))) => return Err(e),
            Err(e) => {
                tracing::warn!(%intent_id, error = %e, "Fallback lookup failed; will retry");
                report.lookup_failures += 1;
                false
            }
        };

        if expire {
            match self.reconciler.tracker().expire(intent_id).await {
                Ok(_) => report.expired += 1,
                Err(TrackerError::Database(e)) => return Err(e),
                Err(e) => tracing::warn!(%intent_id, error = %e, "Failed to expire intent"),
            }
        }
        Ok(())
    }

    async fn redrive(
        &self,
        intent: PaymentIntent,
        report: &mut SweepReport,
    ) -> Result<(), sqlx::Error> {
        match self.reconciler.tracker().retry_allocation(intent.id).await {
            Ok(resolution) if resolution.assignment.is_some() => report.reallocated += 1,
            Ok(_) => report.unallocated += 1,
            Err(e) => {
                report.stalled += 1;
                tracing::error!(intent_id = %intent.id, error = %e, "Stranded paid intent still unallocated");
                alerts::raise(
                    &self.pool,
                    self.reconciler.bus(),
                    intent.tenant_id,
                    Some(intent.id),
                    ALERT_ALLOCATION_STALLED,
                    format!("Payment {} is captured but allocation keeps failing: {e}", intent.id),
                    serde_json::json!({
                        "raffle_id": intent.raffle_id,
                        "resolved_at": intent.resolved_at,
                    }),
                )
                .await?;
            }
        }
        Ok(())
    }
}

/// Config windows are minutes to days; anything unrepresentable is treated
/// as a year.
fn age(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::days(365))
}
