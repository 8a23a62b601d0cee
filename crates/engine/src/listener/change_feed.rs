//! Realtime change feed over `provider_transactions`.
//!
//! Provider adapters write transaction rows; a trigger issues
//! `pg_notify('provider_transactions', id)` when a row turns terminal. The
//! listener resolves the matching intent and marks the row reconciled.
//! Notifications are lost while the connection is down and rows committed
//! before `LISTEN` never notify, so every (re)connect starts with a catch-up
//! scan of unreconciled terminal rows.

use std::time::Duration;

use raffle_core::types::DbId;
use raffle_db::models::provider_transaction::{ProviderTransaction, TX_APPROVED, TX_CANCELED};
use raffle_db::repositories::{PaymentIntentRepo, ProviderTransactionRepo};
use raffle_db::DbPool;
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;

use super::{Ingress, ReconcileError, Reconciler, Verification};
use crate::tracker::{Outcome, TrackerError};

/// `LISTEN` channel written by the `provider_transactions` trigger.
pub const CHANNEL: &str = "provider_transactions";

const ERROR_BACKOFF: Duration = Duration::from_secs(1);

pub struct ChangeFeedListener {
    pool: DbPool,
    reconciler: Reconciler,
    batch_size: i64,
}

impl ChangeFeedListener {
    pub fn new(pool: DbPool, reconciler: Reconciler, batch_size: i64) -> Self {
        Self {
            pool,
            reconciler,
            batch_size: batch_size.max(1),
        }
    }

    /// Listen until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(CHANNEL).await?;
        tracing::info!(channel = CHANNEL, "Change feed listener started");

        self.catch_up_logged().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Change feed listener shutting down");
                    break;
                }
                received = listener.try_recv() => match received {
                    Ok(Some(notification)) => {
                        self.on_notification(notification.payload()).await;
                    }
                    Ok(None) => {
                        tracing::warn!("Change feed connection lost; catching up after reconnect");
                        self.catch_up_logged().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Change feed receive failed");
                        tokio::time::sleep(ERROR_BACKOFF).await;
                    }
                },
            }
        }
        Ok(())
    }

    /// Process every unreconciled terminal row. Returns how many rows were
    /// marked reconciled.
    pub async fn catch_up(&self) -> Result<usize, sqlx::Error> {
        let mut reconciled = 0;
        loop {
            let rows = ProviderTransactionRepo::list_unreconciled(&self.pool, self.batch_size).await?;
            let fetched = rows.len();
            let mut progressed = 0;
            for row in rows {
                let id = row.id;
                match self.process(row).await {
                    Ok(true) => progressed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(transaction_id = id, error = %e, "Failed to reconcile provider transaction");
                    }
                }
            }
            reconciled += progressed;
            // Stop on a short page, or when nothing on a full page could be
            // settled (those rows wait for the next catch-up).
            if (fetched as i64) < self.batch_size || progressed == 0 {
                break;
            }
        }
        Ok(reconciled)
    }

    /// Reconcile one row by id.
    pub async fn process_id(&self, id: DbId) -> Result<bool, ReconcileError> {
        match ProviderTransactionRepo::find_by_id(&self.pool, id).await? {
            Some(row) => self.process(row).await,
            None => Ok(false),
        }
    }

    /// Resolve the intent behind a terminal row and mark the row
    /// reconciled. Returns whether this call marked it.
    pub async fn process(&self, row: ProviderTransaction) -> Result<bool, ReconcileError> {
        if row.reconciled_at.is_some() || !row.is_terminal() {
            return Ok(false);
        }
        let Some(intent) = PaymentIntentRepo::find_by_id(&self.pool, row.payment_intent_id).await?
        else {
            tracing::warn!(
                transaction_id = row.id,
                intent_id = %row.payment_intent_id,
                "Provider transaction for unknown intent"
            );
            return Ok(ProviderTransactionRepo::mark_reconciled(&self.pool, row.id).await?);
        };

        let tracker = self.reconciler.tracker();
        let result = match row.status.as_str() {
            TX_APPROVED => {
                self.reconciler
                    .apply_capture(
                        intent,
                        row.provider_reference.clone().unwrap_or_default(),
                        row.amount_cents,
                        Ingress::ChangeFeed,
                    )
                    .await
            }
            TX_CANCELED => tracker
                .resolve(
                    intent.id,
                    Outcome::Failed {
                        reason: Some("Provider canceled the transaction".to_string()),
                        provider_reference: row.provider_reference.clone(),
                    },
                )
                .await
                .map(Verification::Resolved)
                .map_err(ReconcileError::from),
            other => {
                tracing::warn!(transaction_id = row.id, status = other, "Unknown provider transaction status");
                Ok(Verification::StillPending(intent))
            }
        };

        match result {
            Ok(_) => {}
            // Retrying the row cannot help; the sweep and alerts take over.
            Err(ReconcileError::Tracker(
                ref e @ (TrackerError::MissingProviderReference(_)
                | TrackerError::ReferenceAlreadyUsed { .. }
                | TrackerError::Transition(_)
                | TrackerError::PoolContention { .. }
                | TrackerError::Allocation(_)),
            )) => {
                tracing::warn!(transaction_id = row.id, error = %e, "Provider transaction settled with errors");
            }
            Err(e) => return Err(e),
        }

        Ok(ProviderTransactionRepo::mark_reconciled(&self.pool, row.id).await?)
    }

    async fn on_notification(&self, payload: &str) {
        let Ok(id) = payload.parse::<DbId>() else {
            tracing::warn!(payload, "Ignoring malformed change feed notification");
            return;
        };
        match self.process_id(id).await {
            Ok(true) => tracing::debug!(transaction_id = id, "Provider transaction reconciled"),
            Ok(false) => {}
            Err(e) => {
                // Left unreconciled; the next catch-up retries it.
                tracing::error!(transaction_id = id, error = %e, "Failed to reconcile provider transaction");
            }
        }
    }

    async fn catch_up_logged(&self) {
        match self.catch_up().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Change feed catch-up reconciled rows"),
            Err(e) => tracing::error!(error = %e, "Change feed catch-up failed"),
        }
    }
}
