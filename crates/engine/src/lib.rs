//! Ticket allocation and payment reconciliation.
//!
//! [`allocation`] turns a completed intent into exactly one assignment,
//! [`tracker`] owns the intent lifecycle, [`tagger`] marks prize numbers and
//! [`listener`] feeds provider confirmations into the tracker from every
//! channel. [`Engine`] wires them together for the API and worker binaries.

pub mod alerts;
pub mod allocation;
pub mod checkout;
pub mod config;
pub mod listener;
pub mod tagger;
pub mod tracker;

use std::sync::Arc;

use raffle_db::DbPool;
use raffle_events::EventBus;
use raffle_payments::GatewayRegistry;

pub use allocation::{Allocation, AllocationError, Allocator};
pub use config::ReconcileConfig;
pub use listener::{
    ChangeFeedListener, FallbackPoller, Ingress, ReconcileError, Reconciler, Verification,
};
pub use tracker::{IntentTracker, Outcome, Resolution, ResolutionOutcome, TrackerError};

/// Shared engine handles.
#[derive(Clone)]
pub struct Engine {
    pub pool: DbPool,
    pub bus: Arc<EventBus>,
    pub config: ReconcileConfig,
    pub tracker: IntentTracker,
    pub reconciler: Reconciler,
}

impl Engine {
    pub fn new(
        pool: DbPool,
        bus: Arc<EventBus>,
        gateways: GatewayRegistry,
        config: ReconcileConfig,
    ) -> Self {
        let tracker = IntentTracker::new(pool.clone(), Arc::clone(&bus), config.retry.clone());
        let reconciler = Reconciler::new(pool.clone(), Arc::clone(&bus), tracker.clone(), gateways);
        Self {
            pool,
            bus,
            config,
            tracker,
            reconciler,
        }
    }

    pub fn change_feed(&self) -> ChangeFeedListener {
        ChangeFeedListener::new(
            self.pool.clone(),
            self.reconciler.clone(),
            self.config.poll_batch_size,
        )
    }

    pub fn poller(&self) -> FallbackPoller {
        FallbackPoller::new(
            self.pool.clone(),
            self.reconciler.clone(),
            self.config.clone(),
        )
    }
}
