//! Allocation Engine: turns a completed payment intent into exactly one
//! assignment.
//!
//! Each attempt reads the pool version, checks the participant quota, draws
//! numbers in memory and commits everything in one transaction guarded by
//! the version and by the unique constraints on `payment_intent_id` and
//! `(pool_id, number)`. A lost version race retries with jittered backoff.
//! No lock is held across attempts or across any network call.

use raffle_core::backoff::RetryPolicy;
use raffle_core::pool::{DrawError, PoolKind, PoolSnapshot};
use raffle_core::quota::{check_quota, QuotaExceeded};
use raffle_core::status::IntentStatus;
use raffle_core::types::{DbId, IntentId};
use raffle_db::models::assignment::{Assignment, CommitOutcome, NewAssignment};
use raffle_db::repositories::{AssignmentRepo, NumberPoolRepo, PaymentIntentRepo, RaffleRepo};
use raffle_db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("Payment intent {0} not found")]
    IntentNotFound(IntentId),

    #[error("Payment intent {id} is '{status}', not completed")]
    IntentNotResolved { id: IntentId, status: String },

    #[error("Raffle {0} not found")]
    RaffleNotFound(DbId),

    #[error("Number pool {0} not found")]
    PoolNotFound(DbId),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error("Pool exhausted: requested {requested}, remaining {remaining}")]
    PoolExhausted { requested: i32, remaining: i32 },

    /// The pool row is inconsistent with its kind (e.g. unknown kind).
    #[error("Invalid pool {pool_id}: {reason}")]
    InvalidPool { pool_id: DbId, reason: String },

    #[error("Pool contention: gave up after {attempts} attempts")]
    PoolContention { attempts: u32 },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AllocationError {
    /// Refusals that will not go away by retrying. Funds for such an intent
    /// need an operator.
    pub fn is_unallocatable(&self) -> bool {
        matches!(self, Self::QuotaExceeded(_) | Self::PoolExhausted { .. })
    }
}

/// A committed assignment and whether this call created it.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub assignment: Assignment,
    pub created: bool,
}

/// One attempt's result before retry handling.
enum Attempt {
    Done(Allocation),
    Conflict,
}

#[derive(Debug, Clone)]
pub struct Allocator {
    pool: DbPool,
    retry: RetryPolicy,
}

impl Allocator {
    pub fn new(pool: DbPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Allocate numbers for a completed intent.
    ///
    /// Safe to call any number of times from any process: once an
    /// assignment exists it is returned unchanged.
    pub async fn allocate(&self, intent_id: IntentId) -> Result<Allocation, AllocationError> {
        let mut attempt = 1;
        loop {
            match self.try_allocate(intent_id).await? {
                Attempt::Done(allocation) => {
                    if allocation.created {
                        tracing::info!(
                            %intent_id,
                            assignment_id = allocation.assignment.id,
                            pool_id = allocation.assignment.pool_id,
                            quantity = allocation.assignment.numbers.len(),
                            attempt,
                            "Numbers allocated"
                        );
                    }
                    return Ok(allocation);
                }
                Attempt::Conflict if self.retry.should_retry(attempt) => {
                    let delay = {
                        let mut rng = rand::rng();
                        self.retry.delay(attempt, &mut rng)
                    };
                    tracing::debug!(
                        %intent_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Pool version conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Attempt::Conflict => {
                    tracing::warn!(%intent_id, attempts = attempt, "Allocation gave up on contention");
                    return Err(AllocationError::PoolContention { attempts: attempt });
                }
            }
        }
    }

    async fn try_allocate(&self, intent_id: IntentId) -> Result<Attempt, AllocationError> {
        let intent = PaymentIntentRepo::find_by_id(&self.pool, intent_id)
            .await?
            .ok_or(AllocationError::IntentNotFound(intent_id))?;

        if let Some(existing) = AssignmentRepo::find_by_intent(&self.pool, intent_id).await? {
            return Ok(Attempt::Done(Allocation {
                assignment: existing,
                created: false,
            }));
        }

        if intent.status() != Some(IntentStatus::Completed) {
            return Err(AllocationError::IntentNotResolved {
                id: intent_id,
                status: intent
                    .status()
                    .map(|s| s.name().to_string())
                    .unwrap_or_else(|| intent.status_id.to_string()),
            });
        }

        let raffle = RaffleRepo::find_by_id(&self.pool, intent.raffle_id)
            .await?
            .ok_or(AllocationError::RaffleNotFound(intent.raffle_id))?;

        // The pool version must be read before the quota and the issued set:
        // any commit after this point invalidates both and fails our CAS.
        let number_pool = NumberPoolRepo::find_by_id(&self.pool, raffle.pool_id)
            .await?
            .ok_or(AllocationError::PoolNotFound(raffle.pool_id))?;
        let kind = number_pool
            .pool_kind()
            .map_err(|reason| AllocationError::InvalidPool {
                pool_id: number_pool.id,
                reason,
            })?;

        let held = AssignmentRepo::count_numbers_for_participant(
            &self.pool,
            raffle.id,
            intent.participant_id,
        )
        .await?;
        check_quota(raffle.max_tickets_per_user, held, intent.requested_quantity)?;

        let issued = match kind {
            PoolKind::Dedicated => {
                NumberPoolRepo::list_issued(&self.pool, number_pool.id).await?
            }
            PoolKind::Custom => Vec::new(),
        };
        let snapshot = PoolSnapshot {
            kind,
            capacity: number_pool.capacity,
            numbers_issued: number_pool.numbers_issued,
            issued: &issued,
        };
        let numbers = {
            let mut rng = rand::rng();
            snapshot.draw(intent.requested_quantity, &mut rng)
        }
        .map_err(|e| match e {
            DrawError::PoolExhausted {
                requested,
                remaining,
            } => AllocationError::PoolExhausted {
                requested,
                remaining,
            },
            other => AllocationError::InvalidPool {
                pool_id: number_pool.id,
                reason: other.to_string(),
            },
        })?;

        let outcome = AssignmentRepo::commit(
            &self.pool,
            &NewAssignment {
                payment_intent_id: intent.id,
                participant_id: intent.participant_id,
                raffle_id: raffle.id,
                pool_id: number_pool.id,
                numbers,
                expected_pool_version: number_pool.version,
            },
        )
        .await?;

        Ok(match outcome {
            CommitOutcome::Committed(assignment) => Attempt::Done(Allocation {
                assignment,
                created: true,
            }),
            CommitOutcome::AlreadyAssigned(assignment) => Attempt::Done(Allocation {
                assignment,
                created: false,
            }),
            CommitOutcome::PoolConflict => Attempt::Conflict,
        })
    }
}
