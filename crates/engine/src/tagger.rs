//! Winner/prize tagging.
//!
//! Runs after allocation and marks prize-bearing numbers per the raffle's
//! rules. Tagging is best-effort metadata: a failure here is logged and
//! alerted but never touches the assignment.

use std::sync::Arc;

use raffle_core::alert::ALERT_PRIZE_TAGGING_FAILED;
use raffle_core::prize::{evaluate, parse_rules, PrizeHit, PrizeRuleError, TaggingContext};
use raffle_core::types::DbId;
use raffle_db::models::assignment::Assignment;
use raffle_db::repositories::{AssignmentRepo, PrizeTagRepo, RaffleRepo};
use raffle_db::DbPool;
use raffle_events::bus::names;
use raffle_events::{EventBus, PlatformEvent};

use crate::alerts;

#[derive(Debug, thiserror::Error)]
pub enum TaggingError {
    #[error("Raffle {0} not found")]
    RaffleNotFound(DbId),

    #[error(transparent)]
    Rules(#[from] PrizeRuleError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagOutcome {
    /// Rules were evaluated for the first time.
    Tagged { hits: Vec<PrizeHit>, inserted: i32 },
    /// A previous run already recorded the evaluation.
    AlreadyEvaluated,
}

#[derive(Clone)]
pub struct PrizeTagger {
    pool: DbPool,
    bus: Arc<EventBus>,
}

impl PrizeTagger {
    pub fn new(pool: DbPool, bus: Arc<EventBus>) -> Self {
        Self { pool, bus }
    }

    /// Evaluate the raffle's rules against `assignment` once.
    pub async fn tag(&self, assignment: &Assignment) -> Result<TagOutcome, TaggingError> {
        if PrizeTagRepo::is_evaluated(&self.pool, assignment.id).await? {
            return Ok(TagOutcome::AlreadyEvaluated);
        }

        let raffle = RaffleRepo::find_by_id(&self.pool, assignment.raffle_id)
            .await?
            .ok_or(TaggingError::RaffleNotFound(assignment.raffle_id))?;

        let hits = match self.evaluate(&raffle.prize_rules, assignment).await {
            Ok(hits) => hits,
            Err(TaggingError::Rules(e)) => {
                self.report_misconfiguration(raffle.tenant_id, assignment, &e)
                    .await;
                return Err(e.into());
            }
            Err(e) => return Err(e),
        };

        let Some(inserted) = PrizeTagRepo::record_evaluation(
            &self.pool,
            assignment.id,
            assignment.raffle_id,
            &hits,
        )
        .await?
        else {
            return Ok(TagOutcome::AlreadyEvaluated);
        };

        if !hits.is_empty() {
            tracing::info!(
                assignment_id = assignment.id,
                raffle_id = assignment.raffle_id,
                hits = hits.len(),
                inserted,
                "Prize numbers tagged"
            );
        }

        self.bus.publish(
            PlatformEvent::new(names::PRIZES_TAGGED)
                .for_intent(assignment.payment_intent_id)
                .with_payload(serde_json::json!({
                    "assignment_id": assignment.id,
                    "raffle_id": assignment.raffle_id,
                    "hits": hits,
                })),
        );

        Ok(TagOutcome::Tagged { hits, inserted })
    }

    /// [`tag`](Self::tag), logging instead of returning failures.
    pub async fn tag_best_effort(&self, assignment: &Assignment) {
        if let Err(e) = self.tag(assignment).await {
            tracing::warn!(
                assignment_id = assignment.id,
                error = %e,
                "Prize tagging failed; assignment unaffected"
            );
        }
    }

    async fn evaluate(
        &self,
        rules: &serde_json::Value,
        assignment: &Assignment,
    ) -> Result<Vec<PrizeHit>, TaggingError> {
        if rules.is_null() {
            return Ok(Vec::new());
        }
        let rules = parse_rules(rules)?;
        if rules.is_empty() {
            return Ok(Vec::new());
        }

        let ctx = TaggingContext {
            largest_earlier_purchase: AssignmentRepo::largest_earlier_purchase(
                &self.pool,
                assignment.raffle_id,
                assignment.id,
            )
            .await?,
        };
        Ok(evaluate(&rules, &assignment.numbers, &ctx)?)
    }

    async fn report_misconfiguration(
        &self,
        tenant_id: DbId,
        assignment: &Assignment,
        error: &PrizeRuleError,
    ) {
        let raised = alerts::raise(
            &self.pool,
            &self.bus,
            tenant_id,
            Some(assignment.payment_intent_id),
            ALERT_PRIZE_TAGGING_FAILED,
            format!(
                "Prize rules for raffle {} could not be applied: {error}",
                assignment.raffle_id
            ),
            serde_json::json!({
                "assignment_id": assignment.id,
                "raffle_id": assignment.raffle_id,
            }),
        )
        .await;
        if let Err(e) = raised {
            tracing::error!(assignment_id = assignment.id, error = %e, "Failed to raise tagging alert");
        }
    }
}
