//! Checkout: creating payment intents and the result-page read model.

use raffle_core::checkout_view::CheckoutView;
use raffle_core::money::order_total_cents;
use raffle_core::pool::PoolSnapshot;
use raffle_core::provider::PaymentProvider;
use raffle_core::quota::{check_quota, QuotaExceeded};
use raffle_core::status::{IntentStatus, RaffleStatus};
use raffle_core::types::{DbId, IntentId};
use raffle_db::models::assignment::Assignment;
use raffle_db::models::payment_intent::{NewPaymentIntent, PaymentIntent};
use raffle_db::models::prize::PrizeTag;
use raffle_db::repositories::{
    AssignmentRepo, NumberPoolRepo, PaymentIntentRepo, PrizeTagRepo, RaffleRepo,
};
use raffle_db::DbPool;
use raffle_events::bus::names;
use raffle_events::{EventBus, PlatformEvent};
use raffle_payments::GatewayRegistry;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Raffle {0} not found")]
    RaffleNotFound(DbId),

    #[error("Raffle is '{status}' and not accepting purchases")]
    RaffleNotActive { status: String },

    #[error("Quantity must be at least 1, got {0}")]
    InvalidQuantity(i32),

    #[error("Order total overflows")]
    AmountOverflow,

    #[error("Payment provider '{0}' is not available")]
    ProviderNotConfigured(PaymentProvider),

    #[error(transparent)]
    QuotaExceeded(#[from] QuotaExceeded),

    #[error("Only {remaining} numbers remain, requested {requested}")]
    PoolExhausted { requested: i32, remaining: i32 },

    /// The idempotency key was already used with different parameters.
    #[error("Payment intent {0} already exists with different parameters")]
    KeyReused(IntentId),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Body of `POST /api/v1/checkout/intents`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    /// Client-generated idempotency key.
    pub id: IntentId,
    pub participant_id: DbId,
    pub raffle_id: DbId,
    pub requested_quantity: i32,
    pub provider: PaymentProvider,
}

/// Create (or return the existing) pending intent for a checkout.
///
/// Returns the intent and whether this call created it. Pre-checks here are
/// advisory: allocation re-checks quota and capacity when the payment lands.
pub async fn create_intent(
    pool: &DbPool,
    bus: &EventBus,
    gateways: &GatewayRegistry,
    request: &CheckoutRequest,
) -> Result<(PaymentIntent, bool), CheckoutError> {
    if request.requested_quantity < 1 {
        return Err(CheckoutError::InvalidQuantity(request.requested_quantity));
    }

    let raffle = RaffleRepo::find_by_id(pool, request.raffle_id)
        .await?
        .ok_or(CheckoutError::RaffleNotFound(request.raffle_id))?;
    let amount_cents = order_total_cents(raffle.price_cents, request.requested_quantity)
        .ok_or(CheckoutError::AmountOverflow)?;

    let input = NewPaymentIntent {
        id: request.id,
        tenant_id: raffle.tenant_id,
        participant_id: request.participant_id,
        raffle_id: raffle.id,
        provider: request.provider,
        requested_quantity: request.requested_quantity,
        amount_cents,
    };

    // A retried submission returns what the first one created, even if the
    // raffle has since stopped selling.
    if let Some(existing) = PaymentIntentRepo::find_by_id(pool, request.id).await? {
        return reuse(existing, &input);
    }

    let status = raffle.status();
    if !status.is_some_and(RaffleStatus::accepts_purchases) {
        return Err(CheckoutError::RaffleNotActive {
            status: status
                .map(|s| s.name().to_string())
                .unwrap_or_else(|| raffle.status_id.to_string()),
        });
    }

    if !gateways.is_configured(request.provider) {
        return Err(CheckoutError::ProviderNotConfigured(request.provider));
    }

    let held =
        AssignmentRepo::count_numbers_for_participant(pool, raffle.id, request.participant_id)
            .await?;
    check_quota(raffle.max_tickets_per_user, held, request.requested_quantity)?;

    if let Some(number_pool) = NumberPoolRepo::find_by_id(pool, raffle.pool_id).await? {
        if let Ok(kind) = number_pool.pool_kind() {
            let snapshot = PoolSnapshot {
                kind,
                capacity: number_pool.capacity,
                numbers_issued: number_pool.numbers_issued,
                issued: &[],
            };
            if let Some(remaining) = snapshot.remaining() {
                if request.requested_quantity > remaining {
                    return Err(CheckoutError::PoolExhausted {
                        requested: request.requested_quantity,
                        remaining,
                    });
                }
            }
        }
    }

    let (intent, created) = PaymentIntentRepo::create_idempotent(pool, &input).await?;
    if !created {
        return reuse(intent, &input);
    }

    tracing::info!(
        intent_id = %intent.id,
        raffle_id = intent.raffle_id,
        participant_id = intent.participant_id,
        provider = %intent.provider,
        quantity = intent.requested_quantity,
        amount_cents = intent.amount_cents,
        "Payment intent created"
    );
    bus.publish(
        PlatformEvent::new(names::INTENT_CREATED)
            .for_intent(intent.id)
            .with_payload(serde_json::json!({
                "raffle_id": intent.raffle_id,
                "provider": intent.provider,
                "requested_quantity": intent.requested_quantity,
                "amount_cents": intent.amount_cents,
            })),
    );
    Ok((intent, true))
}

fn reuse(
    existing: PaymentIntent,
    input: &NewPaymentIntent,
) -> Result<(PaymentIntent, bool), CheckoutError> {
    if existing.matches(input) {
        Ok((existing, false))
    } else {
        Err(CheckoutError::KeyReused(existing.id))
    }
}

// ---------------------------------------------------------------------------
// Read model
// ---------------------------------------------------------------------------

/// Everything the result page renders for one intent.
#[derive(Debug, Clone, Serialize)]
pub struct IntentSnapshot {
    pub intent: PaymentIntent,
    pub assignment: Option<Assignment>,
    pub prizes: Vec<PrizeTag>,
    pub view: CheckoutView,
    pub message: &'static str,
}

impl IntentSnapshot {
    pub fn is_final(&self) -> bool {
        self.view.is_final()
    }
}

/// Point-in-time read of an intent, its assignment and prize tags.
pub async fn load_snapshot(
    pool: &DbPool,
    intent_id: IntentId,
) -> Result<Option<IntentSnapshot>, sqlx::Error> {
    let Some(intent) = PaymentIntentRepo::find_by_id(pool, intent_id).await? else {
        return Ok(None);
    };
    let assignment = AssignmentRepo::find_by_intent(pool, intent_id).await?;
    let prizes = match &assignment {
        Some(a) => PrizeTagRepo::list_for_assignment(pool, a.id).await?,
        None => Vec::new(),
    };
    let status = intent.status().unwrap_or(IntentStatus::Pending);
    let view = CheckoutView::derive(status, assignment.is_some());
    Ok(Some(IntentSnapshot {
        intent,
        assignment,
        prizes,
        view,
        message: view.message(),
    }))
}
