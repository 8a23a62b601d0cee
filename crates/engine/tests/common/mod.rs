//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use raffle_core::backoff::RetryPolicy;
use raffle_core::provider::PaymentProvider;
use raffle_core::status::RaffleStatus;
use raffle_core::types::IntentId;
use raffle_db::models::payment_intent::{NewPaymentIntent, PaymentIntent};
use raffle_db::models::raffle::{CreateRaffle, Raffle};
use raffle_db::repositories::{PaymentIntentRepo, RaffleRepo};
use raffle_engine::{Engine, ReconcileConfig};
use raffle_events::EventBus;
use raffle_payments::transfer::TransferGateway;
use raffle_payments::{
    GatewayError, GatewayRegistry, LookupRequest, PaymentGateway, ProviderStatus,
};
use sqlx::PgPool;

pub const TENANT: i64 = 1;
pub const PRICE_CENTS: i64 = 250;

// ---------------------------------------------------------------------------
// Stub gateway
// ---------------------------------------------------------------------------

/// In-process provider whose answer is set by the test.
pub struct StubGateway {
    provider: PaymentProvider,
    status: Mutex<ProviderStatus>,
    calls: AtomicUsize,
}

impl StubGateway {
    pub fn new(provider: PaymentProvider, status: ProviderStatus) -> Arc<Self> {
        Arc::new(Self {
            provider,
            status: Mutex::new(status),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, status: ProviderStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    async fn lookup(&self, _request: LookupRequest<'_>) -> Result<ProviderStatus, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone())
    }
}

pub fn captured(reference: &str, amount_cents: Option<i64>) -> ProviderStatus {
    ProviderStatus::Captured {
        reference: reference.to_string(),
        amount_cents,
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Config with immediate fallback windows and enough allocation attempts
/// that contention in tests always resolves.
pub fn test_config() -> ReconcileConfig {
    ReconcileConfig {
        retry: RetryPolicy {
            max_attempts: 30,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(20),
        },
        stripe_timeout: Duration::ZERO,
        paypal_timeout: Duration::ZERO,
        payphone_timeout: Duration::ZERO,
        transfer_timeout: Duration::ZERO,
        fallback_grace: Duration::ZERO,
        unallocated_retry_after: Duration::ZERO,
        ..ReconcileConfig::default()
    }
}

pub fn engine_with(pool: &PgPool, stubs: &[&Arc<StubGateway>]) -> Engine {
    let mut registry = GatewayRegistry::new();
    registry.register(Arc::new(TransferGateway));
    for stub in stubs {
        let gateway: Arc<dyn PaymentGateway> = (*stub).clone();
        registry.register(gateway);
    }
    Engine::new(
        pool.clone(),
        Arc::new(EventBus::default()),
        registry,
        test_config(),
    )
}

pub fn engine(pool: &PgPool) -> Engine {
    engine_with(pool, &[])
}

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

pub struct RaffleSetup {
    pub total_numbers: i32,
    pub max_tickets_per_user: Option<i32>,
    pub prize_rules: Option<serde_json::Value>,
    pub custom_pool_id: Option<i64>,
}

impl Default for RaffleSetup {
    fn default() -> Self {
        Self {
            total_numbers: 100,
            max_tickets_per_user: None,
            prize_rules: None,
            custom_pool_id: None,
        }
    }
}

/// Create an active raffle.
pub async fn active_raffle(pool: &PgPool, setup: RaffleSetup) -> Raffle {
    let input = CreateRaffle {
        title: "Weekend draw".to_string(),
        price_cents: PRICE_CENTS,
        total_numbers: setup.total_numbers,
        min_tickets_to_activate: None,
        max_tickets_per_user: setup.max_tickets_per_user,
        draw_date: None,
        prize_rules: setup.prize_rules,
        custom_pool_id: setup.custom_pool_id,
    };
    let raffle = RaffleRepo::create(pool, TENANT, &input).await.unwrap();
    RaffleRepo::transition_status(pool, raffle.id, RaffleStatus::Draft, RaffleStatus::Active)
        .await
        .unwrap()
        .unwrap()
}

pub async fn pending_intent(
    pool: &PgPool,
    raffle: &Raffle,
    participant_id: i64,
    quantity: i32,
    provider: PaymentProvider,
) -> PaymentIntent {
    let input = NewPaymentIntent {
        id: IntentId::new_v4(),
        tenant_id: raffle.tenant_id,
        participant_id,
        raffle_id: raffle.id,
        provider,
        requested_quantity: quantity,
        amount_cents: raffle.price_cents * i64::from(quantity),
    };
    PaymentIntentRepo::create_idempotent(pool, &input).await.unwrap().0
}

/// A pending intent already marked completed, without allocation.
pub async fn completed_intent(
    pool: &PgPool,
    raffle: &Raffle,
    participant_id: i64,
    quantity: i32,
) -> PaymentIntent {
    let intent = pending_intent(pool, raffle, participant_id, quantity, PaymentProvider::Stripe).await;
    PaymentIntentRepo::mark_completed(pool, intent.id, &format!("pi_{}", intent.id.simple()))
        .await
        .unwrap()
        .unwrap()
}
