//! Checkout intent creation and the result-page read model.

mod common;

use assert_matches::assert_matches;
use common::{active_raffle, engine, RaffleSetup, TENANT};
use raffle_core::checkout_view::CheckoutView;
use raffle_core::provider::PaymentProvider;
use raffle_core::status::IntentStatus;
use raffle_core::types::IntentId;
use raffle_db::models::raffle::CreateRaffle;
use raffle_db::repositories::RaffleRepo;
use raffle_engine::checkout::{create_intent, load_snapshot, CheckoutError, CheckoutRequest};
use raffle_engine::Outcome;
use raffle_payments::GatewayRegistry;
use sqlx::PgPool;

fn transfer_only() -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    registry.register(std::sync::Arc::new(raffle_payments::transfer::TransferGateway));
    registry
}

fn request(raffle_id: i64, quantity: i32) -> CheckoutRequest {
    CheckoutRequest {
        id: IntentId::new_v4(),
        participant_id: 12,
        raffle_id,
        requested_quantity: quantity,
        provider: PaymentProvider::Transfer,
    }
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_intent_computes_amount_and_is_idempotent(pool: PgPool) {
    let engine = engine(&pool);
    let gateways = transfer_only();
    let raffle = active_raffle(&pool, RaffleSetup::default()).await;
    let req = request(raffle.id, 4);

    let (intent, created) = create_intent(&pool, &engine.bus, &gateways, &req)
        .await
        .unwrap();
    assert!(created);
    assert_eq!(intent.id, req.id);
    assert_eq!(intent.amount_cents, raffle.price_cents * 4);
    assert_eq!(intent.status(), Some(IntentStatus::Pending));
    assert_eq!(intent.tenant_id, TENANT);

    let (again, created) = create_intent(&pool, &engine.bus, &gateways, &req)
        .await
        .unwrap();
    assert!(!created);
    assert_eq!(again, intent);

    let changed = CheckoutRequest {
        requested_quantity: 5,
        ..req.clone()
    };
    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &changed).await,
        Err(CheckoutError::KeyReused(id)) if id == req.id
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_intent_rejections(pool: PgPool) {
    let engine = engine(&pool);
    let gateways = transfer_only();
    let raffle = active_raffle(
        &pool,
        RaffleSetup {
            total_numbers: 10,
            max_tickets_per_user: Some(8),
            ..RaffleSetup::default()
        },
    )
    .await;

    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &request(raffle.id, 0)).await,
        Err(CheckoutError::InvalidQuantity(0))
    );
    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &request(9_999, 1)).await,
        Err(CheckoutError::RaffleNotFound(9_999))
    );

    let card = CheckoutRequest {
        provider: PaymentProvider::Stripe,
        ..request(raffle.id, 1)
    };
    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &card).await,
        Err(CheckoutError::ProviderNotConfigured(PaymentProvider::Stripe))
    );

    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &request(raffle.id, 9)).await,
        Err(CheckoutError::QuotaExceeded(_))
    );

    let draft = RaffleRepo::create(
        &pool,
        TENANT,
        &CreateRaffle {
            title: "Not yet".to_string(),
            price_cents: 100,
            total_numbers: 10,
            min_tickets_to_activate: None,
            max_tickets_per_user: None,
            draw_date: None,
            prize_rules: None,
            custom_pool_id: None,
        },
    )
    .await
    .unwrap();
    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &request(draft.id, 1)).await,
        Err(CheckoutError::RaffleNotActive { ref status }) if status == "draft"
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_intent_checks_remaining_capacity(pool: PgPool) {
    let engine = engine(&pool);
    let gateways = transfer_only();
    let raffle = active_raffle(
        &pool,
        RaffleSetup {
            total_numbers: 10,
            ..RaffleSetup::default()
        },
    )
    .await;

    let first = common::completed_intent(&pool, &raffle, 1, 7).await;
    engine.tracker.allocator().allocate(first.id).await.unwrap();

    assert_matches!(
        create_intent(&pool, &engine.bus, &gateways, &request(raffle.id, 4)).await,
        Err(CheckoutError::PoolExhausted {
            requested: 4,
            remaining: 3
        })
    );
    assert!(create_intent(&pool, &engine.bus, &gateways, &request(raffle.id, 3))
        .await
        .is_ok());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_snapshot_tracks_result_page_state(pool: PgPool) {
    let engine = engine(&pool);
    let gateways = transfer_only();
    let raffle = active_raffle(&pool, RaffleSetup::default()).await;
    let req = request(raffle.id, 2);
    let (intent, _) = create_intent(&pool, &engine.bus, &gateways, &req)
        .await
        .unwrap();

    let pending = load_snapshot(&pool, intent.id).await.unwrap().unwrap();
    assert_eq!(pending.view, CheckoutView::Processing);
    assert!(!pending.is_final());
    assert!(pending.assignment.is_none());

    engine
        .tracker
        .resolve(
            intent.id,
            Outcome::Completed {
                provider_reference: "BANK-9".to_string(),
            },
        )
        .await
        .unwrap();

    let confirmed = load_snapshot(&pool, intent.id).await.unwrap().unwrap();
    assert_eq!(confirmed.view, CheckoutView::Confirmed);
    assert!(confirmed.is_final());
    assert_eq!(confirmed.assignment.unwrap().numbers.len(), 2);

    assert!(load_snapshot(&pool, IntentId::new_v4())
        .await
        .unwrap()
        .is_none());
}
