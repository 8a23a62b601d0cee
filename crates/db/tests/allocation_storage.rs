//! Integration tests for the storage half of allocation: the transactional
//! commit, intent compare-and-swap updates and pool management.

use assert_matches::assert_matches;
use raffle_core::alert::{AlertSeverity, ALERT_UNALLOCATED, ALERT_UNDERPAID};
use raffle_core::provider::PaymentProvider;
use raffle_core::status::IntentStatus;
use raffle_db::models::assignment::{CommitOutcome, NewAssignment};
use raffle_db::models::operator_alert::NewOperatorAlert;
use raffle_db::models::payment_intent::{NewPaymentIntent, PaymentIntent};
use raffle_db::models::raffle::{CreateRaffle, Raffle};
use raffle_db::is_unique_violation;
use raffle_db::repositories::payment_intent_repo::UQ_PROVIDER_REFERENCE;
use raffle_db::repositories::{
    AssignmentRepo, NumberPoolRepo, OperatorAlertRepo, PaymentIntentRepo, RaffleRepo,
};
use sqlx::PgPool;
use uuid::Uuid;

const TENANT: i64 = 1;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn alert_for(intent: &PaymentIntent) -> NewOperatorAlert {
    NewOperatorAlert {
        tenant_id: intent.tenant_id,
        payment_intent_id: Some(intent.id),
        kind: ALERT_UNALLOCATED.to_string(),
        severity: AlertSeverity::Critical,
        message: "captured without numbers".to_string(),
        details: serde_json::json!({}),
    }
}

async fn new_raffle(pool: &PgPool, total_numbers: i32) -> Raffle {
    let input = CreateRaffle {
        title: "Spring draw".to_string(),
        price_cents: 500,
        total_numbers,
        min_tickets_to_activate: None,
        max_tickets_per_user: None,
        draw_date: None,
        prize_rules: None,
        custom_pool_id: None,
    };
    RaffleRepo::create(pool, TENANT, &input).await.unwrap()
}

async fn new_intent(pool: &PgPool, raffle: &Raffle, quantity: i32) -> PaymentIntent {
    let input = NewPaymentIntent {
        id: Uuid::new_v4(),
        tenant_id: TENANT,
        participant_id: 42,
        raffle_id: raffle.id,
        provider: PaymentProvider::Stripe,
        requested_quantity: quantity,
        amount_cents: raffle.price_cents * i64::from(quantity),
    };
    PaymentIntentRepo::create_idempotent(pool, &input).await.unwrap().0
}

fn draw_of(intent: &PaymentIntent, raffle: &Raffle, numbers: Vec<i32>, version: i64) -> NewAssignment {
    NewAssignment {
        payment_intent_id: intent.id,
        participant_id: intent.participant_id,
        raffle_id: raffle.id,
        pool_id: raffle.pool_id,
        numbers,
        expected_pool_version: version,
    }
}

// ---------------------------------------------------------------------------
// Test: raffle creation provisions a dedicated pool
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_raffle_gets_dedicated_pool(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let number_pool = NumberPoolRepo::find_by_id(&pool, raffle.pool_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(number_pool.kind, "dedicated");
    assert_eq!(number_pool.capacity, Some(100));
    assert_eq!(number_pool.numbers_issued, 0);
    assert_eq!(number_pool.version, 0);
    assert_eq!(raffle.status_id, 1); // draft
}

// ---------------------------------------------------------------------------
// Test: commit writes assignment, issued numbers, counter and back-reference
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_commit_persists_everything_atomically(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let intent = new_intent(&pool, &raffle, 3).await;

    let outcome = AssignmentRepo::commit(&pool, &draw_of(&intent, &raffle, vec![4, 17, 88], 0))
        .await
        .unwrap();
    let assignment = assert_matches!(outcome, CommitOutcome::Committed(a) => a);
    assert_eq!(assignment.numbers, vec![4, 17, 88]);

    let number_pool = NumberPoolRepo::find_by_id(&pool, raffle.pool_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(number_pool.numbers_issued, 3);
    assert_eq!(number_pool.version, 1);
    assert_eq!(
        NumberPoolRepo::list_issued(&pool, raffle.pool_id).await.unwrap(),
        vec![4, 17, 88]
    );

    let reloaded = PaymentIntentRepo::find_by_id(&pool, intent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.assignment_id, Some(assignment.id));
}

// ---------------------------------------------------------------------------
// Test: second commit for the same intent returns the first assignment
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_commit_is_unique_per_intent(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let intent = new_intent(&pool, &raffle, 2).await;

    let first = AssignmentRepo::commit(&pool, &draw_of(&intent, &raffle, vec![1, 2], 0))
        .await
        .unwrap();
    let first = assert_matches!(first, CommitOutcome::Committed(a) => a);

    let second = AssignmentRepo::commit(&pool, &draw_of(&intent, &raffle, vec![3, 4], 1))
        .await
        .unwrap();
    assert_eq!(second, CommitOutcome::AlreadyAssigned(first));

    let number_pool = NumberPoolRepo::find_by_id(&pool, raffle.pool_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(number_pool.numbers_issued, 2);
}

// ---------------------------------------------------------------------------
// Test: stale pool version and duplicate numbers write nothing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_commit_conflicts_leave_no_trace(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let a = new_intent(&pool, &raffle, 2).await;
    let b = new_intent(&pool, &raffle, 2).await;

    AssignmentRepo::commit(&pool, &draw_of(&a, &raffle, vec![10, 11], 0))
        .await
        .unwrap();

    // Stale version.
    let stale = AssignmentRepo::commit(&pool, &draw_of(&b, &raffle, vec![20, 21], 0))
        .await
        .unwrap();
    assert_eq!(stale, CommitOutcome::PoolConflict);

    // Current version but a number that is already issued.
    let duplicate = AssignmentRepo::commit(&pool, &draw_of(&b, &raffle, vec![11, 12], 1))
        .await
        .unwrap();
    assert_eq!(duplicate, CommitOutcome::PoolConflict);

    assert!(AssignmentRepo::find_by_intent(&pool, b.id).await.unwrap().is_none());
    assert_eq!(NumberPoolRepo::count_issued(&pool, raffle.pool_id).await.unwrap(), 2);
}

// ---------------------------------------------------------------------------
// Test: intent creation is idempotent on the client key
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_create_intent_idempotent(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let input = NewPaymentIntent {
        id: Uuid::new_v4(),
        tenant_id: TENANT,
        participant_id: 7,
        raffle_id: raffle.id,
        provider: PaymentProvider::Paypal,
        requested_quantity: 4,
        amount_cents: 2000,
    };

    let (first, created) = PaymentIntentRepo::create_idempotent(&pool, &input).await.unwrap();
    assert!(created);
    assert_eq!(first.status(), Some(IntentStatus::Pending));
    assert!(first.resolved_at.is_none());

    let (again, created) = PaymentIntentRepo::create_idempotent(&pool, &input).await.unwrap();
    assert!(!created);
    assert_eq!(again, first);
    assert!(again.matches(&input));
}

// ---------------------------------------------------------------------------
// Test: resolution compare-and-swap admits one winner
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_resolution_cas(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let intent = new_intent(&pool, &raffle, 1).await;

    let completed = PaymentIntentRepo::mark_completed(&pool, intent.id, "cs_123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(completed.status(), Some(IntentStatus::Completed));
    assert!(completed.resolved_at.is_some());

    assert!(PaymentIntentRepo::mark_completed(&pool, intent.id, "cs_456")
        .await
        .unwrap()
        .is_none());
    assert!(PaymentIntentRepo::mark_unsuccessful(
        &pool,
        intent.id,
        IntentStatus::Failed,
        None,
        Some("declined")
    )
    .await
    .unwrap()
    .is_none());

    let (unallocated, alert) =
        PaymentIntentRepo::mark_unallocated(&pool, intent.id, "pool exhausted", &alert_for(&intent))
            .await
            .unwrap()
            .unwrap();
    assert_eq!(unallocated.status(), Some(IntentStatus::CompletedUnallocated));
    assert_eq!(unallocated.provider_reference.as_deref(), Some("cs_123"));
    assert_eq!(alert.payment_intent_id, Some(intent.id));
    assert_eq!(alert.severity, "critical");
}

// ---------------------------------------------------------------------------
// Test: a provider reference completes one intent only
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_reference_completes_one_intent(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let first = new_intent(&pool, &raffle, 1).await;
    let second = new_intent(&pool, &raffle, 1).await;

    PaymentIntentRepo::mark_completed(&pool, first.id, "cs_shared")
        .await
        .unwrap()
        .unwrap();
    let err = PaymentIntentRepo::mark_completed(&pool, second.id, "cs_shared")
        .await
        .unwrap_err();
    assert!(is_unique_violation(&err, UQ_PROVIDER_REFERENCE));

    let stored = PaymentIntentRepo::find_by_id(&pool, second.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), Some(IntentStatus::Pending));

    // Failed attempts may share a reference.
    let declined = new_intent(&pool, &raffle, 1).await;
    assert!(PaymentIntentRepo::mark_unsuccessful(
        &pool,
        declined.id,
        IntentStatus::Failed,
        Some("cs_shared"),
        Some("declined")
    )
    .await
    .unwrap()
    .is_some());
}

// ---------------------------------------------------------------------------
// Test: an unusable capture is parked straight from pending
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_park_capture_from_pending(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let intent = new_intent(&pool, &raffle, 2).await;
    let alert = NewOperatorAlert {
        kind: ALERT_UNDERPAID.to_string(),
        ..alert_for(&intent)
    };

    let (parked, stored_alert) =
        PaymentIntentRepo::park_capture(&pool, intent.id, "pi_short", "underpaid", &alert)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(parked.status(), Some(IntentStatus::CompletedUnallocated));
    assert_eq!(parked.provider_reference.as_deref(), Some("pi_short"));
    assert_eq!(parked.failure_reason.as_deref(), Some("underpaid"));
    assert!(parked.resolved_at.is_some());
    assert_eq!(stored_alert.kind, ALERT_UNDERPAID);

    // Only a pending intent can be parked this way.
    assert!(
        PaymentIntentRepo::park_capture(&pool, intent.id, "pi_short", "underpaid", &alert)
            .await
            .unwrap()
            .is_none()
    );
}

// ---------------------------------------------------------------------------
// Test: an assigned intent can never become unallocated
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unallocated_requires_no_assignment(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let intent = new_intent(&pool, &raffle, 1).await;
    PaymentIntentRepo::mark_completed(&pool, intent.id, "ref")
        .await
        .unwrap();
    AssignmentRepo::commit(&pool, &draw_of(&intent, &raffle, vec![5], 0))
        .await
        .unwrap();

    assert!(
        PaymentIntentRepo::mark_unallocated(&pool, intent.id, "late", &alert_for(&intent))
            .await
            .unwrap()
            .is_none()
    );
    // A rejected guard writes no alert either.
    assert!(
        OperatorAlertRepo::find_open_for_intent(&pool, intent.id, ALERT_UNALLOCATED)
            .await
            .unwrap()
            .is_none()
    );
}

// ---------------------------------------------------------------------------
// Test: parking an intent and its alert commit together
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unallocated_rolls_back_without_alert(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    let intent = new_intent(&pool, &raffle, 1).await;
    PaymentIntentRepo::mark_completed(&pool, intent.id, "ref")
        .await
        .unwrap();

    sqlx::query(
        "ALTER TABLE operator_alerts ADD CONSTRAINT ck_block_unallocated \
         CHECK (kind <> 'completed_unallocated')",
    )
    .execute(&pool)
    .await
    .unwrap();

    let result =
        PaymentIntentRepo::mark_unallocated(&pool, intent.id, "pool exhausted", &alert_for(&intent))
            .await;
    assert!(result.is_err());
    let current = PaymentIntentRepo::find_by_id(&pool, intent.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(current.status(), Some(IntentStatus::Completed));
    assert!(current.failure_reason.is_none());

    sqlx::query("ALTER TABLE operator_alerts DROP CONSTRAINT ck_block_unallocated")
        .execute(&pool)
        .await
        .unwrap();
    assert!(
        PaymentIntentRepo::mark_unallocated(&pool, intent.id, "pool exhausted", &alert_for(&intent))
            .await
            .unwrap()
            .is_some()
    );
}

// ---------------------------------------------------------------------------
// Test: participant totals and earlier purchase sizes
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_participant_aggregates(pool: PgPool) {
    let raffle = new_raffle(&pool, 100).await;
    assert_eq!(
        AssignmentRepo::count_numbers_for_participant(&pool, raffle.id, 42)
            .await
            .unwrap(),
        0
    );

    let a = new_intent(&pool, &raffle, 3).await;
    let b = new_intent(&pool, &raffle, 2).await;
    let first = AssignmentRepo::commit(&pool, &draw_of(&a, &raffle, vec![1, 2, 3], 0))
        .await
        .unwrap();
    let first = assert_matches!(first, CommitOutcome::Committed(x) => x);
    let second = AssignmentRepo::commit(&pool, &draw_of(&b, &raffle, vec![7, 9], 1))
        .await
        .unwrap();
    let second = assert_matches!(second, CommitOutcome::Committed(x) => x);

    assert_eq!(
        AssignmentRepo::count_numbers_for_participant(&pool, raffle.id, 42)
            .await
            .unwrap(),
        5
    );
    assert_eq!(
        AssignmentRepo::largest_earlier_purchase(&pool, raffle.id, first.id)
            .await
            .unwrap(),
        None
    );
    assert_eq!(
        AssignmentRepo::largest_earlier_purchase(&pool, raffle.id, second.id)
            .await
            .unwrap(),
        Some(3)
    );
    assert_eq!(
        AssignmentRepo::list_for_participant(&pool, raffle.id, 42)
            .await
            .unwrap()
            .len(),
        2
    );
}

// ---------------------------------------------------------------------------
// Test: custom pools grow past advisory capacity; resize is guarded
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_custom_pool_capacity_rules(pool: PgPool) {
    let custom = NumberPoolRepo::create_custom(&pool, TENANT, Some(2))
        .await
        .unwrap();
    let input = CreateRaffle {
        title: "Leftovers".to_string(),
        price_cents: 100,
        total_numbers: 10,
        min_tickets_to_activate: None,
        max_tickets_per_user: None,
        draw_date: None,
        prize_rules: None,
        custom_pool_id: Some(custom.id),
    };
    let raffle = RaffleRepo::create(&pool, TENANT, &input).await.unwrap();
    assert_eq!(raffle.pool_id, custom.id);

    let intent = new_intent(&pool, &raffle, 3).await;
    let outcome = AssignmentRepo::commit(&pool, &draw_of(&intent, &raffle, vec![1, 2, 3], 0))
        .await
        .unwrap();
    assert_matches!(outcome, CommitOutcome::Committed(_));

    assert!(NumberPoolRepo::update_capacity(&pool, custom.id, 2)
        .await
        .unwrap()
        .is_none());
    let resized = NumberPoolRepo::update_capacity(&pool, custom.id, 50)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resized.capacity, Some(50));

    // Dedicated pools are never resized through this path.
    let dedicated = new_raffle(&pool, 10).await;
    assert!(NumberPoolRepo::update_capacity(&pool, dedicated.pool_id, 500)
        .await
        .unwrap()
        .is_none());
}
