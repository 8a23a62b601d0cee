//! HTTP-level tests for provider webhooks.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{
    active_raffle, body_json, build_test_app_with, captured, expect_status, post_json, send,
    StubGateway, STRIPE_WEBHOOK_SECRET,
};
use raffle_core::provider::PaymentProvider;
use raffle_core::signature::sign_header;
use raffle_core::status::IntentStatus;
use raffle_db::models::payment_intent::NewPaymentIntent;
use raffle_db::repositories::{AssignmentRepo, PaymentIntentRepo};
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

fn session_event(session_id: &str, intent_id: Uuid) -> serde_json::Value {
    json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "object": "checkout.session",
                "id": session_id,
                "client_reference_id": intent_id.to_string(),
                "payment_status": "paid"
            }
        }
    })
}

fn stripe_request(body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/stripe")
        .header("Content-Type", "application/json");
    if let Some(signature) = signature {
        builder = builder.header("Stripe-Signature", signature);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn pending_stripe_intent(pool: &PgPool, quantity: i32) -> Uuid {
    let raffle = active_raffle(pool, 100).await;
    let input = NewPaymentIntent {
        id: Uuid::new_v4(),
        tenant_id: raffle.tenant_id,
        participant_id: 7,
        raffle_id: raffle.id,
        provider: PaymentProvider::Stripe,
        requested_quantity: quantity,
        amount_cents: raffle.price_cents * i64::from(quantity),
    };
    PaymentIntentRepo::create_idempotent(pool, &input)
        .await
        .unwrap()
        .0
        .id
}

// ---------------------------------------------------------------------------
// Test: signed Stripe webhook resolves and allocates, duplicates are no-ops
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_signed_stripe_webhook_completes_intent(pool: PgPool) {
    let intent_id = pending_stripe_intent(&pool, 4).await;
    let stripe = StubGateway::new(PaymentProvider::Stripe, captured("cs_hook"));
    let body = session_event("cs_hook", intent_id).to_string();

    for _ in 0..2 {
        let signature = sign_header(
            STRIPE_WEBHOOK_SECRET,
            chrono::Utc::now().timestamp(),
            body.as_bytes(),
        );
        let response = send(
            build_test_app_with(pool.clone(), &[&stripe]),
            stripe_request(&body, Some(signature)),
        )
        .await;
        let json = expect_status(response, StatusCode::OK).await;
        assert_eq!(json["data"]["intent_id"], intent_id.to_string());
        assert_eq!(json["data"]["status"], "completed");
    }

    // The second delivery found the intent resolved and never asked the provider.
    assert_eq!(stripe.calls(), 1);
    let assignment = AssignmentRepo::find_by_intent(&pool, intent_id)
        .await
        .unwrap()
        .expect("assignment");
    assert_eq!(assignment.numbers.len(), 4);
}

// ---------------------------------------------------------------------------
// Test: bad or missing signatures are rejected before any lookup
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_stripe_webhook_signature_is_enforced(pool: PgPool) {
    let intent_id = pending_stripe_intent(&pool, 1).await;
    let stripe = StubGateway::new(PaymentProvider::Stripe, captured("cs_x"));
    let body = session_event("cs_x", intent_id).to_string();

    let unsigned = send(
        build_test_app_with(pool.clone(), &[&stripe]),
        stripe_request(&body, None),
    )
    .await;
    assert_eq!(unsigned.status(), StatusCode::BAD_REQUEST);

    let forged = sign_header("whsec_wrong", chrono::Utc::now().timestamp(), body.as_bytes());
    let response = send(
        build_test_app_with(pool.clone(), &[&stripe]),
        stripe_request(&body, Some(forged)),
    )
    .await;
    let json = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert_eq!(json["code"], "INVALID_SIGNATURE");

    let stale = sign_header(
        STRIPE_WEBHOOK_SECRET,
        chrono::Utc::now().timestamp() - 3600,
        body.as_bytes(),
    );
    let response = send(
        build_test_app_with(pool.clone(), &[&stripe]),
        stripe_request(&body, Some(stale)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(stripe.calls(), 0);
    let intent = PaymentIntentRepo::find_by_id(&pool, intent_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(intent.status(), Some(IntentStatus::Pending));
}

// ---------------------------------------------------------------------------
// Test: PayPal events that name no intent of ours are acknowledged and ignored
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_paypal_webhook_for_unknown_intent_is_ignored(pool: PgPool) {
    let paypal = StubGateway::new(PaymentProvider::Paypal, captured("ORDER-1"));
    let event = json!({
        "event_type": "CHECKOUT.ORDER.APPROVED",
        "resource": {
            "id": "ORDER-1",
            "purchase_units": [{ "custom_id": Uuid::new_v4().to_string() }]
        }
    });

    let response = post_json(
        build_test_app_with(pool, &[&paypal]),
        "/api/v1/webhooks/paypal",
        event,
    )
    .await;
    let json = body_json(response).await;
    assert_eq!(json["data"]["received"], true);
    assert!(json["data"]["intent_id"].is_null());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_malformed_webhook_body_is_bad_request(pool: PgPool) {
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/paypal")
        .body(Body::from("not json"))
        .unwrap();
    let response = send(build_test_app_with(pool, &[]), request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
