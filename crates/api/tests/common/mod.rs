//! Shared fixtures for API integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use raffle_api::auth::jwt::{generate_access_token, JwtConfig};
use raffle_api::config::ServerConfig;
use raffle_api::router::build_app_router;
use raffle_api::state::AppState;
use raffle_core::backoff::RetryPolicy;
use raffle_core::provider::PaymentProvider;
use raffle_core::status::RaffleStatus;
use raffle_db::models::raffle::{CreateRaffle, Raffle};
use raffle_db::repositories::RaffleRepo;
use raffle_engine::{Engine, ReconcileConfig};
use raffle_events::EventBus;
use raffle_payments::transfer::TransferGateway;
use raffle_payments::{
    GatewayError, GatewayRegistry, LookupRequest, PaymentGateway, ProviderStatus,
};
use sqlx::PgPool;
use tower::ServiceExt;

pub const TENANT: i64 = 1;
pub const PRICE_CENTS: i64 = 250;
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";
const JWT_SECRET: &str = "test-secret-that-is-long-enough-for-hmac";

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

pub fn captured(reference: &str) -> ProviderStatus {
    ProviderStatus::Captured {
        reference: reference.to_string(),
        amount_cents: None,
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: std::net::Ipv4Addr::LOCALHOST.into(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout: Duration::from_secs(30),
        shutdown_timeout: Duration::from_secs(30),
        jwt: JwtConfig {
            secret: JWT_SECRET.to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

fn reconcile_config() -> ReconcileConfig {
    ReconcileConfig {
        retry: RetryPolicy {
            max_attempts: 30,
            base_delay: Duration::from_millis(2),
            max_delay: Duration::from_millis(20),
        },
        ..ReconcileConfig::default()
    }
}

/// Full router with the production middleware stack. Bank transfer is
/// always available; other providers only when a stub is passed.
pub fn build_test_app_with(pool: PgPool, stubs: &[&Arc<StubGateway>]) -> Router {
    build_test_app_and_engine(pool, stubs).0
}

/// Router plus the engine behind it, sharing one event bus.
pub fn build_test_app_and_engine(pool: PgPool, stubs: &[&Arc<StubGateway>]) -> (Router, Engine) {
    let config = test_config();
    let mut registry = GatewayRegistry::new();
    registry.register(Arc::new(TransferGateway));
    for stub in stubs {
        let gateway: Arc<dyn PaymentGateway> = (*stub).clone();
        registry.register(gateway);
    }

    let event_bus = Arc::new(EventBus::default());
    let engine = Engine::new(
        pool.clone(),
        Arc::clone(&event_bus),
        registry,
        reconcile_config(),
    );
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine: engine.clone(),
        event_bus,
        stripe_webhook_secret: Some(Arc::from(STRIPE_WEBHOOK_SECRET)),
    };
    (build_app_router(state, &config), engine)
}

pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_with(pool, &[])
}

pub fn token(role: &str) -> String {
    generate_access_token(99, TENANT, role, &test_config().jwt).unwrap()
}

pub fn token_for_tenant(role: &str, tenant_id: i64) -> String {
    generate_access_token(99, tenant_id, role, &test_config().jwt).unwrap()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response<Body> {
    let request = Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

fn json_request(
    method: &str,
    uri: &str,
    body: &serde_json::Value,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json");
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    send(app, json_request("POST", uri, &body, None)).await
}

pub async fn post_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request("POST", uri, &body, Some(token))).await
}

pub async fn put_json_auth(
    app: Router,
    uri: &str,
    body: serde_json::Value,
    token: &str,
) -> Response<Body> {
    send(app, json_request("PUT", uri, &body, Some(token))).await
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn expect_status(response: Response<Body>, status: StatusCode) -> serde_json::Value {
    assert_eq!(response.status(), status);
    body_json(response).await
}

// ---------------------------------------------------------------------------
// Seed data
// ---------------------------------------------------------------------------

pub async fn draft_raffle(pool: &PgPool, total_numbers: i32, max_per_user: Option<i32>) -> Raffle {
    let input = CreateRaffle {
        title: "Weekend draw".to_string(),
        price_cents: PRICE_CENTS,
        total_numbers,
        min_tickets_to_activate: None,
        max_tickets_per_user: max_per_user,
        draw_date: None,
        prize_rules: None,
        custom_pool_id: None,
    };
    RaffleRepo::create(pool, TENANT, &input).await.unwrap()
}

pub async fn active_raffle(pool: &PgPool, total_numbers: i32) -> Raffle {
    let raffle = draft_raffle(pool, total_numbers, None).await;
    RaffleRepo::transition_status(pool, raffle.id, RaffleStatus::Draft, RaffleStatus::Active)
        .await
        .unwrap()
        .unwrap()
}
