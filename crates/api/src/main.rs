use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use raffle_api::config::ServerConfig;
use raffle_api::router::build_app_router;
use raffle_api::state::AppState;
use raffle_engine::{Engine, ReconcileConfig};
use raffle_events::{AlertDispatcher, EventBus, EventPersistence, WebhookDelivery};
use raffle_payments::{GatewayConfig, GatewayRegistry};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "raffle_api=debug,raffle_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(addr = %config.socket_addr(), "Loaded server configuration");

    let reconcile = ReconcileConfig::from_env().expect("Invalid reconciliation configuration");
    let gateway_config = GatewayConfig::from_env();
    let gateways =
        GatewayRegistry::from_config(&gateway_config).expect("Failed to build payment gateways");
    tracing::info!(providers = ?gateways.providers(), "Payment gateways registered");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = raffle_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    raffle_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    raffle_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());

    let persistence_handle = tokio::spawn(EventPersistence::run(
        pool.clone(),
        event_bus.subscribe(),
    ));

    // Redirects and webhooks can raise alerts in this process too.
    let alert_cancel = tokio_util::sync::CancellationToken::new();
    let alert_handle = std::env::var("ALERT_WEBHOOK_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
        .map(|url| {
            tokio::spawn(
                AlertDispatcher::new(url, WebhookDelivery::new())
                    .run(event_bus.subscribe(), alert_cancel.clone()),
            )
        });

    tracing::info!(
        alert_webhook = alert_handle.is_some(),
        "Event services started"
    );

    // --- App state ---
    let engine = Engine::new(pool.clone(), Arc::clone(&event_bus), gateways, reconcile);
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
        event_bus: Arc::clone(&event_bus),
        stripe_webhook_secret: gateway_config.stripe_webhook_secret.map(Arc::from),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = config.socket_addr();
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    let drain = config.shutdown_timeout;

    alert_cancel.cancel();
    if let Some(handle) = alert_handle {
        let _ = tokio::time::timeout(drain, handle).await;
    }

    // Persistence exits once the last bus sender is dropped. The router
    // (and with it the engine's handle) is gone after `serve` returns.
    drop(event_bus);
    let _ = tokio::time::timeout(drain, persistence_handle).await;
    tracing::info!("Event services shut down");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
