use std::sync::Arc;

use raffle_engine::Engine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: inner data is behind `Arc` or is already `Clone`.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: raffle_db::DbPool,
    /// Server configuration (read by the auth extractors).
    pub config: Arc<ServerConfig>,
    /// Allocation, tracking and reconciliation services.
    pub engine: Engine,
    /// Event bus shared with the engine. Result-page sockets subscribe here.
    pub event_bus: Arc<raffle_events::EventBus>,
    /// `STRIPE_WEBHOOK_SECRET`. Stripe webhooks are refused without it.
    pub stripe_webhook_secret: Option<Arc<str>>,
}
