//! Route definitions for buyer checkout.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::checkout;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/checkout`.
///
/// ```text
/// POST /intents                -> create_intent
/// GET  /intents/{id}           -> get_intent
/// GET  /intents/{id}/ws        -> intent_feed_handler (WebSocket)
/// POST /intents/{id}/return    -> provider_return
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/intents", post(checkout::create_intent))
        .route("/intents/{id}", get(checkout::get_intent))
        .route("/intents/{id}/ws", get(ws::intent_feed_handler))
        .route("/intents/{id}/return", post(checkout::provider_return))
}
