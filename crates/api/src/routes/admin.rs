//! Route definitions for operator endpoints. Authorization is enforced by
//! the handlers' RBAC extractors.

use axum::routing::{get, post, put};
use axum::Router;

use crate::handlers::admin;
use crate::state::AppState;

/// Routes mounted at `/admin`.
///
/// ```text
/// GET  /alerts                           -> list_alerts        (operator)
/// POST /alerts/{id}/acknowledge          -> acknowledge_alert  (admin)
/// GET  /intents                          -> list_intents       (operator, ?status=)
/// POST /intents/{id}/confirm-transfer    -> confirm_transfer   (admin)
/// POST /pools                            -> create_pool        (admin)
/// PUT  /pools/{id}/capacity              -> resize_pool        (admin)
/// POST /raffles/{id}/status              -> transition_raffle  (admin)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(admin::list_alerts))
        .route("/alerts/{id}/acknowledge", post(admin::acknowledge_alert))
        .route("/intents", get(admin::list_intents))
        .route(
            "/intents/{id}/confirm-transfer",
            post(admin::confirm_transfer),
        )
        .route("/pools", post(admin::create_pool))
        .route("/pools/{id}/capacity", put(admin::resize_pool))
        .route("/raffles/{id}/status", post(admin::transition_raffle))
}
