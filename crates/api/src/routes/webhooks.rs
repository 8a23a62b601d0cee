use axum::routing::post;
use axum::Router;

use crate::handlers::webhooks;
use crate::state::AppState;

/// Routes mounted at `/webhooks`.
///
/// ```text
/// POST /stripe  -> stripe  (Stripe-Signature verified)
/// POST /paypal  -> paypal
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stripe", post(webhooks::stripe))
        .route("/paypal", post(webhooks::paypal))
}
