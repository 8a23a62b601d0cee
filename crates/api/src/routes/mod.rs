pub mod admin;
pub mod checkout;
pub mod health;
pub mod raffles;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /checkout/intents                                   create (public)
/// /checkout/intents/{id}                              result-page snapshot
/// /checkout/intents/{id}/ws                           result-page push
/// /checkout/intents/{id}/return                       provider redirect
///
/// /raffles/{raffle_id}/participants/{pid}/assignments participant tickets
///
/// /webhooks/stripe                                    signed provider callback
/// /webhooks/paypal                                    provider callback
///
/// /admin/...                                          operator endpoints (JWT)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/checkout", checkout::router())
        .nest("/raffles", raffles::router())
        .nest("/webhooks", webhooks::router())
        .nest("/admin", admin::router())
}
