use axum::routing::get;
use axum::Router;

use crate::handlers::checkout;
use crate::state::AppState;

/// Routes mounted at `/raffles`.
///
/// ```text
/// GET /{raffle_id}/participants/{participant_id}/assignments -> list_participant_assignments
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{raffle_id}/participants/{participant_id}/assignments",
        get(checkout::list_participant_assignments),
    )
}
