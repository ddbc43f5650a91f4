use axum::Router;

use crate::state::SharedState;

pub mod docs;
pub mod health;
pub mod identity;
pub mod play;
pub mod sessions;
pub mod sse;
pub mod teams;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sessions::router())
        .merge(teams::router())
        .merge(play::router())
        .merge(sse::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
