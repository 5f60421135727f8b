use axum::Router;

use crate::state::SharedState;

pub mod aggregate;
pub mod docs;
pub mod health;
pub mod shows;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(aggregate::router())
        .merge(shows::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
