use axum::Router;

use crate::state::SharedState;

pub mod card;
pub mod display;
pub mod docs;
pub mod health;
pub mod session;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(session::router())
        .merge(display::router())
        .merge(card::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
