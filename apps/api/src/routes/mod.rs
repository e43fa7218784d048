pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::fill::handlers as fill;
use crate::notes::handlers as notes;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Note store
        .route("/api/v1/notes", post(notes::handle_create_note))
        .route("/api/v1/notes/common-fields", post(notes::handle_common_fields))
        .route("/api/v1/notes/:id", get(notes::handle_get_note))
        .route("/api/v1/notes/:id/fill", post(fill::handle_fill_single))
        // Prompt templates & fill runs
        .route("/api/v1/prompts/validate", post(fill::handle_validate))
        .route("/api/v1/fill", post(fill::handle_fill))
        .route("/api/v1/fill/preview", post(fill::handle_preview))
        .with_state(state)
}
