pub mod health;

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::ranking::handlers as ranking;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Ranking API
        .route("/api/v1/rankings", post(ranking::handle_rank))
        // Analysis API
        .route("/api/v1/analysis/usage", get(analysis::handle_usage))
        .route(
            "/api/v1/analysis/usage/reset",
            post(analysis::handle_reset_usage),
        )
        .route("/api/v1/analysis/cache", delete(analysis::handle_clear_cache))
        .with_state(state)
}
