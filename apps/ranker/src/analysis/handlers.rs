use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::info;

use crate::analysis::cost_tracker::BudgetSnapshot;
use crate::analysis::usage::UsageReport;
use crate::state::AppState;

#[derive(Serialize)]
pub struct UsageResponse {
    pub usage: UsageReport,
    pub budget: BudgetSnapshot,
    pub cache_entries: usize,
    pub rate_tokens_available: f64,
}

/// GET /api/v1/analysis/usage
pub async fn handle_usage(State(state): State<AppState>) -> Json<UsageResponse> {
    let orchestrator = &state.orchestrator;
    Json(UsageResponse {
        usage: orchestrator.usage_report(),
        budget: orchestrator.budget_snapshot(),
        cache_entries: orchestrator.cache().len(),
        rate_tokens_available: orchestrator.available_tokens(),
    })
}

/// POST /api/v1/analysis/usage/reset
pub async fn handle_reset_usage(State(state): State<AppState>) -> StatusCode {
    state.orchestrator.reset_usage();
    info!("Usage statistics reset");
    StatusCode::NO_CONTENT
}

/// DELETE /api/v1/analysis/cache
pub async fn handle_clear_cache(State(state): State<AppState>) -> StatusCode {
    let cache = state.orchestrator.cache();
    let dropped = cache.len();
    cache.clear();
    info!("Analysis cache cleared ({dropped} entries)");
    StatusCode::NO_CONTENT
}
