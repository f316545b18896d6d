use std::sync::Arc;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::config::Config;
use crate::ranking::batch::BatchCoordinator;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    /// Process-wide orchestrator: one limiter, one budget, one cache.
    pub orchestrator: Arc<AnalysisOrchestrator>,
    pub coordinator: BatchCoordinator,
    /// Cancelled on shutdown; each batch runs under a child token.
    pub shutdown: CancellationToken,
}
