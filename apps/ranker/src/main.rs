mod analysis;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod ranking;
mod routes;
mod scoring;
mod signals;
mod state;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::cache::ResponseCache;
use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::llm_client::LlmClient;
use crate::ranking::batch::BatchCoordinator;
use crate::ranking::pipeline::RankingPipeline;
use crate::routes::build_router;
use crate::scoring::engine::ScoringEngine;
use crate::signals::store::PgSignalStore;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load and validate configuration before anything starts
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ranker v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.ranking.workers).await?;
    run_migrations(&db).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.llm.clone())?;
    info!(
        "LLM client initialized (model: {}, enrichment {})",
        llm_client::MODEL,
        if config.ranking.enrichment_enabled { "enabled" } else { "disabled" }
    );

    // Restore the response cache from the last snapshot, if any
    let cache = Arc::new(restore_cache(config.ranking.cache_snapshot_path.as_deref()));

    let orchestrator = Arc::new(AnalysisOrchestrator::from_config(
        Arc::new(llm),
        Arc::clone(&cache),
        &config.ranking,
    ));

    // Restore usage counters and in-period spend from the last ledger, if any
    let ledger_path = config.ranking.usage_snapshot_path.clone();
    if let Some(path) = ledger_path.as_deref() {
        restore_ledger(&orchestrator, path);
    }

    let pipeline = RankingPipeline::new(
        Arc::new(PgSignalStore::new(db.clone())),
        config
            .ranking
            .enrichment_enabled
            .then(|| Arc::clone(&orchestrator)),
        ScoringEngine::new(config.ranking.weights.clone()),
        config.ranking.analysis_depth,
    );
    let coordinator = BatchCoordinator::new(Arc::new(pipeline), config.ranking.workers);
    info!("Batch coordinator ready ({} workers)", coordinator.workers());

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(housekeeping(
        Arc::clone(&orchestrator),
        ledger_path.clone(),
        config.ranking.cache_sweep_interval,
        shutdown.clone(),
    ));

    // Build app state
    let state = AppState {
        db,
        config: config.clone(),
        orchestrator: Arc::clone(&orchestrator),
        coordinator,
        shutdown: shutdown.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        warn!("Housekeeping task ended abnormally: {e}");
    }

    if let Some(path) = ledger_path.as_deref() {
        persist_ledger(&orchestrator, path);
    }

    if let Some(path) = config.ranking.cache_snapshot_path.as_deref() {
        match cache.save_snapshot(path) {
            Ok(saved) => info!("Saved {saved} cache entries to {}", path.display()),
            Err(e) => warn!("Failed to save cache snapshot to {}: {e}", path.display()),
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// A missing or unreadable snapshot is not fatal: the service starts cold.
fn restore_cache(path: Option<&Path>) -> ResponseCache {
    let Some(path) = path else {
        return ResponseCache::new();
    };
    if !path.exists() {
        info!("No cache snapshot at {}, starting empty", path.display());
        return ResponseCache::new();
    }
    match ResponseCache::load_snapshot(path) {
        Ok(cache) => {
            info!("Restored {} cache entries from {}", cache.len(), path.display());
            cache
        }
        Err(e) => {
            warn!("Ignoring cache snapshot {}: {e}", path.display());
            ResponseCache::new()
        }
    }
}

fn restore_ledger(orchestrator: &AnalysisOrchestrator, path: &Path) {
    if !path.exists() {
        info!("No usage ledger at {}, starting with fresh counters", path.display());
        return;
    }
    match orchestrator.restore_ledger(path) {
        Ok(_) => info!("Restored usage ledger from {}", path.display()),
        Err(e) => warn!("Ignoring usage ledger {}: {e}", path.display()),
    }
}

fn persist_ledger(orchestrator: &AnalysisOrchestrator, path: &Path) {
    if let Err(e) = orchestrator.save_ledger(path) {
        warn!("Failed to save usage ledger to {}: {e}", path.display());
    }
}

/// Periodically evicts expired cache entries and checkpoints the usage ledger,
/// so a crash loses at most one interval of spend.
async fn housekeeping(
    orchestrator: Arc<AnalysisOrchestrator>,
    ledger_path: Option<PathBuf>,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let evicted = orchestrator.cache().evict_expired();
                if evicted > 0 {
                    debug!("Evicted {evicted} expired cache entries");
                }
                if let Some(path) = ledger_path.as_deref() {
                    persist_ledger(&orchestrator, path);
                }
            }
        }
    }
}

/// Resolves on Ctrl-C (or when shutdown was already requested) and cancels
/// in-flight batches.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };
    tokio::select! {
        _ = ctrl_c => info!("Shutdown signal received"),
        _ = shutdown.cancelled() => {}
    }
    shutdown.cancel();
}
