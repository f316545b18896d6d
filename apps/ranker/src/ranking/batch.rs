//! Batch coordinator: ranks a set of projects on a bounded worker pool.
//!
//! At most `workers` projects are in flight at once. Cancelling the token stops
//! new work from starting; projects already running finish normally and are
//! ranked, the rest are reported as cancelled.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::score::ImportanceScore;
use crate::models::signals::ProjectId;
use crate::ranking::pipeline::{RankingPipeline, SkipReason};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedProject {
    pub project_id: ProjectId,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Totally ordered, ranks 1..n.
    pub ranked: Vec<ImportanceScore>,
    pub skipped: Vec<SkippedProject>,
    /// Projects never started because the batch was cancelled.
    pub cancelled: Vec<ProjectId>,
}

#[derive(Clone)]
pub struct BatchCoordinator {
    pipeline: Arc<RankingPipeline>,
    workers: usize,
}

impl BatchCoordinator {
    pub fn new(pipeline: Arc<RankingPipeline>, workers: usize) -> Self {
        Self {
            pipeline,
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Ranks `project_ids`. Duplicate ids are processed once.
    pub async fn rank(&self, project_ids: Vec<ProjectId>, cancel: CancellationToken) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut tasks = JoinSet::new();
        let mut seen = HashSet::new();
        let mut in_flight = HashSet::new();
        let mut outcome = BatchOutcome::default();
        let mut scores = Vec::new();

        let total = project_ids.len();
        let mut queue = project_ids.into_iter().filter(|id| seen.insert(*id));

        while let Some(project_id) = queue.next() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                outcome.cancelled.push(project_id);
                outcome.cancelled.extend(queue.by_ref());
                break;
            };

            let pipeline = Arc::clone(&self.pipeline);
            in_flight.insert(project_id);
            tasks.spawn(async move {
                let _permit = permit;
                (project_id, pipeline.process(project_id).await)
            });

            // Collect whatever already finished so results do not pile up.
            while let Some(joined) = tasks.try_join_next() {
                collect(joined, &mut in_flight, &mut scores, &mut outcome.skipped);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            collect(joined, &mut in_flight, &mut scores, &mut outcome.skipped);
        }

        // Anything still tracked belonged to a task that panicked.
        for project_id in in_flight {
            outcome.skipped.push(SkippedProject {
                project_id,
                reason: SkipReason::Worker("task failed before reporting".to_string()),
            });
        }

        outcome.skipped.sort_by_key(|s| s.project_id);
        outcome.ranked = self.pipeline.engine().rank(scores);

        info!(
            "Batch finished: {} requested, {} ranked, {} skipped, {} cancelled",
            total,
            outcome.ranked.len(),
            outcome.skipped.len(),
            outcome.cancelled.len()
        );
        outcome
    }
}

fn collect(
    joined: Result<(ProjectId, Result<ImportanceScore, SkipReason>), tokio::task::JoinError>,
    in_flight: &mut HashSet<ProjectId>,
    scores: &mut Vec<ImportanceScore>,
    skipped: &mut Vec<SkippedProject>,
) {
    match joined {
        Ok((project_id, result)) => {
            in_flight.remove(&project_id);
            match result {
                Ok(score) => scores.push(score),
                Err(reason) => skipped.push(SkippedProject { project_id, reason }),
            }
        }
        Err(e) => warn!("Ranking worker failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use chrono::Utc;

    use crate::analysis::cache::ResponseCache;
    use crate::analysis::cost_tracker::CostTracker;
    use crate::analysis::orchestrator::{AnalysisOrchestrator, OrchestratorConfig, ThrottlePolicy};
    use crate::analysis::rate_limiter::RateLimiter;
    use crate::config::parse_weights;
    use crate::llm_client::mock::MockService;
    use crate::models::analysis::{AnalysisDepth, Provenance};
    use crate::models::signals::SignalBundle;
    use crate::scoring::engine::ScoringEngine;
    use crate::signals::memory::InMemorySignalStore;

    fn engine() -> ScoringEngine {
        ScoringEngine::new(parse_weights("skills=1,efficiency=1,ai_depth=1").unwrap())
    }

    fn store_with(ids: impl IntoIterator<Item = ProjectId>) -> Arc<InMemorySignalStore> {
        Arc::new(
            ids.into_iter()
                .map(|id| {
                    SignalBundle::new(id)
                        .with_category("skills", id as f64 / 20.0)
                        .with_category("efficiency", 0.5)
                })
                .collect(),
        )
    }

    fn orchestrator(service: Arc<MockService>, budget: f64) -> Arc<AnalysisOrchestrator> {
        Arc::new(AnalysisOrchestrator::new(
            service,
            Arc::new(ResponseCache::new()),
            RateLimiter::new(100.0, 0.0),
            CostTracker::new(budget, Duration::from_secs(86_400), Utc::now()),
            OrchestratorConfig {
                cache_ttl: Duration::from_secs(3600),
                max_retries: 1,
                backoff_base: Duration::from_millis(10),
                backoff_jitter: Duration::ZERO,
                throttle: ThrottlePolicy::Fallback,
                call_timeout: Duration::from_secs(5),
            },
        ))
    }

    fn coordinator(
        store: Arc<InMemorySignalStore>,
        orchestrator: Option<Arc<AnalysisOrchestrator>>,
        workers: usize,
    ) -> BatchCoordinator {
        let pipeline = RankingPipeline::new(store, orchestrator, engine(), AnalysisDepth::Technical);
        BatchCoordinator::new(Arc::new(pipeline), workers)
    }

    #[tokio::test]
    async fn test_missing_bundles_are_skipped() {
        let store = store_with((1..=10).filter(|id| *id != 4 && *id != 7));
        let batch = coordinator(store, None, 3);

        let outcome = batch.rank((1..=10).collect(), CancellationToken::new()).await;

        assert_eq!(outcome.ranked.len(), 8);
        assert_eq!(outcome.skipped.len(), 2);
        assert_eq!(
            outcome.skipped.iter().map(|s| s.project_id).collect::<Vec<_>>(),
            vec![4, 7]
        );
        assert!(outcome.skipped.iter().all(|s| s.reason == SkipReason::NotFound));
        assert!(outcome.cancelled.is_empty());

        let ranks: Vec<usize> = outcome.ranked.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, (1..=8).collect::<Vec<_>>());
        // Higher skills sub-score ranks first.
        assert_eq!(outcome.ranked[0].project_id, 10);
    }

    #[tokio::test]
    async fn test_store_error_is_skipped_with_reason() {
        let store = store_with(1..=3);
        store.fail_on(2);
        let outcome = coordinator(store, None, 2)
            .rank(vec![1, 2, 3], CancellationToken::new())
            .await;

        assert_eq!(outcome.ranked.len(), 2);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(matches!(outcome.skipped[0].reason, SkipReason::Store(_)));
    }

    #[tokio::test]
    async fn test_fallback_does_not_halt_batch() {
        // Budget covers two calls; the rest fall back.
        let service = Arc::new(MockService::new(0.5));
        let orch = orchestrator(service.clone(), 1.0);
        let outcome = coordinator(store_with(1..=6), Some(orch), 2)
            .rank((1..=6).collect(), CancellationToken::new())
            .await;

        assert_eq!(outcome.ranked.len(), 6);
        assert_eq!(service.calls(), 2);
        let fallbacks = outcome
            .ranked
            .iter()
            .filter(|s| s.analysis == Some(Provenance::Fallback))
            .count();
        assert_eq!(fallbacks, 4);
        // Fallback projects are scored on signals alone.
        for score in outcome.ranked.iter().filter(|s| s.analysis == Some(Provenance::Fallback)) {
            assert!(score.contributions.iter().all(|c| c.category != "ai_depth"));
        }
    }

    #[tokio::test]
    async fn test_cancelled_before_start_runs_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = coordinator(store_with(1..=5), None, 2)
            .rank((1..=5).collect(), cancel)
            .await;

        assert!(outcome.ranked.is_empty());
        assert_eq!(outcome.cancelled, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_batch_finishes_in_flight() {
        use crate::llm_client::mock::Scripted;

        // Each call takes a second; with two workers, cancelling after the first
        // pair started leaves the remainder unstarted.
        let service = Arc::new(MockService::with_script(
            0.01,
            (0..6).map(|_| Scripted::Hang(Duration::from_secs(1))).collect(),
        ));
        let orch = orchestrator(service.clone(), 10.0);
        let batch = coordinator(store_with(1..=6), Some(orch), 2);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let outcome = batch.rank((1..=6).collect(), cancel).await;

        assert_eq!(outcome.ranked.len(), 2);
        assert_eq!(outcome.cancelled, vec![3, 4, 5, 6]);
        assert_eq!(service.calls(), 2);
        assert!(outcome
            .ranked
            .iter()
            .all(|s| s.analysis == Some(Provenance::Fresh)));
    }

    #[tokio::test]
    async fn test_duplicate_ids_processed_once() {
        let outcome = coordinator(store_with(1..=2), None, 4)
            .rank(vec![1, 2, 1, 2], CancellationToken::new())
            .await;
        assert_eq!(outcome.ranked.len(), 2);
    }

    #[tokio::test]
    async fn test_single_worker_still_completes() {
        let outcome = coordinator(store_with(1..=5), None, 0)
            .rank((1..=5).collect(), CancellationToken::new())
            .await;
        assert_eq!(outcome.ranked.len(), 5);
    }
}
