use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::analysis::orchestrator::AnalysisOrchestrator;
use crate::models::analysis::{AnalysisDepth, AnalysisRequest};
use crate::models::score::ImportanceScore;
use crate::models::signals::ProjectId;
use crate::scoring::engine::ScoringEngine;
use crate::signals::store::SignalStore;

/// Why a project is missing from a batch's ranked output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The store has no bundle for this project.
    NotFound,
    Store(String),
    /// The worker processing the project panicked or was aborted.
    Worker(String),
}

/// Per-project work: fetch the bundle, optionally enrich it, score it.
pub struct RankingPipeline {
    store: Arc<dyn SignalStore>,
    /// `None` when enrichment is disabled; every project is then scored on
    /// signals alone.
    orchestrator: Option<Arc<AnalysisOrchestrator>>,
    engine: ScoringEngine,
    depth: AnalysisDepth,
}

impl RankingPipeline {
    pub fn new(
        store: Arc<dyn SignalStore>,
        orchestrator: Option<Arc<AnalysisOrchestrator>>,
        engine: ScoringEngine,
        depth: AnalysisDepth,
    ) -> Self {
        Self {
            store,
            orchestrator,
            engine,
            depth,
        }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    pub async fn process(&self, project_id: ProjectId) -> Result<ImportanceScore, SkipReason> {
        let bundle = match self.store.get_signal_bundle(project_id).await {
            Ok(Some(bundle)) => bundle,
            Ok(None) => {
                debug!("No signal bundle for project {project_id}");
                return Err(SkipReason::NotFound);
            }
            Err(e) => {
                warn!("Failed to fetch signals for project {project_id}: {e}");
                return Err(SkipReason::Store(e.to_string()));
            }
        };

        let Some(orchestrator) = &self.orchestrator else {
            return Ok(self.engine.score(&bundle, None));
        };

        let request = AnalysisRequest::new(bundle, self.depth);
        let result = orchestrator.analyze(&request).await;
        let mut score = self.engine.score(&request.bundle, result.enrichment.as_ref());
        score.analysis = Some(result.provenance);
        Ok(score)
    }
}
