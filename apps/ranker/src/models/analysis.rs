use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::signals::{ProjectId, SignalBundle};

/// Bumped whenever the shape of the analysis prompt or result changes, so that
/// cached results produced under an older schema are never reused.
pub const ANALYSIS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisDepth {
    Overview,
    Technical,
    Full,
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Overview => "overview",
            AnalysisDepth::Technical => "technical",
            AnalysisDepth::Full => "full",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "overview" => Some(AnalysisDepth::Overview),
            "technical" => Some(AnalysisDepth::Technical),
            "full" => Some(AnalysisDepth::Full),
            _ => None,
        }
    }
}

/// A request for AI enrichment of a single project.
///
/// `trace_id` and `requested_at` are volatile and never affect the result.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRequest {
    pub project_id: ProjectId,
    pub bundle: SignalBundle,
    pub depth: AnalysisDepth,
    pub schema_version: u32,
    pub trace_id: Uuid,
    pub requested_at: DateTime<Utc>,
}

impl AnalysisRequest {
    pub fn new(bundle: SignalBundle, depth: AnalysisDepth) -> Self {
        Self {
            project_id: bundle.project_id,
            bundle,
            depth,
            schema_version: ANALYSIS_SCHEMA_VERSION,
            trace_id: Uuid::new_v4(),
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Basic,
    Intermediate,
    Advanced,
}

impl Complexity {
    /// Deterministic classification from the bundle alone: breadth of detected
    /// skills combined with the mean sub-score.
    pub fn from_bundle(bundle: &SignalBundle) -> Self {
        let mean = bundle.mean_sub_score().unwrap_or(0.0);
        let breadth = bundle.skills.len();
        if mean >= 0.7 && breadth >= 6 {
            Complexity::Advanced
        } else if mean >= 0.4 || breadth >= 3 {
            Complexity::Intermediate
        } else {
            Complexity::Basic
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Basic => "basic",
            Complexity::Intermediate => "intermediate",
            Complexity::Advanced => "advanced",
        }
    }
}

/// Signals only the external analysis service can provide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrichment {
    #[serde(default)]
    pub design_patterns: Vec<String>,
    pub complexity: Complexity,
    /// Technical depth judged by the service, in [0, 1].
    pub depth_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Fresh,
    Cached,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    BudgetExhausted,
    RateLimited,
    RetriesExhausted,
    PermanentFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// `None` for fallback results: those carry only deterministic signals.
    pub enrichment: Option<Enrichment>,
    pub estimated_cost: f64,
    pub provenance: Provenance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<FallbackReason>,
}

impl AnalysisResult {
    pub fn fresh(enrichment: Enrichment, cost: f64) -> Self {
        Self {
            enrichment: Some(enrichment),
            estimated_cost: cost,
            provenance: Provenance::Fresh,
            fallback_reason: None,
        }
    }

    pub fn fallback(reason: FallbackReason) -> Self {
        Self {
            enrichment: None,
            estimated_cost: 0.0,
            provenance: Provenance::Fallback,
            fallback_reason: Some(reason),
        }
    }

    /// Re-tags a stored result as served from cache.
    pub fn into_cached(mut self) -> Self {
        self.provenance = Provenance::Cached;
        self
    }
}
