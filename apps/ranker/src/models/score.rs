use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::analysis::Provenance;
use crate::models::signals::ProjectId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryContribution {
    pub category: String,
    pub sub_score: f64,
    pub weight: f64,
    /// `weight * sub_score`, before normalization.
    pub weighted: f64,
}

/// Final, comparable importance of one project. Always derived fresh from the
/// current bundle and enrichment; never patched in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceScore {
    pub project_id: ProjectId,
    pub contributions: Vec<CategoryContribution>,
    /// Normalized score in [0, 1].
    pub score: f64,
    /// 1-based position once ranked; 0 before ranking.
    pub rank: usize,
    pub last_activity: Option<DateTime<Utc>>,
    /// How the enrichment (if any was requested) was obtained.
    pub analysis: Option<Provenance>,
}

impl ImportanceScore {
    /// True when no weighted category was present in the bundle.
    pub fn is_signal_free(&self) -> bool {
        self.contributions.is_empty()
    }
}
