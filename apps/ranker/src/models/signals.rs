use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a scanned project, as assigned by the signal store.
pub type ProjectId = i64;

/// Well-known signal categories produced by the extractors.
pub mod category {
    pub const SKILLS: &str = "skills";
    pub const COMPREHENSION: &str = "comprehension";
    pub const EFFICIENCY: &str = "efficiency";
    pub const CONTRIBUTION: &str = "contribution";
    /// Category contributed by AI enrichment rather than by the signal store.
    pub const AI_DEPTH: &str = "ai_depth";
}

/// Per-project bundle of independently computed signals.
///
/// Produced by the extractors and read through the signal store. A bundle is
/// immutable for a given project version; a re-scan supersedes it with a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalBundle {
    pub project_id: ProjectId,
    /// Category name → sub-score, expected in [0, 1].
    pub categories: BTreeMap<String, f64>,
    /// Detected skill names, in detection order.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Raw supporting counts (files, lines_of_code, keywords, ...).
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    pub last_activity: Option<DateTime<Utc>>,
    pub produced_at: DateTime<Utc>,
}

impl SignalBundle {
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            categories: BTreeMap::new(),
            skills: Vec::new(),
            counts: BTreeMap::new(),
            last_activity: None,
            produced_at: Utc::now(),
        }
    }

    pub fn with_category(mut self, name: &str, sub_score: f64) -> Self {
        self.categories.insert(name.to_string(), sub_score);
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_count(mut self, name: &str, value: u64) -> Self {
        self.counts.insert(name.to_string(), value);
        self
    }

    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity = Some(at);
        self
    }

    /// Returns the sub-score for `category`, clamped to [0, 1].
    /// Non-finite values are treated as absent.
    pub fn sub_score(&self, category: &str) -> Option<f64> {
        self.categories
            .get(category)
            .copied()
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
    }

    /// Mean of all usable sub-scores, or `None` when the bundle carries none.
    pub fn mean_sub_score(&self) -> Option<f64> {
        let usable: Vec<f64> = self
            .categories
            .keys()
            .filter_map(|name| self.sub_score(name))
            .collect();
        if usable.is_empty() {
            return None;
        }
        Some(usable.iter().sum::<f64>() / usable.len() as f64)
    }
}
