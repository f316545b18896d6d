//! Scoring Engine: weighted, normalized combination of per-category signals.
//!
//! score = Σ(weight × sub_score) / Σ(weight) over the categories actually present,
//! so a project missing a category is scored over what it has instead of being
//! dragged down by an implicit zero.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::config::ConfigError;
use crate::models::analysis::Enrichment;
use crate::models::score::{CategoryContribution, ImportanceScore};
use crate::models::signals::{category, SignalBundle};

/// Category name → non-negative weight. Weights need not sum to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringWeights(BTreeMap<String, f64>);

impl ScoringWeights {
    pub fn new<I, S>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let weights = Self(
            pairs
                .into_iter()
                .map(|(name, weight)| (name.into(), weight))
                .collect(),
        );
        weights.validate()?;
        Ok(weights)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.0.is_empty() {
            return Err(ConfigError::NoWeights);
        }
        for (category, &value) in &self.0 {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    category: category.clone(),
                    value,
                });
            }
        }
        // Individually finite weights can still overflow when summed.
        if !self.0.values().sum::<f64>().is_finite() {
            return Err(ConfigError::WeightSumOverflow);
        }
        Ok(())
    }

    pub fn get(&self, category: &str) -> Option<f64> {
        self.0.get(category).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Scores one project. Pure: the same bundle and enrichment always give the
    /// same result. The returned score is unranked (`rank == 0`).
    pub fn score(&self, bundle: &SignalBundle, enrichment: Option<&Enrichment>) -> ImportanceScore {
        let mut contributions = Vec::new();

        for (name, weight) in self.weights.iter() {
            let sub_score = if name == category::AI_DEPTH {
                enrichment
                    .map(|e| e.depth_score)
                    .filter(|v| v.is_finite())
                    .map(|v| v.clamp(0.0, 1.0))
            } else {
                bundle.sub_score(name)
            };

            if let Some(sub_score) = sub_score {
                contributions.push(CategoryContribution {
                    category: name.to_string(),
                    sub_score,
                    weight,
                    weighted: weight * sub_score,
                });
            }
        }

        let applied_weight: f64 = contributions.iter().map(|c| c.weight).sum();
        let weighted_sum: f64 = contributions.iter().map(|c| c.weighted).sum();

        let score = if applied_weight > 0.0 {
            (weighted_sum / applied_weight).clamp(0.0, 1.0)
        } else {
            0.0
        };

        ImportanceScore {
            project_id: bundle.project_id,
            contributions,
            score,
            rank: 0,
            last_activity: bundle.last_activity,
            analysis: None,
        }
    }

    /// Sorts scores into a total order and assigns 1-based rank positions.
    pub fn rank(&self, mut scores: Vec<ImportanceScore>) -> Vec<ImportanceScore> {
        scores.sort_by(compare_for_ranking);
        for (position, score) in scores.iter_mut().enumerate() {
            score.rank = position + 1;
        }
        scores
    }
}

/// Score descending, then projects with signals before signal-free ones, then
/// most recent activity first (unknown activity last), then project id.
fn compare_for_ranking(a: &ImportanceScore, b: &ImportanceScore) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.is_signal_free().cmp(&b.is_signal_free()))
        .then_with(|| match (a.last_activity, b.last_activity) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.project_id.cmp(&b.project_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::Complexity;
    use chrono::{TimeZone, Utc};

    fn engine(pairs: &[(&str, f64)]) -> ScoringEngine {
        ScoringEngine::new(ScoringWeights::new(pairs.iter().map(|(k, v)| (*k, *v))).unwrap())
    }

    fn enrichment(depth_score: f64) -> Enrichment {
        Enrichment {
            design_patterns: vec![],
            complexity: Complexity::Intermediate,
            depth_score,
            summary: None,
        }
    }

    #[test]
    fn test_weighted_score_is_normalized_by_applied_weights() {
        let engine = engine(&[("skills", 2.0), ("comprehension", 1.0)]);
        let bundle = SignalBundle::new(1)
            .with_category("skills", 0.8)
            .with_category("comprehension", 0.4);
        let score = engine.score(&bundle, None);
        // (2*0.8 + 1*0.4) / 3 = 0.6667
        assert!((score.score - 0.6667).abs() < 1e-4, "Score was {}", score.score);
        assert_eq!(score.contributions.len(), 2);
    }

    #[test]
    fn test_missing_category_is_not_penalized() {
        let engine = engine(&[("skills", 1.0), ("comprehension", 1.0)]);
        let bundle = SignalBundle::new(1).with_category("skills", 0.5);
        let score = engine.score(&bundle, None);
        assert!((score.score - 0.5).abs() < 1e-9, "Score was {}", score.score);
    }

    #[test]
    fn test_empty_bundle_scores_zero_and_ranks_last() {
        let engine = engine(&[("skills", 1.0)]);
        let empty = engine.score(&SignalBundle::new(1), None);
        assert_eq!(empty.score, 0.0);
        assert!(empty.is_signal_free());

        // A project with a genuine zero sub-score still outranks a signal-free one.
        let zero = engine.score(&SignalBundle::new(2).with_category("skills", 0.0), None);
        let some = engine.score(&SignalBundle::new(3).with_category("skills", 0.1), None);

        let ranked = engine.rank(vec![empty, zero, some]);
        let order: Vec<i64> = ranked.iter().map(|s| s.project_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn test_unweighted_categories_are_ignored() {
        let engine = engine(&[("skills", 1.0)]);
        let bundle = SignalBundle::new(1)
            .with_category("skills", 0.4)
            .with_category("efficiency", 1.0);
        assert!((engine.score(&bundle, None).score - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_enrichment_contributes_ai_depth() {
        let engine = engine(&[("skills", 1.0), ("ai_depth", 1.0)]);
        let bundle = SignalBundle::new(1).with_category("skills", 0.4);

        let without = engine.score(&bundle, None);
        assert!((without.score - 0.4).abs() < 1e-9);

        let with = engine.score(&bundle, Some(&enrichment(0.8)));
        assert!((with.score - 0.6).abs() < 1e-9, "Score was {}", with.score);
        assert!(with.contributions.iter().any(|c| c.category == "ai_depth"));
    }

    #[test]
    fn test_bundle_cannot_spoof_ai_depth() {
        let engine = engine(&[("skills", 1.0), ("ai_depth", 1.0)]);
        let bundle = SignalBundle::new(1)
            .with_category("skills", 0.2)
            .with_category("ai_depth", 1.0);
        assert!((engine.score(&bundle, None).score - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_zero_weight_category_scores_zero_when_alone() {
        let engine = engine(&[("skills", 0.0)]);
        let score = engine.score(&SignalBundle::new(1).with_category("skills", 0.9), None);
        assert_eq!(score.score, 0.0);
    }

    #[test]
    fn test_ties_broken_by_recent_activity_then_id() {
        let engine = engine(&[("skills", 1.0)]);
        let older = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let a = engine.score(
            &SignalBundle::new(10).with_category("skills", 0.5).with_last_activity(older),
            None,
        );
        let b = engine.score(
            &SignalBundle::new(20).with_category("skills", 0.5).with_last_activity(newer),
            None,
        );
        let c = engine.score(&SignalBundle::new(5).with_category("skills", 0.5), None);
        let d = engine.score(&SignalBundle::new(3).with_category("skills", 0.5), None);

        let ranked = engine.rank(vec![a, c, d, b]);
        let order: Vec<i64> = ranked.iter().map(|s| s.project_id).collect();
        assert_eq!(order, vec![20, 10, 3, 5]);
        let ranks: Vec<usize> = ranked.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let engine = engine(&[("skills", 2.0), ("efficiency", 0.5)]);
        let bundle = SignalBundle::new(1)
            .with_category("skills", 0.3)
            .with_category("efficiency", 0.9);
        assert_eq!(engine.score(&bundle, None), engine.score(&bundle, None));
    }

    #[test]
    fn test_weights_reject_negative_and_nan() {
        assert!(ScoringWeights::new([("skills", -0.1)]).is_err());
        assert!(ScoringWeights::new([("skills", f64::NAN)]).is_err());
        assert_eq!(
            ScoringWeights::new(Vec::<(String, f64)>::new()),
            Err(ConfigError::NoWeights)
        );
    }

    #[test]
    fn test_weights_whose_sum_overflows_are_rejected() {
        let huge = f64::MAX / 2.0;
        assert_eq!(
            ScoringWeights::new([("skills", huge), ("efficiency", huge), ("contribution", huge)]),
            Err(ConfigError::WeightSumOverflow)
        );
        // Large but summable weights still score inside [0, 1].
        let engine = ScoringEngine::new(
            ScoringWeights::new([("skills", f64::MAX / 4.0), ("efficiency", f64::MAX / 4.0)]).unwrap(),
        );
        let bundle = SignalBundle::new(1)
            .with_category("skills", 1.0)
            .with_category("efficiency", 0.5);
        let score = engine.score(&bundle, None).score;
        assert!(score.is_finite());
        assert!((0.0..=1.0).contains(&score));
    }
}
