//! Usage ledger: usage counters and budget spend persisted as one JSON file so
//! a restart neither forgets usage nor hands out a fresh budget mid-period.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analysis::cache::SnapshotError;
use crate::analysis::cost_tracker::{CostTracker, SpendRecord};
use crate::analysis::usage::{UsageCounters, UsageStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub saved_at: DateTime<Utc>,
    pub usage: UsageCounters,
    pub budget: SpendRecord,
}

pub fn save_ledger(path: &Path, usage: &UsageStats, budget: &CostTracker) -> Result<(), SnapshotError> {
    let snapshot = LedgerSnapshot {
        saved_at: Utc::now(),
        usage: usage.counters(),
        budget: budget.spend_record(),
    };
    // Write then rename so a crash mid-write never leaves a truncated ledger.
    let tmp = path.with_extension("tmp");
    {
        let writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(writer, &snapshot)?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Restores usage counters unconditionally and the spend only if its period is
/// still running. Returns whether the spend was restored.
pub fn restore_ledger(
    path: &Path,
    usage: &UsageStats,
    budget: &CostTracker,
    now: DateTime<Utc>,
) -> Result<bool, SnapshotError> {
    let reader = BufReader::new(File::open(path)?);
    let snapshot: LedgerSnapshot = serde_json::from_reader(reader)?;

    usage.restore(snapshot.usage);
    let budget_restored = budget.restore_at(&snapshot.budget, now);
    if budget_restored {
        info!(
            "Restored ${:.4} of spend for the budget period starting {}",
            snapshot.budget.spent, snapshot.budget.period_start
        );
    } else {
        info!(
            "Persisted budget period starting {} has ended, starting with a fresh budget",
            snapshot.budget.period_start
        );
    }
    Ok(budget_restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn hourly() -> CostTracker {
        CostTracker::new(1.0, Duration::from_secs(3600), Utc::now())
    }

    #[test]
    fn test_restart_keeps_usage_and_spend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_usage_stats.json");

        let usage = UsageStats::new();
        usage.record_fresh(1000, 200, 0.4);
        usage.record_cached();
        let budget = hourly();
        let reservation = budget.try_reserve(0.5).unwrap();
        budget.record_actual(reservation, 0.4);
        save_ledger(&path, &usage, &budget).unwrap();

        let usage_after = UsageStats::new();
        let budget_after = hourly();
        let restored = restore_ledger(&path, &usage_after, &budget_after, Utc::now()).unwrap();

        assert!(restored);
        assert_eq!(usage_after.counters(), usage.counters());
        assert_eq!(usage_after.report().total_requests, 2);
        assert!((budget_after.snapshot().spent - 0.4).abs() < 1e-9);
        // The restored spend still counts against the ceiling.
        assert!(budget_after.try_reserve(0.7).is_none());
    }

    #[test]
    fn test_spend_from_finished_period_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_usage_stats.json");

        let usage = UsageStats::new();
        usage.record_fresh(10, 10, 0.9);
        let budget = hourly();
        let reservation = budget.try_reserve(0.9).unwrap();
        budget.record_actual(reservation, 0.9);
        save_ledger(&path, &usage, &budget).unwrap();

        let two_hours_later = Utc::now() + chrono::Duration::hours(2);
        let budget_after = CostTracker::new(1.0, Duration::from_secs(3600), two_hours_later);
        let usage_after = UsageStats::new();
        let restored = restore_ledger(&path, &usage_after, &budget_after, two_hours_later).unwrap();

        assert!(!restored);
        assert_eq!(budget_after.snapshot_at(two_hours_later).spent, 0.0);
        // Usage history is cumulative and survives regardless.
        assert_eq!(usage_after.report().fresh, 1);
    }

    #[test]
    fn test_missing_ledger_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = restore_ledger(
            &dir.path().join("absent.json"),
            &UsageStats::new(),
            &hourly(),
            Utc::now(),
        );
        assert!(matches!(result, Err(SnapshotError::Io(_))));
    }

    #[test]
    fn test_garbage_ledger_is_error_and_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_usage_stats.json");
        std::fs::write(&path, "{not json").unwrap();

        let usage = UsageStats::new();
        usage.record_cached();
        let result = restore_ledger(&path, &usage, &hourly(), Utc::now());
        assert!(matches!(result, Err(SnapshotError::Json(_))));
        assert_eq!(usage.report().cached, 1);
    }
}
