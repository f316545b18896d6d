use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Running counters for calls mediated by the orchestrator.
#[derive(Debug)]
pub struct UsageStats {
    counters: Mutex<UsageCounters>,
}

/// Raw counters; also the persisted form of the stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageCounters {
    total_requests: u64,
    fresh: u64,
    cached: u64,
    fallback: u64,
    failed_calls: u64,
    input_tokens: u64,
    output_tokens: u64,
    total_cost: f64,
    last_reset: DateTime<Utc>,
}

impl UsageCounters {
    fn new() -> Self {
        Self {
            total_requests: 0,
            fresh: 0,
            cached: 0,
            fallback: 0,
            failed_calls: 0,
            input_tokens: 0,
            output_tokens: 0,
            total_cost: 0.0,
            last_reset: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    pub total_requests: u64,
    pub fresh: u64,
    pub cached: u64,
    pub fallback: u64,
    pub failed_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
    /// Share of requests answered with real enrichment (fresh or cached).
    pub success_rate: f64,
    pub cache_hit_rate: f64,
    pub avg_cost_per_call: f64,
    pub last_reset: DateTime<Utc>,
}

impl Default for UsageStats {
    fn default() -> Self {
        Self {
            counters: Mutex::new(UsageCounters::new()),
        }
    }
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cached(&self) {
        let mut c = self.counters.lock();
        c.total_requests += 1;
        c.cached += 1;
    }

    pub fn record_fresh(&self, input_tokens: u32, output_tokens: u32, cost: f64) {
        let mut c = self.counters.lock();
        c.total_requests += 1;
        c.fresh += 1;
        c.input_tokens += u64::from(input_tokens);
        c.output_tokens += u64::from(output_tokens);
        if cost.is_finite() {
            c.total_cost += cost.max(0.0);
        }
    }

    pub fn record_fallback(&self) {
        let mut c = self.counters.lock();
        c.total_requests += 1;
        c.fallback += 1;
    }

    /// A single failed external attempt (a request may fail several times
    /// before it succeeds or falls back).
    pub fn record_failed_call(&self) {
        self.counters.lock().failed_calls += 1;
    }

    pub fn counters(&self) -> UsageCounters {
        self.counters.lock().clone()
    }

    /// Replaces the counters with previously persisted ones.
    pub fn restore(&self, counters: UsageCounters) {
        *self.counters.lock() = counters;
    }

    pub fn reset(&self) {
        *self.counters.lock() = UsageCounters::new();
    }

    pub fn report(&self) -> UsageReport {
        let c = self.counters.lock().clone();
        let total = c.total_requests.max(1) as f64;
        UsageReport {
            total_requests: c.total_requests,
            fresh: c.fresh,
            cached: c.cached,
            fallback: c.fallback,
            failed_calls: c.failed_calls,
            input_tokens: c.input_tokens,
            output_tokens: c.output_tokens,
            total_cost: c.total_cost,
            success_rate: (c.fresh + c.cached) as f64 / total,
            cache_hit_rate: c.cached as f64 / total,
            avg_cost_per_call: c.total_cost / c.fresh.max(1) as f64,
            last_reset: c.last_reset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_has_zero_rates() {
        let report = UsageStats::new().report();
        assert_eq!(report.total_requests, 0);
        assert_eq!(report.success_rate, 0.0);
        assert_eq!(report.cache_hit_rate, 0.0);
    }

    #[test]
    fn test_rates_and_costs() {
        let stats = UsageStats::new();
        stats.record_fresh(1000, 200, 0.006);
        stats.record_fresh(500, 100, 0.004);
        stats.record_cached();
        stats.record_fallback();
        stats.record_failed_call();

        let report = stats.report();
        assert_eq!(report.total_requests, 4);
        assert_eq!(report.input_tokens, 1500);
        assert_eq!(report.output_tokens, 300);
        assert_eq!(report.failed_calls, 1);
        assert!((report.success_rate - 0.75).abs() < 1e-9);
        assert!((report.cache_hit_rate - 0.25).abs() < 1e-9);
        assert!((report.avg_cost_per_call - 0.005).abs() < 1e-9);
    }

    #[test]
    fn test_reset_clears_counters() {
        let stats = UsageStats::new();
        stats.record_cached();
        stats.reset();
        assert_eq!(stats.report().total_requests, 0);
    }
}
