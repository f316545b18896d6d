//! AI Orchestrator: mediates every call to the external analysis service.
//!
//! Per request the stages always run in this order:
//!
//! ```text
//! CacheLookup ──hit──────────────────────────────────────────────▶ Done(cached)
//!     │ miss
//! BudgetCheck ──rejected─────────────────────────────▶ Fallback ─▶ Done(fallback)
//!     │ reserved
//! RateCheck ──throttled──▶ wait (RetryLater) or ─────▶ Fallback
//!     │ token
//! CallExternal ──transient──▶ backoff ─▶ RateCheck     (until retries exhausted)
//!     │        ──permanent / exhausted───────────────▶ Fallback
//!     │ success
//! CacheStore ────────────────────────────────────────────────────▶ Done(fresh)
//! ```
//!
//! Budget is reserved before any call and released if no call succeeds, so a
//! rejected or failed request never leaves spend behind. Fallback is a normal
//! outcome, never an error.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::analysis::cache::{ResponseCache, SnapshotError};
use crate::analysis::ledger;
use crate::analysis::cost_tracker::{BudgetSnapshot, CostTracker, Reservation};
use crate::analysis::fingerprint::fingerprint;
use crate::analysis::rate_limiter::RateLimiter;
use crate::analysis::usage::{UsageReport, UsageStats};
use crate::config::{ConfigError, RankingConfig};
use crate::llm_client::{AnalysisService, ServiceError, ServiceResponse};
use crate::models::analysis::{AnalysisRequest, AnalysisResult, FallbackReason};

/// What to do when the rate limiter has no token for a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePolicy {
    Fallback,
    /// Wait `wait` and re-check, at most `max_waits` times, then fall back.
    RetryLater { max_waits: u32, wait: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub cache_ttl: Duration,
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    pub backoff_base: Duration,
    /// Upper bound of the random delay added to each backoff.
    pub backoff_jitter: Duration,
    pub throttle: ThrottlePolicy,
    pub call_timeout: Duration,
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_ttl.is_zero() {
            return Err(ConfigError::NotPositive("ANALYSIS_CACHE_TTL_SECS"));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::NotPositive("AI_CALL_TIMEOUT_SECS"));
        }
        if let ThrottlePolicy::RetryLater { wait, .. } = self.throttle {
            if wait.is_zero() {
                return Err(ConfigError::NotPositive("AI_THROTTLE_WAIT_MS"));
            }
        }
        Ok(())
    }

    /// `base * 2^(attempt-1)` plus up to `backoff_jitter` of random delay.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(1 << exponent);
        let jitter_ms = u64::try_from(self.backoff_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        delay.saturating_add(Duration::from_millis(jitter))
    }
}

enum Stage {
    CacheLookup,
    BudgetCheck,
    RateCheck { reserved: Reservation },
    CallExternal { reserved: Reservation },
    CacheStore { response: ServiceResponse, reserved: Reservation },
    Fallback { reason: FallbackReason, reserved: Option<Reservation> },
    Done(AnalysisResult),
}

/// Owns the process-wide limiter, budget and usage counters; shares the cache.
pub struct AnalysisOrchestrator {
    service: Arc<dyn AnalysisService>,
    cache: Arc<ResponseCache>,
    limiter: RateLimiter,
    budget: CostTracker,
    usage: UsageStats,
    config: OrchestratorConfig,
}

impl AnalysisOrchestrator {
    pub fn new(
        service: Arc<dyn AnalysisService>,
        cache: Arc<ResponseCache>,
        limiter: RateLimiter,
        budget: CostTracker,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            service,
            cache,
            limiter,
            budget,
            usage: UsageStats::new(),
            config,
        }
    }

    pub fn from_config(
        service: Arc<dyn AnalysisService>,
        cache: Arc<ResponseCache>,
        config: &RankingConfig,
    ) -> Self {
        Self::new(
            service,
            cache,
            RateLimiter::new(config.rate_capacity, config.rate_refill_per_sec),
            CostTracker::new(config.budget_ceiling, config.budget_period, Utc::now()),
            config.orchestrator.clone(),
        )
    }

    /// Runs one request through the state machine. Always returns a result:
    /// fresh, cached, or a deterministic fallback.
    pub async fn analyze(&self, request: &AnalysisRequest) -> AnalysisResult {
        let key = fingerprint(request);
        let mut failures = 0u32;
        let mut throttle_waits = 0u32;
        let mut stage = Stage::CacheLookup;

        loop {
            stage = match stage {
                Stage::CacheLookup => match self.cache.get(&key) {
                    Some(hit) => {
                        debug!("Cache hit for project {} ({key})", request.project_id);
                        self.usage.record_cached();
                        Stage::Done(hit.into_cached())
                    }
                    None => Stage::BudgetCheck,
                },

                Stage::BudgetCheck => {
                    let estimate = self.service.estimate_cost(request);
                    if let Some(reserved) = self.budget.try_reserve(estimate) {
                        Stage::RateCheck { reserved }
                    } else {
                        info!(
                            "Budget exhausted, skipping analysis call for project {} (estimate ${estimate:.4})",
                            request.project_id
                        );
                        Stage::Fallback {
                            reason: FallbackReason::BudgetExhausted,
                            reserved: None,
                        }
                    }
                }

                Stage::RateCheck { reserved } => {
                    if self.limiter.try_acquire(1) {
                        Stage::CallExternal { reserved }
                    } else {
                        match self.config.throttle {
                            ThrottlePolicy::RetryLater { max_waits, wait }
                                if throttle_waits < max_waits =>
                            {
                                throttle_waits += 1;
                                debug!(
                                    "Rate limited for project {}, waiting {}ms ({throttle_waits}/{max_waits})",
                                    request.project_id,
                                    wait.as_millis()
                                );
                                tokio::time::sleep(wait).await;
                                Stage::RateCheck { reserved }
                            }
                            _ => {
                                info!("Rate limited, falling back for project {}", request.project_id);
                                Stage::Fallback {
                                    reason: FallbackReason::RateLimited,
                                    reserved: Some(reserved),
                                }
                            }
                        }
                    }
                }

                Stage::CallExternal { reserved } => match self.call_with_timeout(request).await {
                    Ok(response) => Stage::CacheStore { response, reserved },
                    Err(err) if err.is_transient() && failures < self.config.max_retries => {
                        failures += 1;
                        self.usage.record_failed_call();
                        let delay = self.config.backoff_delay(failures);
                        warn!(
                            "Analysis call for project {} failed ({err}), retry {}/{} after {}ms",
                            request.project_id,
                            failures,
                            self.config.max_retries,
                            delay.as_millis()
                        );
                        tokio::time::sleep(delay).await;
                        Stage::RateCheck { reserved }
                    }
                    Err(err) if err.is_transient() => {
                        self.usage.record_failed_call();
                        warn!(
                            "Analysis call for project {} failed after {} attempts: {err}",
                            request.project_id,
                            failures + 1
                        );
                        Stage::Fallback {
                            reason: FallbackReason::RetriesExhausted,
                            reserved: Some(reserved),
                        }
                    }
                    Err(err) => {
                        self.usage.record_failed_call();
                        warn!(
                            "Analysis call for project {} failed permanently: {err}",
                            request.project_id
                        );
                        Stage::Fallback {
                            reason: FallbackReason::PermanentFailure,
                            reserved: Some(reserved),
                        }
                    }
                },

                Stage::CacheStore { response, reserved } => {
                    self.budget.record_actual(reserved, response.actual_cost);
                    self.usage.record_fresh(
                        response.input_tokens,
                        response.output_tokens,
                        response.actual_cost,
                    );
                    let result = AnalysisResult::fresh(response.enrichment, response.actual_cost);
                    self.cache.put(&key, &result, self.config.cache_ttl);
                    debug!("Stored fresh analysis for project {} ({key})", request.project_id);
                    Stage::Done(result)
                }

                Stage::Fallback { reason, reserved } => {
                    if let Some(reserved) = reserved {
                        self.budget.record_actual(reserved, 0.0);
                    }
                    self.usage.record_fallback();
                    Stage::Done(AnalysisResult::fallback(reason))
                }

                Stage::Done(result) => return result,
            };
        }
    }

    async fn call_with_timeout(
        &self,
        request: &AnalysisRequest,
    ) -> Result<ServiceResponse, ServiceError> {
        let timeout = self.config.call_timeout;
        match tokio::time::timeout(timeout, self.service.call(request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ServiceError::Timeout(timeout)),
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn usage_report(&self) -> UsageReport {
        self.usage.report()
    }

    pub fn reset_usage(&self) {
        self.usage.reset();
    }

    pub fn save_ledger(&self, path: &Path) -> Result<(), SnapshotError> {
        ledger::save_ledger(path, &self.usage, &self.budget)
    }

    /// Returns whether the persisted spend was still in its period and applied.
    pub fn restore_ledger(&self, path: &Path) -> Result<bool, SnapshotError> {
        ledger::restore_ledger(path, &self.usage, &self.budget, Utc::now())
    }

    pub fn budget_snapshot(&self) -> BudgetSnapshot {
        self.budget.snapshot()
    }

    pub fn available_tokens(&self) -> f64 {
        self.limiter.available()
    }
}
