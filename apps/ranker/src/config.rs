use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;

use crate::analysis::orchestrator::{OrchestratorConfig, ThrottlePolicy};
use crate::llm_client::LlmSettings;
use crate::models::analysis::AnalysisDepth;
use crate::scoring::engine::ScoringWeights;

/// Configuration problems detected at startup. These are the only errors the
/// ranking core ever propagates to its caller.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("weight for category '{category}' must be a finite, non-negative number (got {value})")]
    InvalidWeight { category: String, value: f64 },

    #[error("malformed weight entry '{0}', expected name=value")]
    MalformedWeight(String),

    #[error("at least one category weight must be configured")]
    NoWeights,

    #[error("category weights are too large: their sum is not a finite number")]
    WeightSumOverflow,

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{0} must be a finite, non-negative number")]
    Negative(&'static str),
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or values are invalid.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub rust_log: String,
    pub llm: LlmSettings,
    pub ranking: RankingConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ranking = RankingConfig::from_lookup(|key| std::env::var(key).ok())?;
        ranking.validate()?;

        let anthropic_api_key = if ranking.enrichment_enabled {
            require_env("ANTHROPIC_API_KEY")?
        } else {
            String::new()
        };

        let llm = LlmSettings {
            api_key: anthropic_api_key,
            max_output_tokens: parse_var(
                &|key| std::env::var(key).ok(),
                "AI_MAX_OUTPUT_TOKENS",
                1024,
            )?,
            input_cost_per_mtok: parse_var(
                &|key| std::env::var(key).ok(),
                "AI_INPUT_COST_PER_MTOK",
                3.0,
            )?,
            output_cost_per_mtok: parse_var(
                &|key| std::env::var(key).ok(),
                "AI_OUTPUT_COST_PER_MTOK",
                15.0,
            )?,
            timeout: ranking.orchestrator.call_timeout,
        };
        llm.validate()?;

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            llm,
            ranking,
        })
    }
}

/// Everything the ranking core needs: weights, orchestrator policy, limiter,
/// budget and worker pool sizing.
#[derive(Debug, Clone)]
pub struct RankingConfig {
    pub weights: ScoringWeights,
    pub orchestrator: OrchestratorConfig,
    pub rate_capacity: f64,
    pub rate_refill_per_sec: f64,
    pub budget_ceiling: f64,
    pub budget_period: Duration,
    pub workers: usize,
    pub analysis_depth: AnalysisDepth,
    pub enrichment_enabled: bool,
    pub cache_sweep_interval: Duration,
    pub cache_snapshot_path: Option<PathBuf>,
    /// Usage counters and budget spend. Defaults to `ai_usage_stats.json`
    /// next to the cache snapshot.
    pub usage_snapshot_path: Option<PathBuf>,
}

impl RankingConfig {
    /// Builds the config from a key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let weights = parse_weights(
            &lookup("RANKING_WEIGHTS").unwrap_or_else(|| {
                "skills=1,comprehension=1,efficiency=1,contribution=1,ai_depth=1".to_string()
            }),
        )?;

        let throttle_waits: u32 = parse_var(&lookup, "AI_THROTTLE_WAITS", 0)?;
        let throttle = if throttle_waits == 0 {
            ThrottlePolicy::Fallback
        } else {
            ThrottlePolicy::RetryLater {
                max_waits: throttle_waits,
                wait: Duration::from_millis(parse_var(&lookup, "AI_THROTTLE_WAIT_MS", 1000)?),
            }
        };

        let depth_raw = lookup("AI_ANALYSIS_DEPTH").unwrap_or_else(|| "technical".to_string());
        let analysis_depth = AnalysisDepth::parse(&depth_raw)
            .with_context(|| format!("AI_ANALYSIS_DEPTH '{depth_raw}' is not one of overview, technical, full"))?;

        let cache_snapshot_path = lookup("CACHE_SNAPSHOT_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);

        Ok(RankingConfig {
            weights,
            orchestrator: OrchestratorConfig {
                // 7 days, matching how long analysis results stay meaningful for a scan
                cache_ttl: Duration::from_secs(parse_var(&lookup, "ANALYSIS_CACHE_TTL_SECS", 604_800)?),
                max_retries: parse_var(&lookup, "AI_MAX_RETRIES", 3)?,
                backoff_base: Duration::from_millis(parse_var(&lookup, "AI_BACKOFF_BASE_MS", 1000)?),
                backoff_jitter: Duration::from_millis(parse_var(&lookup, "AI_BACKOFF_JITTER_MS", 250)?),
                throttle,
                call_timeout: Duration::from_secs(parse_var(&lookup, "AI_CALL_TIMEOUT_SECS", 120)?),
            },
            rate_capacity: parse_var(&lookup, "AI_RATE_CAPACITY", 15.0)?,
            // 15 requests per minute
            rate_refill_per_sec: parse_var(&lookup, "AI_RATE_REFILL_PER_SEC", 0.25)?,
            budget_ceiling: parse_var(&lookup, "AI_BUDGET_USD", 5.0)?,
            budget_period: Duration::from_secs(parse_var(&lookup, "AI_BUDGET_PERIOD_SECS", 86_400)?),
            workers: parse_var(&lookup, "RANKING_WORKERS", 4)?,
            analysis_depth,
            enrichment_enabled: parse_var(&lookup, "AI_ENRICHMENT_ENABLED", true)?,
            cache_sweep_interval: Duration::from_secs(parse_var(&lookup, "CACHE_SWEEP_INTERVAL_SECS", 300)?),
            usage_snapshot_path: lookup("USAGE_SNAPSHOT_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
                .or_else(|| {
                    cache_snapshot_path
                        .as_ref()
                        .map(|p| p.with_file_name("ai_usage_stats.json"))
                }),
            cache_snapshot_path,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if self.workers == 0 {
            return Err(ConfigError::NotPositive("RANKING_WORKERS"));
        }
        if !(self.rate_capacity.is_finite() && self.rate_capacity > 0.0) {
            return Err(ConfigError::NotPositive("AI_RATE_CAPACITY"));
        }
        if !(self.rate_refill_per_sec.is_finite() && self.rate_refill_per_sec >= 0.0) {
            return Err(ConfigError::Negative("AI_RATE_REFILL_PER_SEC"));
        }
        if !(self.budget_ceiling.is_finite() && self.budget_ceiling >= 0.0) {
            return Err(ConfigError::Negative("AI_BUDGET_USD"));
        }
        if self.budget_period.is_zero() {
            return Err(ConfigError::NotPositive("AI_BUDGET_PERIOD_SECS"));
        }
        if self.cache_sweep_interval.is_zero() {
            return Err(ConfigError::NotPositive("CACHE_SWEEP_INTERVAL_SECS"));
        }
        self.orchestrator.validate()
    }
}

/// Parses `skills=2,comprehension=1` into validated weights.
pub fn parse_weights(raw: &str) -> Result<ScoringWeights, ConfigError> {
    let mut pairs = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, value) = entry
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedWeight(entry.to_string()))?;
        let name = name.trim();
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::MalformedWeight(entry.to_string()))?;
        if name.is_empty() {
            return Err(ConfigError::MalformedWeight(entry.to_string()));
        }
        pairs.push((name.to_string(), value));
    }
    ScoringWeights::new(pairs)
}

fn parse_var<T, F>(lookup: &F, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}")),
        _ => Ok(default),
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}
