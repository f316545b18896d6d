/// LLM Client: the single point of entry for all Claude API calls in the ranker.
///
/// ARCHITECTURAL RULE: No other module may call the Anthropic API directly.
/// All external analysis goes through `AnalysisService`, and only the
/// orchestrator calls that trait.
///
/// This client makes exactly one HTTP attempt per `call`. Retry, backoff,
/// throttling and budgeting are owned by `analysis::orchestrator`.
///
/// Model: claude-sonnet-4-5 (hardcoded, do not make configurable to prevent drift)
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::analysis::prompts::{build_analysis_prompt, ANALYSIS_SYSTEM};
use crate::config::ConfigError;
use crate::models::analysis::{AnalysisRequest, Complexity, Enrichment};

pub mod prompts;

#[cfg(test)]
pub mod mock;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The model used for all LLM calls in the ranker.
/// This is intentionally hardcoded to prevent accidental drift.
pub const MODEL: &str = "claude-sonnet-4-5";
/// Rough English average; good enough for budgeting before the call.
const CHARS_PER_TOKEN: usize = 4;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("LLM returned empty content")]
    EmptyContent,
}

impl ServiceError {
    /// Transient failures may succeed on retry: timeouts, connection problems,
    /// throttling and server errors. Everything else (bad request, auth,
    /// unusable response) is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            ServiceError::Timeout(_) => true,
            ServiceError::Http(e) => !e.is_builder() && !e.is_decode(),
            ServiceError::Api { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            ServiceError::Parse(_) | ServiceError::EmptyContent => false,
        }
    }
}

/// What the orchestrator gets back from a successful external call.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub enrichment: Enrichment,
    pub actual_cost: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// The external, metered analysis service. Opaque beyond estimating what a call
/// will cost and returning an enrichment plus what it actually cost.
#[async_trait]
pub trait AnalysisService: Send + Sync {
    fn estimate_cost(&self, request: &AnalysisRequest) -> f64;

    async fn call(&self, request: &AnalysisRequest) -> Result<ServiceResponse, ServiceError>;
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub max_output_tokens: u32,
    /// USD per million input tokens.
    pub input_cost_per_mtok: f64,
    /// USD per million output tokens.
    pub output_cost_per_mtok: f64,
    pub timeout: Duration,
}

impl LlmSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_output_tokens == 0 {
            return Err(ConfigError::NotPositive("AI_MAX_OUTPUT_TOKENS"));
        }
        if !(self.input_cost_per_mtok.is_finite() && self.input_cost_per_mtok >= 0.0) {
            return Err(ConfigError::Negative("AI_INPUT_COST_PER_MTOK"));
        }
        if !(self.output_cost_per_mtok.is_finite() && self.output_cost_per_mtok >= 0.0) {
            return Err(ConfigError::Negative("AI_OUTPUT_COST_PER_MTOK"));
        }
        Ok(())
    }

    pub fn cost(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        f64::from(input_tokens) / 1_000_000.0 * self.input_cost_per_mtok
            + f64::from(output_tokens) / 1_000_000.0 * self.output_cost_per_mtok
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

/// Shape the analysis prompt asks the model to return.
#[derive(Debug, Deserialize)]
struct EnrichmentPayload {
    #[serde(default)]
    design_patterns: Vec<String>,
    complexity: Complexity,
    depth_score: f64,
    #[serde(default)]
    summary: Option<String>,
}

impl From<EnrichmentPayload> for Enrichment {
    fn from(payload: EnrichmentPayload) -> Self {
        let depth_score = if payload.depth_score.is_finite() {
            payload.depth_score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        Enrichment {
            design_patterns: payload.design_patterns,
            complexity: payload.complexity,
            depth_score,
            summary: payload.summary.filter(|s| !s.trim().is_empty()),
        }
    }
}

/// The single LLM client used for project analysis.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    settings: LlmSettings,
}

impl LlmClient {
    pub fn new(settings: LlmSettings) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(settings.timeout).build()?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl AnalysisService for LlmClient {
    fn estimate_cost(&self, request: &AnalysisRequest) -> f64 {
        let prompt_chars = build_analysis_prompt(request).len() + ANALYSIS_SYSTEM.len();
        let input_tokens = u32::try_from(prompt_chars / CHARS_PER_TOKEN).unwrap_or(u32::MAX);
        // Assume the worst case on output so reservations are never too small.
        self.settings.cost(input_tokens, self.settings.max_output_tokens)
    }

    async fn call(&self, request: &AnalysisRequest) -> Result<ServiceResponse, ServiceError> {
        let prompt = build_analysis_prompt(request);
        let request_body = AnthropicRequest {
            model: MODEL,
            max_tokens: self.settings.max_output_tokens,
            system: ANALYSIS_SYSTEM,
            messages: vec![AnthropicMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.settings.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::Timeout(self.settings.timeout)
                } else {
                    ServiceError::Http(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<AnthropicError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ServiceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let llm_response: LlmResponse = response.json().await?;
        let text = llm_response.text().ok_or(ServiceError::EmptyContent)?;
        let payload: EnrichmentPayload = serde_json::from_str(strip_json_fences(text))?;

        let usage = &llm_response.usage;
        debug!(
            "Analysis call for project {} succeeded: input_tokens={}, output_tokens={}",
            request.project_id, usage.input_tokens, usage.output_tokens
        );

        Ok(ServiceResponse {
            enrichment: payload.into(),
            actual_cost: self.settings.cost(usage.input_tokens, usage.output_tokens),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        })
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"));
    match inner {
        Some(stripped) => stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start()),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::analysis::AnalysisDepth;
    use crate::models::signals::SignalBundle;

    fn settings() -> LlmSettings {
        LlmSettings {
            api_key: "test".to_string(),
            max_output_tokens: 1000,
            input_cost_per_mtok: 3.0,
            output_cost_per_mtok: 15.0,
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_strip_json_fences_with_json_tag() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_strip_json_fences_no_fences() {
        let input = "{\"key\": \"value\"}";
        assert_eq!(strip_json_fences(input), "{\"key\": \"value\"}");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ServiceError::Timeout(Duration::from_secs(1)).is_transient());
        for status in [408, 429, 500, 503, 529] {
            let err = ServiceError::Api {
                status,
                message: String::new(),
            };
            assert!(err.is_transient(), "status {status} should be transient");
        }
        for status in [400, 401, 403, 404, 422] {
            let err = ServiceError::Api {
                status,
                message: String::new(),
            };
            assert!(!err.is_transient(), "status {status} should be permanent");
        }
        assert!(!ServiceError::EmptyContent.is_transient());
    }

    #[test]
    fn test_cost_from_tokens() {
        // 1M input at $3 + 0.5M output at $15
        let cost = settings().cost(1_000_000, 500_000);
        assert!((cost - 10.5).abs() < 1e-9, "cost was {cost}");
    }

    #[test]
    fn test_estimate_covers_max_output() {
        let client = LlmClient::new(settings()).unwrap();
        let request = AnalysisRequest::new(
            SignalBundle::new(1).with_category("skills", 0.5),
            AnalysisDepth::Technical,
        );
        let estimate = client.estimate_cost(&request);
        let output_only = settings().cost(0, 1000);
        assert!(estimate > output_only);
    }

    #[test]
    fn test_payload_clamps_depth_score() {
        let payload: EnrichmentPayload = serde_json::from_str(
            r#"{"design_patterns": ["MVC"], "complexity": "advanced", "depth_score": 1.7, "summary": "  "}"#,
        )
        .unwrap();
        let enrichment: Enrichment = payload.into();
        assert_eq!(enrichment.depth_score, 1.0);
        assert_eq!(enrichment.complexity, Complexity::Advanced);
        assert!(enrichment.summary.is_none());
    }

    #[test]
    fn test_settings_reject_zero_output_tokens() {
        let mut s = settings();
        s.max_output_tokens = 0;
        assert_eq!(
            s.validate(),
            Err(ConfigError::NotPositive("AI_MAX_OUTPUT_TOKENS"))
        );
    }
}
