//! Scripted `AnalysisService` for tests: replays a queue of outcomes and counts calls.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::llm_client::{AnalysisService, ServiceError, ServiceResponse};
use crate::models::analysis::{AnalysisRequest, Complexity, Enrichment};

pub enum Scripted {
    Succeed(f64),
    Fail(ServiceError),
    /// Sleeps longer than any sane call timeout before succeeding.
    Hang(Duration),
}

pub struct MockService {
    estimate: f64,
    script: Mutex<VecDeque<Scripted>>,
    calls: AtomicUsize,
}

impl MockService {
    /// Succeeds at the estimated cost once the script is exhausted.
    pub fn new(estimate: f64) -> Self {
        Self {
            estimate,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_script(estimate: f64, script: Vec<Scripted>) -> Self {
        Self {
            estimate,
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn enrichment_for(request: &AnalysisRequest) -> Enrichment {
    Enrichment {
        design_patterns: vec!["Repository".to_string()],
        complexity: Complexity::from_bundle(&request.bundle),
        depth_score: 0.9,
        summary: Some(format!("Project {}", request.project_id)),
    }
}

pub fn server_error() -> ServiceError {
    ServiceError::Api {
        status: 503,
        message: "overloaded".to_string(),
    }
}

pub fn auth_error() -> ServiceError {
    ServiceError::Api {
        status: 401,
        message: "invalid x-api-key".to_string(),
    }
}

#[async_trait]
impl AnalysisService for MockService {
    fn estimate_cost(&self, _request: &AnalysisRequest) -> f64 {
        self.estimate
    }

    async fn call(&self, request: &AnalysisRequest) -> Result<ServiceResponse, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front();
        let actual_cost = match next {
            None => self.estimate,
            Some(Scripted::Succeed(cost)) => cost,
            Some(Scripted::Fail(err)) => return Err(err),
            Some(Scripted::Hang(duration)) => {
                tokio::time::sleep(duration).await;
                self.estimate
            }
        };
        Ok(ServiceResponse {
            enrichment: enrichment_for(request),
            actual_cost,
            input_tokens: 100,
            output_tokens: 50,
        })
    }
}
