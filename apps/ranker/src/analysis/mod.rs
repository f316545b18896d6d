// AI-assisted analysis.
// Fingerprinting, the TTL response cache, the token-bucket limiter, the budget
// tracker, usage counters and their persisted ledger, sequenced per request by
// the orchestrator. All external calls go through llm_client.

pub mod cache;
pub mod cost_tracker;
pub mod fingerprint;
pub mod handlers;
pub mod ledger;
pub mod orchestrator;
pub mod prompts;
pub mod rate_limiter;
pub mod usage;
