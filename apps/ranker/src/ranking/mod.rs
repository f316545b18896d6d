// Batch ranking.
// Fetches bundles, enriches them through the orchestrator, scores them and
// orders the batch. Persisting the outcome is left to the caller.

pub mod batch;
pub mod handlers;
pub mod persistence;
pub mod pipeline;
