// Deterministic importance scoring.
// Combines a project's signal bundle (and optional AI enrichment) into a single
// comparable score, then produces a total ranking order.

pub mod engine;
