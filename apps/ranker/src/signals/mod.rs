// Signal store access.
// Read-only view of the per-project signal bundles produced by the extractors.

pub mod memory;
pub mod store;
