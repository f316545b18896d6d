use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::analysis::AnalysisRequest;

/// SHA-256 digest (hex) over the result-relevant content of an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content-addressed key for the response cache.
///
/// Covers exactly what reaches the analysis prompt: schema version, depth,
/// category scores, skills (in order) and counts. Trace id, timestamps and the
/// project identity are excluded. Every variable-length field is length-prefixed
/// and maps iterate in key order, so the digest is stable across processes.
pub fn fingerprint(request: &AnalysisRequest) -> Fingerprint {
    let bundle = &request.bundle;
    let mut hasher = Sha256::new();

    hasher.update(request.schema_version.to_le_bytes());
    update_str(&mut hasher, request.depth.as_str());

    hasher.update((bundle.categories.len() as u64).to_le_bytes());
    for (name, value) in &bundle.categories {
        update_str(&mut hasher, name);
        hasher.update(value.to_bits().to_le_bytes());
    }

    hasher.update((bundle.skills.len() as u64).to_le_bytes());
    for skill in &bundle.skills {
        update_str(&mut hasher, skill);
    }

    hasher.update((bundle.counts.len() as u64).to_le_bytes());
    for (name, value) in &bundle.counts {
        update_str(&mut hasher, name);
        hasher.update(value.to_le_bytes());
    }

    Fingerprint(hex::encode(hasher.finalize()))
}

fn update_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}
