#![allow(dead_code)]

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::models::signals::{ProjectId, SignalBundle};
use crate::signals::store::{SignalStore, StoreError};

/// `SignalStore` held entirely in memory. Projects can be marked as failing to
/// simulate an unavailable backend.
#[derive(Default)]
pub struct InMemorySignalStore {
    bundles: RwLock<HashMap<ProjectId, SignalBundle>>,
    failing: RwLock<HashSet<ProjectId>>,
}

impl InMemorySignalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bundle: SignalBundle) {
        self.bundles.write().insert(bundle.project_id, bundle);
    }

    pub fn fail_on(&self, project_id: ProjectId) {
        self.failing.write().insert(project_id);
    }
}

impl FromIterator<SignalBundle> for InMemorySignalStore {
    fn from_iter<I: IntoIterator<Item = SignalBundle>>(iter: I) -> Self {
        let store = Self::new();
        for bundle in iter {
            store.insert(bundle);
        }
        store
    }
}

#[async_trait]
impl SignalStore for InMemorySignalStore {
    async fn get_signal_bundle(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<SignalBundle>, StoreError> {
        if self.failing.read().contains(&project_id) {
            return Err(StoreError::Malformed {
                project_id,
                reason: "store unavailable".to_string(),
            });
        }
        Ok(self.bundles.read().get(&project_id).cloned())
    }
}
