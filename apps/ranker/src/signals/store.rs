use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use thiserror::Error;

use crate::models::signals::{ProjectId, SignalBundle};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed signal bundle for project {project_id}: {reason}")]
    Malformed { project_id: ProjectId, reason: String },
}

/// Read-only source of signal bundles. `Ok(None)` means the project has never
/// been scanned.
#[async_trait]
pub trait SignalStore: Send + Sync {
    async fn get_signal_bundle(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<SignalBundle>, StoreError>;
}

#[derive(Debug, Clone, FromRow)]
pub struct ProjectSignalsRow {
    pub project_id: i64,
    pub categories: Value,
    pub skills: Vec<String>,
    pub counts: Value,
    pub last_activity: Option<DateTime<Utc>>,
    pub produced_at: DateTime<Utc>,
}

impl TryFrom<ProjectSignalsRow> for SignalBundle {
    type Error = StoreError;

    fn try_from(row: ProjectSignalsRow) -> Result<Self, Self::Error> {
        let project_id = row.project_id;
        let malformed = |field: &str, e: serde_json::Error| StoreError::Malformed {
            project_id,
            reason: format!("{field}: {e}"),
        };
        let categories: BTreeMap<String, f64> = serde_json::from_value(row.categories)
            .map_err(|e| malformed("categories", e))?;
        let counts: BTreeMap<String, u64> =
            serde_json::from_value(row.counts).map_err(|e| malformed("counts", e))?;

        Ok(SignalBundle {
            project_id,
            categories,
            skills: row.skills,
            counts,
            last_activity: row.last_activity,
            produced_at: row.produced_at,
        })
    }
}

/// `SignalStore` over the `project_signals` table.
#[derive(Clone)]
pub struct PgSignalStore {
    pool: PgPool,
}

impl PgSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SignalStore for PgSignalStore {
    async fn get_signal_bundle(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<SignalBundle>, StoreError> {
        let row = sqlx::query_as::<_, ProjectSignalsRow>(
            r#"
            SELECT project_id, categories, skills, counts, last_activity, produced_at
            FROM project_signals
            WHERE project_id = $1
            "#,
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SignalBundle::try_from).transpose()
    }
}
