use sqlx::types::Json;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::models::analysis::Provenance;
use crate::models::score::ImportanceScore;

/// Writes one completed batch to `importance_scores` in a single transaction.
/// Rows are append-only, keyed by `(batch_id, project_id)`.
pub async fn save_scores(
    pool: &PgPool,
    batch_id: Uuid,
    scores: &[ImportanceScore],
) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;

    for score in scores {
        sqlx::query(
            r#"
            INSERT INTO importance_scores
                (batch_id, project_id, rank, score, contributions, analysis, last_activity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(batch_id)
        .bind(score.project_id)
        .bind(i32::try_from(score.rank).unwrap_or(i32::MAX))
        .bind(score.score)
        .bind(Json(&score.contributions))
        .bind(score.analysis.map(provenance_label))
        .bind(score.last_activity)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    info!("Persisted {} importance scores for batch {batch_id}", scores.len());
    Ok(scores.len())
}

fn provenance_label(provenance: Provenance) -> &'static str {
    match provenance {
        Provenance::Fresh => "fresh",
        Provenance::Cached => "cached",
        Provenance::Fallback => "fallback",
    }
}
