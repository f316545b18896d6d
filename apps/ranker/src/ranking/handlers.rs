use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::signals::ProjectId;
use crate::ranking::batch::BatchOutcome;
use crate::ranking::persistence::save_scores;
use crate::state::AppState;

const MAX_BATCH_SIZE: usize = 1000;

#[derive(Deserialize)]
pub struct RankingRequest {
    pub project_ids: Vec<ProjectId>,
}

#[derive(Serialize)]
pub struct RankingResponse {
    pub batch_id: Uuid,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

/// POST /api/v1/rankings
/// Ranks the requested projects and persists the ranked scores.
pub async fn handle_rank(
    State(state): State<AppState>,
    Json(req): Json<RankingRequest>,
) -> Result<Json<RankingResponse>, AppError> {
    validate_request(&req)?;

    let batch_id = Uuid::new_v4();
    let outcome = state
        .coordinator
        .rank(req.project_ids, state.shutdown.child_token())
        .await;

    if !outcome.ranked.is_empty() {
        save_scores(&state.db, batch_id, &outcome.ranked).await?;
    }

    Ok(Json(RankingResponse { batch_id, outcome }))
}

fn validate_request(req: &RankingRequest) -> Result<(), AppError> {
    if req.project_ids.is_empty() {
        return Err(AppError::Validation("project_ids must not be empty".to_string()));
    }
    if req.project_ids.len() > MAX_BATCH_SIZE {
        return Err(AppError::Validation(format!(
            "at most {MAX_BATCH_SIZE} projects per batch, got {}",
            req.project_ids.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch_rejected() {
        let req = RankingRequest { project_ids: vec![] };
        assert!(matches!(validate_request(&req), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_oversized_batch_rejected() {
        let req = RankingRequest {
            project_ids: (0..=MAX_BATCH_SIZE as i64).collect(),
        };
        assert!(matches!(validate_request(&req), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_reasonable_batch_accepted() {
        let req = RankingRequest { project_ids: vec![1, 2, 3] };
        assert!(validate_request(&req).is_ok());
    }
}
