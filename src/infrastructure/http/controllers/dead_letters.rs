use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::domain::entities::DeadLetterEntry;
use crate::infrastructure::http::middleware::{ApiResult, AppState};

const MAX_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// GET /api/dead-letters - Most recent dead-lettered notifications first
pub async fn list_dead_letters(
    State(state): State<AppState>,
    Query(query): Query<DeadLetterQuery>,
) -> ApiResult<Json<Vec<DeadLetterEntry>>> {
    let entries = state
        .delivery_service
        .dead_letters()
        .list(query.limit.min(MAX_LIMIT))
        .await?;
    Ok(Json(entries))
}
