use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::entities::{QueueStats, QueuedNotification};
use crate::infrastructure::http::middleware::{ApiResult, AppState};

/// GET /api/queue/stats - Counts per delivery status plus the pending total
pub async fn get_queue_stats(State(state): State<AppState>) -> ApiResult<Json<QueueStats>> {
    let stats = state.delivery_service.get_queue_stats().await?;
    Ok(Json(stats))
}

/// GET /api/queue/notifications/:id - Current state of one queued notification
pub async fn get_notification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<QueuedNotification>> {
    let notification = state.delivery_service.get_notification(&id).await?;
    Ok(Json(notification))
}
