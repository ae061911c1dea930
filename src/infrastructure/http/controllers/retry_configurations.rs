use axum::{
    extract::{Path, State},
    Json,
};

use crate::domain::entities::{NotificationChannel, RetryConfiguration};
use crate::infrastructure::http::middleware::{ApiResult, AppState};

/// GET /api/retry-configurations/:channel - Effective retry policy for a channel
pub async fn get_retry_configuration(
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> ApiResult<Json<RetryConfiguration>> {
    let channel: NotificationChannel = channel.parse()?;
    let config = state
        .delivery_service
        .retry_service()
        .get_retry_configuration_by_channel(channel)
        .await?;
    Ok(Json(config))
}
