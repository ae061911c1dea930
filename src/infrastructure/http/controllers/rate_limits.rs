use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::entities::{NotificationChannel, RateLimitStats};
use crate::infrastructure::http::middleware::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct RateLimitQuery {
    pub recipient: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecipientBudget {
    pub recipient: String,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    #[serde(flatten)]
    pub stats: RateLimitStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<RecipientBudget>,
}

/// GET /api/rate-limits/:channel - Rule and live counters, optionally for one recipient
pub async fn get_rate_limit(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Query(query): Query<RateLimitQuery>,
) -> ApiResult<Json<RateLimitResponse>> {
    let channel: NotificationChannel = channel.parse()?;
    let limiter = state.delivery_service.rate_limiter();

    let stats = limiter.get_stats(channel).await;
    let recipient = match query.recipient.filter(|r| !r.is_empty()) {
        Some(recipient) => Some(RecipientBudget {
            remaining: limiter.get_remaining_requests(&recipient, channel).await,
            reset_at: limiter.get_reset_time(&recipient, channel).await,
            recipient,
        }),
        None => None,
    };

    Ok(Json(RateLimitResponse { stats, recipient }))
}
