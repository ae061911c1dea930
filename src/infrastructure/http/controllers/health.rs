use axum::{extract::State, Json};
use serde::Serialize;

use crate::domain::entities::NotificationChannel;
use crate::infrastructure::http::middleware::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub channels: Vec<NotificationChannel>,
}

/// GET /health - Liveness plus the channels that currently have an adapter
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        channels: state.delivery_service.registered_channels().await,
    })
}
