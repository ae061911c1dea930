use crate::infrastructure::http::controllers::{
    dead_letters, health, queue, rate_limits, retry_configurations,
};
use crate::infrastructure::http::middleware::AppState;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/queue/stats", get(queue::get_queue_stats))
        .route(
            "/api/queue/notifications/:id",
            get(queue::get_notification),
        )
        .route(
            "/api/rate-limits/:channel",
            get(rate_limits::get_rate_limit),
        )
        .route(
            "/api/retry-configurations/:channel",
            get(retry_configurations::get_retry_configuration),
        )
        .route("/api/dead-letters", get(dead_letters::list_dead_letters))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
