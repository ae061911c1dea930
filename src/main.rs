use notifier::bootstrap;
use notifier::config::Config;
use notifier::infrastructure::http::build_router;
use notifier::infrastructure::http::middleware::AppState;
use notifier::infrastructure::observability;
use notifier::infrastructure::workers::DeliveryWorker;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    let _guard = observability::init(&config)?;
    tracing::info!("Configuration loaded");

    let service = bootstrap::build_engine(&config).await?;
    tracing::info!(
        "Delivery engine ready with channels {:?}",
        service.registered_channels().await
    );

    // Start background delivery
    let worker = DeliveryWorker::new(service.clone(), config.worker.clone()).start();

    let app = build_router(AppState::new(service));

    let addr = config.server_address();
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, draining delivery worker");
    worker.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
