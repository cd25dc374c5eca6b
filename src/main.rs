//! Traffic Console - operator service for concurrent inference sessions
//!
//! Main entry point for the console server.

use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traffic_console::{
    inference_client::{InferenceClient, StreamBackend},
    session_export::SessionLedger,
    session_orchestrator::StreamOrchestrator,
    session_store::{SessionStore, SessionStoreClient},
    slot_pool::SlotPool,
    state::{AppConfig, AppState},
    web_api,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "traffic_console=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Traffic Console v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        inference_url = %config.inference_url,
        session_store_url = %config.session_store_url,
        slot_count = config.slot_count,
        poll_interval_ms = config.stats_poll_interval.as_millis() as u64,
        "Configuration loaded"
    );

    if config.start_timeout.is_none() {
        tracing::warn!("START_TIMEOUT_SEC not set, a hung start call keeps its slot initializing");
    }

    // Initialize components
    let backend: Arc<dyn StreamBackend> = Arc::new(InferenceClient::new(
        &config.inference_url,
        config.request_timeout,
        config.stats_timeout,
    )?);
    let store: Arc<dyn SessionStore> = Arc::new(SessionStoreClient::new(
        &config.session_store_url,
        config.request_timeout,
    )?);

    let pool = Arc::new(SlotPool::new(config.slot_count)?);
    let orchestrator = Arc::new(StreamOrchestrator::new(
        pool,
        backend,
        config.orchestrator_config()?,
    ));
    tracing::info!("StreamOrchestrator initialized");

    match orchestrator.load_models().await {
        Ok(models) => tracing::info!(count = models.len(), "Models available"),
        Err(e) => tracing::error!(error = %e, "Failed to load model catalog, starts will be rejected"),
    }

    let ledger = Arc::new(SessionLedger::new(store.clone()));
    if let Err(e) = ledger.refresh().await {
        tracing::warn!(error = %e, "Session history unavailable at startup");
    }

    let state = AppState {
        config: config.clone(),
        orchestrator: orchestrator.clone(),
        store,
        ledger,
    };

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(orchestrator))
        .await?;

    Ok(())
}

/// Ctrl-C: stop every slot before exiting
async fn shutdown_signal(orchestrator: Arc<StreamOrchestrator>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    tracing::info!("Shutdown requested, stopping all streams");
    let report = orchestrator.stop_all().await;
    tracing::info!(stopped = ?report.stopped, "Streams stopped");
}
