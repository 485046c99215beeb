use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod state;

use score_scan::config;
use score_scan::lookup::HttpScoreLookup;
use score_scan::scan::ScanManager;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "score_scan=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration / 加载配置
    config::init_config().map_err(anyhow::Error::msg)?;
    let app_config = config::config();
    tracing::info!("score-scan built at {}", env!("BUILD_TIME"));
    tracing::info!("Server will listen on {}:{}", app_config.server.host, app_config.server.port);

    let lookup = HttpScoreLookup::new(&app_config.lookup)?;
    tracing::info!("Lookup endpoint: {}", lookup.endpoint());

    let scan = Arc::new(ScanManager::new(Arc::new(lookup), app_config.scan.clone()));

    let state = Arc::new(AppState { scan: scan.clone() });

    let app = Router::new()
        .route("/api/health", get(api::server::health_check))
        .route("/api/server/status", get(api::server::get_server_status))
        .route("/api/scan/start", post(api::scan::start_scan))
        .route("/api/scan/cancel", post(api::scan::cancel_scan))
        .route("/api/scan/parallelism", post(api::scan::update_parallelism))
        .route("/api/scan/clear", post(api::scan::clear))
        .route("/api/scan/clear_error", post(api::scan::clear_error))
        .route("/api/scan/state", get(api::scan::get_state))
        .route("/api/scan/ws", get(api::scan::state_socket))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let bind_addr = app_config.get_bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server running at http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 退出前停止仍在运行的扫描
    scan.shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
