use anyhow::Result;
use axum::{
    Router,
    routing::{get, post},
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use super::{handlers, state::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Connectivity and raw operations
        .route("/test-connection", post(handlers::test_connection))
        .route("/execute", post(handlers::execute_operation))
        // Config table
        .route("/allconfig", post(handlers::check_table))
        .route("/allconfig-operation", post(handlers::config_table_operation))
        .with_state(Arc::new(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

pub async fn start_server(state: AppState, bind_address: SocketAddr) -> Result<()> {
    let app = router(state);

    info!("Server listening on {}", bind_address);

    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
