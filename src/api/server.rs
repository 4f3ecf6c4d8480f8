//! HTTP server wiring.

use crate::api::handlers;
use crate::core::Result;
use crate::federated::coordinator::RoundCoordinator;
use crate::federated::registry::ClusterRegistry;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ClusterRegistry>,
    pub coordinator: Arc<RoundCoordinator>,
}

impl AppState {
    pub fn new(registry: Arc<ClusterRegistry>, coordinator: Arc<RoundCoordinator>) -> Self {
        Self {
            registry,
            coordinator,
        }
    }
}

/// Build the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/federated/clientData/", post(handlers::client_data))
        .route("/federated/communicationRound/", post(handlers::communication_round))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;
    Ok(())
}
