//! REST API and WebSocket server for the uptime hub
//!
//! A thin surface over the registry and the live feed; the monitoring core
//! runs the same with or without it.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - **Registry + actor handles** shared through [`ApiState`]
//! - **WebSocket** for the live feed
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/stats` - System statistics
//! - `GET /api/v1/services` - Snapshot of all services
//! - `POST /api/v1/services` - Register a service
//! - `GET /api/v1/services/:name` - Service record and aggregates
//! - `PUT /api/v1/services/:name` - Change a service's target
//! - `DELETE /api/v1/services/:name` - Deregister a service
//! - `WS /api/v1/stream` - Live feed

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::{
    CreateServiceRequest, HealthResponse, ServiceDetailResponse, ServicesResponse, StatsResponse,
    UpdateServiceRequest,
};

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ApiSettings;

/// Build the router with all routes and configured middleware
pub fn router(state: ApiState, settings: &ApiSettings) -> Router {
    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/stats", get(routes::stats::get_stats))
        .route(
            "/api/v1/services",
            get(routes::services::list_services).post(routes::services::create_service),
        )
        .route(
            "/api/v1/services/:name",
            get(routes::services::get_service)
                .put(routes::services::update_service)
                .delete(routes::services::delete_service),
        )
        .route("/api/v1/stream", get(websocket::websocket_handler))
        .with_state(state);

    if let Some(token) = settings.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    app = app.layer(TraceLayer::new_for_http());

    // Outermost, so preflight requests are answered before authentication
    if settings.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
pub async fn spawn_api_server(settings: &ApiSettings, state: ApiState) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", settings.bind_addr);

    let app = router(state, settings);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
