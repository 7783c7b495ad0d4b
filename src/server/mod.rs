//! HTTP Server
//!
//! Axum router hosting the WebSocket endpoint.
//!
//! # Endpoints
//!
//! - `GET {ws_path}` - WebSocket upgrade (default `/ws`)
//! - `GET /health/live` - Liveness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! let mut routes = RouteTable::new();
//! let mut injector = Injector::new();
//! echo::register(&mut routes, &mut injector)?;
//!
//! let state = AppState::new(routes, injector, echo::handshake, ServerConfig::default());
//! server::serve(state).await?;
//! ```

mod health;
mod state;

pub use health::HealthResponse;
pub use state::AppState;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let health_routes = Router::new()
        .route("/live", get(health::liveness))
        .route("/", get(health::full_health));

    let ws_path = state.config.ws_path.clone();
    let shared_state = Arc::new(state);

    Router::new()
        .route(&ws_path, get(websocket_handler))
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server and run until Ctrl+C or SIGTERM
pub async fn serve(state: AppState) -> std::io::Result<()> {
    let addr = state.config.addr();
    let routes = state.routes.len();
    let ws_path = state.config.ws_path.clone();
    let router = build_router(state);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(routes, "Switchboard listening on {}{}", addr, ws_path);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Switchboard shut down gracefully");
    Ok(())
}

/// Bind the configured address and serve in the background.
///
/// Returns the bound address, so port 0 picks a free port.
pub async fn spawn(state: AppState) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
    let listener = TcpListener::bind(state.config.addr()).await?;
    let addr = listener.local_addr()?;
    let router = build_router(state);

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((addr, handle))
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::echo;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::util::ServiceExt;

    fn create_test_app(config: ServerConfig) -> Router {
        build_router(echo::app_state(config).unwrap())
    }

    #[tokio::test]
    async fn test_health_live() {
        let app = create_test_app(ServerConfig::default());

        let response = app
            .oneshot(Request::builder().uri("/health/live").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_health_full() {
        let app = create_test_app(ServerConfig::default());

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let health: HealthResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.connections, 0);
        assert_eq!(health.routes, 4);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_ws_path_is_configurable() {
        let config = ServerConfig {
            ws_path: "/socket".to_string(),
            ..ServerConfig::default()
        };

        let response = create_test_app(config.clone())
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Mounted, but a plain GET is not an upgrade
        let response = create_test_app(config)
            .oneshot(Request::builder().uri("/socket").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.status().is_client_error());
    }
}
