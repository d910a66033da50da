//! HTTP server bootstrap
//!
//! Builds the per-service router, layers middleware and serves with graceful
//! shutdown: the listener closes first, in-flight requests drain, then the
//! caller stops the workers.

use axum::{middleware, Router};
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use orderflow_core::{Error, Result};

use crate::routes;
use crate::state::AppState;

/// Which HTTP surface a process exposes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Users,
    Orders,
    Inventory,
    Payments,
    All,
}

impl ServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceKind::Users => "user-service",
            ServiceKind::Orders => "order-service",
            ServiceKind::Inventory => "inventory-service",
            ServiceKind::Payments => "payment-service",
            ServiceKind::All => "orderflow",
        }
    }
}

/// Build the router for a service kind
pub fn build_router(state: AppState, kind: ServiceKind) -> Router {
    let api = match kind {
        ServiceKind::Users => routes::users::router(),
        ServiceKind::Orders => routes::orders::router(),
        ServiceKind::Inventory => routes::products::router(),
        ServiceKind::Payments => routes::payments::router(),
        ServiceKind::All => routes::users::router()
            .merge(routes::orders::router())
            .merge(routes::products::router())
            .merge(routes::payments::router()),
    };

    api.merge(routes::health::router())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            crate::middleware::track_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Serve until the shutdown future resolves
pub async fn run(
    state: AppState,
    kind: ServiceKind,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let host = state
        .config
        .service
        .host
        .parse::<std::net::IpAddr>()
        .map_err(|e| Error::Config(format!("Invalid host: {}", e)))?;
    let addr = SocketAddr::from((host, state.config.service.port));

    let app = build_router(state, kind);

    info!("{} listening on http://{}", kind.as_str(), addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Other(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Other(format!("Server error: {}", e)))?;

    Ok(())
}
