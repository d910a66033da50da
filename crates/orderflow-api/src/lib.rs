//! Orderflow HTTP surface
//!
//! Thin axum adapters over the core services: routers per domain service,
//! correlation-ID and metrics middleware, bearer-token auth extraction.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, run, ServiceKind};
pub use state::AppState;
