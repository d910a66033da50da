//! Request middleware: correlation IDs, metrics and bearer auth
//!
//! Every request gets an `X-Correlation-ID` (propagated when supplied,
//! generated otherwise) which is echoed on the response and available to
//! handlers. Latency, in-flight and error metrics use the fixed names the
//! dashboards expect.

use axum::async_trait;
use axum::extract::{FromRequestParts, MatchedPath, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use uuid::Uuid;

use orderflow_core::metrics::names;
use orderflow_core::{users, Error};

use crate::error::ApiError;
use crate::state::AppState;

pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Correlation ID attached to the request extensions
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

/// Track request metrics and propagate the correlation ID
pub async fn track_requests(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let service = state.config.service.name.clone();
    let method = request.method().to_string();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let correlation_id = request
        .headers()
        .get(CORRELATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| Uuid::parse_str(v).ok())
        .unwrap_or_else(Uuid::new_v4);
    request.extensions_mut().insert(CorrelationId(correlation_id));

    metrics::gauge!(names::HTTP_IN_FLIGHT, "service" => service.clone()).increment(1.0);
    let started = Instant::now();

    let mut response = next.run(request).await;

    let latency = started.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    metrics::histogram!(
        names::HTTP_REQUEST_DURATION,
        "service" => service.clone(),
        "endpoint" => endpoint.clone(),
        "method" => method.clone(),
        "status" => status.clone(),
    )
    .record(latency);
    metrics::gauge!(names::HTTP_IN_FLIGHT, "service" => service.clone()).decrement(1.0);

    if let Ok(value) = HeaderValue::from_str(&correlation_id.to_string()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }

    tracing::info!(
        "Request completed: method={}, path={}, status={}, latency={:.3}s, correlation_id={}",
        method,
        endpoint,
        status,
        latency,
        correlation_id
    );

    response
}

/// Authenticated caller, extracted from the bearer token
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError(Error::unauthorized("Missing authorization header")))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError(Error::unauthorized("Invalid authorization header")))?;

        let user_id = users::decode_token(token, &state.config.auth.jwt_secret)?;
        Ok(AuthUser(user_id))
    }
}
