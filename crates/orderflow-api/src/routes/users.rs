use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use orderflow_core::models::{LoginRequest, RegisterRequest, Token, UserResponse};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// Create user
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.auth.register(payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// Exchange credentials for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<Token>> {
    let token = state.auth.login(payload).await?;
    Ok(Json(token))
}

/// Current user profile
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<UserResponse>> {
    let user = state.auth.get_user(user_id).await?;
    Ok(Json(user))
}

/// Router for user routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/users/register", post(register))
        .route("/api/v1/users/login", post(login))
        .route("/api/v1/users/me", get(me))
}
