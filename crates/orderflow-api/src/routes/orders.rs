use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;
use uuid::Uuid;

use orderflow_core::models::{CreateOrderRequest, OrderResponse};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// Create order; returns 201 with status=pending, the saga decides the rest
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreateOrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    let order = state.orders.create_order(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List the caller's orders
pub async fn list_orders(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Json<Vec<OrderResponse>>> {
    let orders = state.orders.list_orders(user_id).await?;
    Ok(Json(orders))
}

/// Order detail; clients poll this to observe the terminal state
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<OrderResponse>> {
    let order = state.orders.get_order(user_id, order_id).await?;
    Ok(Json(order))
}

/// Cancel an order
pub async fn cancel_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    state.orders.cancel_order(user_id, order_id).await?;
    Ok(Json(json!({"message": "Order cancelled successfully"})))
}

/// Router for order routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/orders", post(create_order).get(list_orders))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/cancel", put(cancel_order))
}
