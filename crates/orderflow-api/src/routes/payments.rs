use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use uuid::Uuid;

use orderflow_core::models::{CreatePaymentRequest, PaymentResponse, RefundRequest};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

/// Synchronous payment attempt; a decline surfaces as 402
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let payment = state.payments.create_payment(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(payment)))
}

/// Payment detail
pub async fn get_payment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(payment_id): Path<Uuid>,
) -> ApiResult<Json<PaymentResponse>> {
    let payment = state.payments.get_payment(user_id, payment_id).await?;
    Ok(Json(payment))
}

/// Payment for an order
pub async fn get_payment_by_order(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> ApiResult<Json<PaymentResponse>> {
    let payment = state.payments.get_payment_by_order(user_id, order_id).await?;
    Ok(Json(payment))
}

/// Refund a completed payment
pub async fn refund_payment(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<RefundRequest>,
) -> ApiResult<Json<PaymentResponse>> {
    let payment = state
        .payments
        .refund_payment(user_id, payment_id, payload.reason)
        .await?;
    Ok(Json(payment))
}

/// Router for payment routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/payments", post(create_payment))
        .route("/api/v1/payments/:id", get(get_payment))
        .route("/api/v1/payments/:id/refund", post(refund_payment))
        .route("/api/v1/payments/order/:order_id", get(get_payment_by_order))
}
