use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use orderflow_core::Error;

/// HTTP-facing wrapper over the core error
///
/// Validation and domain errors surface directly; infrastructure errors are
/// collapsed to their status code with the detail kept in the logs.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = match &self.0 {
            Error::InsufficientStock(items) => json!({
                "error": self.0.category(),
                "message": "Insufficient stock for some items",
                "failed_items": items,
            }),
            _ => json!({
                "error": self.0.category(),
                "message": self.0.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Result alias for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use orderflow_core::FailedItem;

    #[test]
    fn test_status_mapping() {
        let response = ApiError(Error::not_found("Order not found")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = ApiError(Error::unauthorized("no token")).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = ApiError(Error::PaymentDeclined("Card declined".into())).into_response();
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    }

    #[test]
    fn test_insufficient_stock_maps_to_400() {
        let response = ApiError(Error::InsufficientStock(vec![FailedItem {
            sku_id: uuid::Uuid::nil(),
            requested: 3,
            reason: "insufficient_stock".to_string(),
        }]))
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
