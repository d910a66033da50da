use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use orderflow_core::models::{CreateProductRequest, ProductResponse, StockUpdateRequest};

use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
}

/// List products, optionally filtered by category
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<ProductResponse>>> {
    let products = state.inventory.list_products(query.category.as_deref()).await?;
    Ok(Json(products))
}

/// Product detail
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state.inventory.get_product(product_id).await?;
    Ok(Json(product))
}

/// Create product
pub async fn create_product(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(payload): Json<CreateProductRequest>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let product = state.inventory.create_product(payload).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Admin stock adjustment
pub async fn update_stock(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<StockUpdateRequest>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state.inventory.update_stock(product_id, payload).await?;
    Ok(Json(product))
}

/// Router for product routes
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/products", get(list_products).post(create_product))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/products/:id/stock", put(update_stock))
}
