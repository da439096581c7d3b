use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::errors::ServiceError;
use crate::models::AdmissionPayload;
use crate::services::orders::{
    OrderDetail, OrderFilter, OrderListResponse, OrderResponse, RequirementsPreview,
};
use crate::{ApiResponse, ApiResult, AppState, ListQuery};

/// Body returned when every order of a payload was admitted.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdmissionResponse {
    pub success: bool,
    pub orders: Vec<OrderResponse>,
}

/// Admit one order, a list of orders or a shop envelope
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Admit orders",
    description = "Reserve component stock and create orders. Accepts a single order, an array of orders, or `{shop, shopkeeper, items: [...]}`.",
    request_body(content = Object, description = "Order, array of orders, or shop envelope"),
    responses(
        (status = 201, description = "All orders admitted", body = AdmissionResponse),
        (status = 400, description = "invalid_order", body = crate::errors::AdmissionErrorBody),
        (status = 409, description = "insufficient_<component> or insufficient_back_model", body = crate::errors::AdmissionErrorBody),
        (status = 500, description = "server_error", body = crate::errors::AdmissionErrorBody),
    ),
    tag = "orders"
)]
pub async fn create_orders(
    State(state): State<AppState>,
    payload: Result<Json<AdmissionPayload>, JsonRejection>,
) -> Response {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            return ServiceError::InvalidInput(rejection.body_text()).into_admission_response()
        }
    };

    match state.admission.admit(payload).await {
        Ok(orders) => (
            StatusCode::CREATED,
            Json(AdmissionResponse {
                success: true,
                orders: orders.into_iter().map(OrderResponse::from).collect(),
            }),
        )
            .into_response(),
        Err(e) => e.into_admission_response(),
    }
}

/// List orders with pagination
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default: 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default: 20)"),
        ("status" = Option<String>, Query, description = "Filter by order status"),
        ("shop" = Option<String>, Query, description = "Filter by owning shop"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
    Query(filter): Query<OrderFilter>,
) -> ApiResult<OrderListResponse> {
    let orders = state.orders.list(query.page, query.limit, filter).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Get an order with its recomputed component requirements
#[utoipa::path(
    get,
    path = "/api/v1/orders/{order_number}",
    summary = "Get order by number",
    params(("order_number" = String, Path, description = "Order number")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderDetail>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
) -> ApiResult<OrderDetail> {
    let order = state.orders.get_by_number(&order_number).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Compute the component requirements of a payload without reserving
#[utoipa::path(
    post,
    path = "/api/v1/orders/requirements",
    summary = "Preview requirements",
    request_body(content = Object, description = "Same shapes as order admission"),
    responses(
        (status = 200, description = "Requirements per order", body = ApiResponse<Vec<RequirementsPreview>>),
        (status = 400, description = "invalid_order", body = crate::errors::ErrorResponse),
    ),
    tag = "orders"
)]
pub async fn preview_requirements(
    State(state): State<AppState>,
    payload: Result<Json<AdmissionPayload>, JsonRejection>,
) -> ApiResult<Vec<RequirementsPreview>> {
    let Json(payload) = payload.map_err(|r| ServiceError::InvalidInput(r.body_text()))?;
    let previews = state.orders.preview(payload)?;
    Ok(Json(ApiResponse::success(previews)))
}
