use axum::{
    extract::{Query, State},
    response::Json,
};

use crate::entities::stock_record::Model as StockRecord;
use crate::services::stock_ledger::{ReplenishStockRequest, StockFilter};
use crate::{ApiResponse, ApiResult, AppState};

/// List stock records
#[utoipa::path(
    get,
    path = "/api/v1/stock",
    summary = "List stock",
    params(
        ("componentType" = Option<String>, Query, description = "Component type, e.g. castor"),
        ("model" = Option<String>, Query, description = "Model name, case-insensitive"),
        ("shop" = Option<String>, Query, description = "Owning shop"),
    ),
    responses(
        (status = 200, description = "Stock records", body = ApiResponse<Vec<StockRecord>>),
    ),
    tag = "stock"
)]
pub async fn list_stock(
    State(state): State<AppState>,
    Query(filter): Query<StockFilter>,
) -> ApiResult<Vec<StockRecord>> {
    let records = state.stock.list(filter).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// Add stock to a ledger record, creating it if needed
#[utoipa::path(
    post,
    path = "/api/v1/stock/replenish",
    summary = "Replenish stock",
    request_body = ReplenishStockRequest,
    responses(
        (status = 200, description = "Updated stock record", body = ApiResponse<StockRecord>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
    ),
    tag = "stock"
)]
pub async fn replenish_stock(
    State(state): State<AppState>,
    Json(request): Json<ReplenishStockRequest>,
) -> ApiResult<StockRecord> {
    let record = state.stock.replenish(request).await?;
    Ok(Json(ApiResponse::success(record)))
}
