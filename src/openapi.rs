use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

use crate::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Furnishop API",
        version = "0.1.0",
        description = r#"
# Furnishop order admission

Admits furniture orders against the component stock ledger. A chair order
reserves its bill of materials (back, seat, arms, mechanism, gas lift,
castors, chrome and an optional headrest); a named back model reserves the
matching finished part instead of a generic back.

## Failure codes

Order admission failures use `{success: false, message, details}` where
`message` is one of `invalid_order` (400), `insufficient_<component>` (409),
`insufficient_back_model` (409) or `server_error` (500).
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    paths(
        crate::handlers::orders::create_orders,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::preview_requirements,
        crate::handlers::stock::list_stock,
        crate::handlers::stock::replenish_stock,
        crate::handlers::health::health_check,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::errors::AdmissionErrorBody,
        crate::errors::BackModelDiagnostics,
        crate::errors::RecordSummary,
        crate::models::ComponentType,
        crate::models::OrderStatus,
        crate::models::AuditEntry,
        crate::handlers::orders::AdmissionResponse,
        crate::services::orders::OrderResponse,
        crate::services::stock_ledger::ReplenishStockRequest,
        crate::handlers::health::HealthResponse,
    )),
    tags(
        (name = "orders", description = "Order admission and order store"),
        (name = "stock", description = "Component stock ledger"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDocV1;

/// Serves the OpenAPI document as JSON.
pub fn openapi_routes() -> Router<AppState> {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
