//! Furnishop API Library
//!
//! Order admission and component stock reservation for the furniture back
//! office: requirement calculation, back-model matching, reservation under
//! transactional or compensating strategies, and the order store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod models;
pub mod openapi;
pub mod services;

use axum::{
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::db::{DbPool, StoreCapabilities};
use crate::events::EventSender;
use crate::services::admission::OrderAdmissionService;
use crate::services::handler_directory::HandlerDirectory;
use crate::services::orders::OrderService;
use crate::services::stock_ledger::StockLedgerService;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub capabilities: StoreCapabilities,
    pub event_sender: Option<Arc<EventSender>>,
    pub admission: Arc<OrderAdmissionService>,
    pub orders: Arc<OrderService>,
    pub stock: Arc<StockLedgerService>,
}

impl AppState {
    /// Wires the services over one pool. `capabilities` must already be
    /// resolved; it fixes the reservation strategy for the process lifetime.
    pub fn new(
        db: Arc<DbPool>,
        config: config::AppConfig,
        capabilities: StoreCapabilities,
        handlers: Arc<dyn HandlerDirectory>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let admission = OrderAdmissionService::new(
            db.clone(),
            capabilities,
            handlers,
            event_sender.clone(),
        )
        .with_factory_role(config.factory_role.clone())
        .with_max_batch_size(config.max_batch_size);

        Self {
            orders: Arc::new(OrderService::new(db.clone(), config.max_batch_size)),
            stock: Arc::new(StockLedgerService::new(db.clone())),
            admission: Arc::new(admission),
            db,
            config,
            capabilities,
            event_sender,
        }
    }
}

// Common query parameters
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/orders",
            get(handlers::orders::list_orders).post(handlers::orders::create_orders),
        )
        .route(
            "/orders/requirements",
            post(handlers::orders::preview_requirements),
        )
        .route("/orders/:order_number", get(handlers::orders::get_order))
        .route("/stock", get(handlers::stock::list_stock))
        .route("/stock/replenish", post(handlers::stock::replenish_stock))
}

/// Full application router without transport middleware.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "furnishop-api up" }))
        .nest("/api/v1", api_v1_routes())
        .nest("/health", handlers::health::health_routes())
        .merge(openapi::openapi_routes())
        .with_state(state)
}
