use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as OrderEntity, Model as OrderModel};
use crate::errors::ServiceError;
use crate::models::{AdmissionPayload, AuditEntry, OrderStatus};
use crate::services::requirements::{compute_requirements, Requirements};

/// An admitted order as returned over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub shop: Option<String>,
    pub shopkeeper: Option<String>,
    pub furniture_type: String,
    pub back_model: Option<String>,
    pub quantity: i32,
    pub headrest: bool,
    pub status: String,
    pub assigned_factory: Option<String>,
    pub audit: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderModel> for OrderResponse {
    fn from(model: OrderModel) -> Self {
        let audit = model.audit_entries();
        Self {
            id: model.id,
            order_number: model.order_number,
            shop: model.shop,
            shopkeeper: model.shopkeeper,
            furniture_type: model.furniture_type,
            back_model: model.back_model,
            quantity: model.quantity,
            headrest: model.headrest,
            status: model.status,
            assigned_factory: model.assigned_factory,
            audit,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// An order with the component requirements recomputed from its own fields.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: OrderResponse,
    #[schema(value_type = Object)]
    pub requirements: Requirements,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Requirements preview for one order of a payload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsPreview {
    pub furniture_type: String,
    pub quantity: i32,
    pub back_model: Option<String>,
    #[schema(value_type = Object)]
    pub requirements: Requirements,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub shop: Option<String>,
}

/// Read side of the order store.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    max_batch_size: usize,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>, max_batch_size: usize) -> Self {
        Self {
            db_pool,
            max_batch_size,
        }
    }

    /// Retrieves an order by its order number
    #[instrument(skip(self))]
    pub async fn get_by_number(&self, order_number: &str) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db_pool;
        let found = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(db)
            .await
            .map_err(|e| {
                error!(error = %e, order_number, "Failed to fetch order");
                ServiceError::DatabaseError(e)
            })?;

        let model = found
            .ok_or_else(|| ServiceError::NotFound(format!("order {} not found", order_number)))?;
        let requirements = compute_requirements(&model.as_request())?;

        Ok(OrderDetail {
            order: model.into(),
            requirements,
        })
    }

    /// Lists orders with pagination, newest first
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        page: u64,
        per_page: u64,
        filter: OrderFilter,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db_pool;
        let page = page.max(1);
        let per_page = per_page.clamp(1, 100);

        let mut query = OrderEntity::find();
        if let Some(status) = filter.status {
            query = query.filter(order::Column::Status.eq(status.as_str()));
        }
        if let Some(shop) = filter.shop.as_deref() {
            query = query.filter(order::Column::Shop.eq(shop));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator.num_items().await.map_err(|e| {
            error!(error = %e, "Failed to count orders");
            ServiceError::DatabaseError(e)
        })?;

        let orders = paginator.fetch_page(page - 1).await.map_err(|e| {
            error!(error = %e, page, per_page, "Failed to fetch orders page");
            ServiceError::DatabaseError(e)
        })?;

        info!(total, page, per_page, returned_count = orders.len(), "Orders listed");

        Ok(OrderListResponse {
            orders: orders.into_iter().map(OrderResponse::from).collect(),
            total,
            page,
            per_page,
        })
    }

    /// Computes what a payload would reserve without touching stock.
    pub fn preview(&self, payload: AdmissionPayload) -> Result<Vec<RequirementsPreview>, ServiceError> {
        let requests = payload.into_requests(self.max_batch_size)?;
        requests
            .into_iter()
            .enumerate()
            .map(|(index, request)| {
                let requirements =
                    compute_requirements(&request).map_err(|f| ServiceError::from(f).at_order(index))?;
                Ok(RequirementsPreview {
                    requirements,
                    furniture_type: request.furniture_type,
                    quantity: request.quantity,
                    back_model: request.back_model,
                })
            })
            .collect()
    }
}
