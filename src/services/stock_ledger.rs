//! Stock ledger access.
//!
//! Quantities are only changed through [`try_decrement`] and [`increment`],
//! both single guarded `UPDATE` statements, so concurrent callers can never
//! drive a record below zero or lose an update. The free functions are
//! generic over [`ConnectionTrait`] so the same code runs on a pool
//! connection or inside a transaction.

use chrono::Utc;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::stock_record::{self, Entity as StockRecordEntity, Model as StockRecord};
use crate::errors::ServiceError;
use crate::models::ComponentType;

/// Factory-level records of a component type that carry no model name,
/// best-stocked first.
pub async fn generic_candidates<C: ConnectionTrait>(
    conn: &C,
    component: ComponentType,
) -> Result<Vec<StockRecord>, DbErr> {
    StockRecordEntity::find()
        .filter(stock_record::Column::ComponentType.eq(component.as_str()))
        .filter(stock_record::Column::OwningShop.is_null())
        .filter(stock_record::Column::Model.is_null())
        .order_by_desc(stock_record::Column::Quantity)
        .all(conn)
        .await
}

/// Records of a component type whose model equals `model`, ignoring ASCII
/// case. Only ASCII is folded on the query side; on SQLite, whose `LOWER`
/// is ASCII-only, non-ASCII letters must then match as stored.
pub async fn find_by_model<C: ConnectionTrait>(
    conn: &C,
    component: ComponentType,
    model: &str,
) -> Result<Vec<StockRecord>, DbErr> {
    StockRecordEntity::find()
        .filter(stock_record::Column::ComponentType.eq(component.as_str()))
        .filter(
            Expr::expr(Func::lower(Expr::col(stock_record::Column::Model)))
                .eq(model.trim().to_ascii_lowercase()),
        )
        .order_by_asc(stock_record::Column::CreatedAt)
        .all(conn)
        .await
}

pub async fn find_by_id<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<Option<StockRecord>, DbErr> {
    StockRecordEntity::find_by_id(id).one(conn).await
}

/// Decrements `id` by `amount` only if at least `amount` is available.
/// Returns the updated record, or `None` when the guard rejected the update.
pub async fn try_decrement<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    amount: i32,
) -> Result<Option<StockRecord>, DbErr> {
    if amount <= 0 {
        return find_by_id(conn, id).await;
    }

    let result = StockRecordEntity::update_many()
        .col_expr(
            stock_record::Column::Quantity,
            Expr::col(stock_record::Column::Quantity).sub(amount),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_record::Column::Id.eq(id))
        .filter(stock_record::Column::Quantity.gte(amount))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }
    find_by_id(conn, id).await
}

/// Adds `amount` back to `id`. Returns `None` if the record no longer exists.
pub async fn increment<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    amount: i32,
) -> Result<Option<StockRecord>, DbErr> {
    if amount <= 0 {
        return find_by_id(conn, id).await;
    }

    let result = StockRecordEntity::update_many()
        .col_expr(
            stock_record::Column::Quantity,
            Expr::col(stock_record::Column::Quantity).add(amount),
        )
        .col_expr(stock_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(stock_record::Column::Id.eq(id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Ok(None);
    }
    find_by_id(conn, id).await
}

/// Replenishment request for one ledger key.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplenishStockRequest {
    pub component_type: ComponentType,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub furniture_type: Option<String>,
    #[serde(default)]
    pub shop: Option<String>,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
}

/// Filters for listing the ledger.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockFilter {
    pub component_type: Option<ComponentType>,
    pub model: Option<String>,
    pub shop: Option<String>,
}

/// Administrative access to the stock ledger.
#[derive(Clone)]
pub struct StockLedgerService {
    db_pool: Arc<DbPool>,
}

impl StockLedgerService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Adds stock to the record identified by the request's key, creating the
    /// record on first replenishment.
    #[instrument(skip(self), fields(component = %request.component_type))]
    pub async fn replenish(&self, request: ReplenishStockRequest) -> Result<StockRecord, ServiceError> {
        request.validate()?;
        let db = &*self.db_pool;

        let model = request
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());
        let furniture_type = request
            .furniture_type
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(crate::models::order_request::DEFAULT_FURNITURE_TYPE);
        let shop = request.shop.as_deref().map(str::trim).filter(|s| !s.is_empty());

        let mut condition = Condition::all()
            .add(stock_record::Column::ComponentType.eq(request.component_type.as_str()))
            .add(stock_record::Column::FurnitureType.eq(furniture_type));
        condition = match model {
            Some(m) => condition.add(stock_record::Column::Model.eq(m)),
            None => condition.add(stock_record::Column::Model.is_null()),
        };
        condition = match shop {
            Some(s) => condition.add(stock_record::Column::OwningShop.eq(s)),
            None => condition.add(stock_record::Column::OwningShop.is_null()),
        };

        let existing = StockRecordEntity::find().filter(condition).one(db).await?;

        let record = match existing {
            Some(record) => increment(db, record.id, request.quantity)
                .await?
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("stock record {} vanished", record.id))
                })?,
            None => {
                stock_record::ActiveModel {
                    component_type: Set(request.component_type.as_str().to_string()),
                    model: Set(model.map(str::to_string)),
                    furniture_type: Set(furniture_type.to_string()),
                    owning_shop: Set(shop.map(str::to_string)),
                    quantity: Set(request.quantity),
                    ..Default::default()
                }
                .insert(db)
                .await?
            }
        };

        info!(
            record_id = %record.id,
            added = request.quantity,
            quantity = record.quantity,
            "Stock replenished"
        );
        Ok(record)
    }

    pub async fn list(&self, filter: StockFilter) -> Result<Vec<StockRecord>, ServiceError> {
        let db = &*self.db_pool;
        let mut query = StockRecordEntity::find();

        if let Some(component) = filter.component_type {
            query = query.filter(stock_record::Column::ComponentType.eq(component.as_str()));
        }
        if let Some(model) = filter.model.as_deref().filter(|m| !m.trim().is_empty()) {
            query = query.filter(
                Expr::expr(Func::lower(Expr::col(stock_record::Column::Model)))
                    .eq(model.trim().to_ascii_lowercase()),
            );
        }
        if let Some(shop) = filter.shop.as_deref() {
            query = query.filter(stock_record::Column::OwningShop.eq(shop));
        }

        Ok(query
            .order_by_asc(stock_record::Column::ComponentType)
            .order_by_asc(stock_record::Column::CreatedAt)
            .all(db)
            .await?)
    }

    pub async fn get(&self, id: Uuid) -> Result<StockRecord, ServiceError> {
        find_by_id(&*self.db_pool, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("stock record {} not found", id)))
    }
}
