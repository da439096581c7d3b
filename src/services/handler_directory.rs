use async_trait::async_trait;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;

use crate::db::DbPool;
use crate::entities::handler::{self, Entity as HandlerEntity};
use crate::errors::ServiceError;

/// Directory of actors that can take ownership of newly admitted orders.
#[async_trait]
pub trait HandlerDirectory: Send + Sync {
    /// Returns one active handler with the given role, if any exists.
    async fn find_active(&self, role: &str) -> Result<Option<handler::Model>, ServiceError>;
}

/// Handler directory backed by the `handlers` table.
#[derive(Clone)]
pub struct SeaOrmHandlerDirectory {
    db_pool: Arc<DbPool>,
}

impl SeaOrmHandlerDirectory {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl HandlerDirectory for SeaOrmHandlerDirectory {
    async fn find_active(&self, role: &str) -> Result<Option<handler::Model>, ServiceError> {
        Ok(HandlerEntity::find()
            .filter(handler::Column::Role.eq(role))
            .filter(handler::Column::Active.eq(true))
            .order_by_asc(handler::Column::CreatedAt)
            .one(&*self.db_pool)
            .await?)
    }
}

/// Directory that never has anyone on duty.
pub struct NoHandlers;

#[async_trait]
impl HandlerDirectory for NoHandlers {
    async fn find_active(&self, _role: &str) -> Result<Option<handler::Model>, ServiceError> {
        Ok(None)
    }
}
