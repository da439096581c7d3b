use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AuditEntry, OrderRequest, OrderStatus};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_number: String,
    pub shop: Option<String>,
    pub shopkeeper: Option<String>,
    pub furniture_type: String,
    pub back_model: Option<String>,
    pub quantity: i32,
    pub headrest: bool,
    pub status: String,
    pub assigned_factory: Option<String>,
    /// Append-only list of `AuditEntry`, written by downstream workflow steps
    pub audit: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, _insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        active_model.updated_at = Set(Utc::now());
        Ok(active_model)
    }
}

impl Model {
    pub fn status(&self) -> Option<OrderStatus> {
        self.status.parse().ok()
    }

    /// Decodes the audit trail; entries that do not parse are skipped.
    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        match &self.audit {
            Json::Array(values) => values
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuilds the request this order was admitted from, so its component
    /// requirements can be recomputed at audit time.
    pub fn as_request(&self) -> OrderRequest {
        OrderRequest {
            shop: self.shop.clone(),
            shopkeeper: self.shopkeeper.clone(),
            furniture_type: self.furniture_type.clone(),
            back_model: self.back_model.clone(),
            quantity: self.quantity,
            headrest: self.headrest,
            assigned_factory: self.assigned_factory.clone(),
            order_number: Some(self.order_number.clone()),
        }
    }
}
