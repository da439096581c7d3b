#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use furnishop_api::{
    config::AppConfig,
    db::{self, DbPool, StoreCapabilities},
    entities::{handler, order, stock_record},
    errors::ServiceError,
    events::{Event, EventHandler, EventSender},
    models::ComponentType,
    services::admission::OrderAdmissionService,
    services::handler_directory::{HandlerDirectory, NoHandlers},
    AppState,
};
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Configuration for an isolated in-memory SQLite database.
///
/// One pooled connection keeps every statement on the same in-memory
/// database; concurrent callers queue on the pool.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "test".to_string(),
    );
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg.db_acquire_timeout_secs = 30;
    cfg
}

/// Fresh migrated database.
pub async fn memory_pool() -> Arc<DbPool> {
    let pool = db::establish_connection_from_app_config(&test_config())
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    Arc::new(pool)
}

pub fn capabilities(transactions: bool) -> StoreCapabilities {
    if transactions {
        StoreCapabilities::transactional()
    } else {
        StoreCapabilities::standalone()
    }
}

pub fn admission_service(
    pool: &Arc<DbPool>,
    transactions: bool,
    handlers: Arc<dyn HandlerDirectory>,
) -> OrderAdmissionService {
    OrderAdmissionService::new(pool.clone(), capabilities(transactions), handlers, None)
}

pub fn unassigned() -> Arc<dyn HandlerDirectory> {
    Arc::new(NoHandlers)
}

/// Inserts a stock record directly.
pub async fn seed_record(
    pool: &DbPool,
    component: ComponentType,
    model: Option<&str>,
    furniture_type: &str,
    quantity: i32,
) -> stock_record::Model {
    stock_record::ActiveModel {
        component_type: Set(component.as_str().to_string()),
        model: Set(model.map(str::to_string)),
        furniture_type: Set(furniture_type.to_string()),
        owning_shop: Set(None),
        quantity: Set(quantity),
        ..Default::default()
    }
    .insert(pool)
    .await
    .expect("seed stock record")
}

/// Seeds one factory-level record per generic chair component.
pub async fn seed_chair_components(pool: &DbPool, quantity: i32) -> BTreeMap<ComponentType, Uuid> {
    let mut ids = BTreeMap::new();
    for component in [
        ComponentType::Back,
        ComponentType::Seat,
        ComponentType::Arm,
        ComponentType::Mechanism,
        ComponentType::GasLift,
        ComponentType::Castor,
        ComponentType::Chrome,
        ComponentType::Headrest,
    ] {
        let record = seed_record(pool, component, None, "chair", quantity).await;
        ids.insert(component, record.id);
    }
    ids
}

pub async fn quantity_of(pool: &DbPool, id: Uuid) -> i32 {
    stock_record::Entity::find_by_id(id)
        .one(pool)
        .await
        .expect("stock lookup")
        .expect("stock record exists")
        .quantity
}

/// Quantity of every record keyed by id.
pub async fn snapshot(pool: &DbPool) -> BTreeMap<Uuid, i32> {
    stock_record::Entity::find()
        .all(pool)
        .await
        .expect("stock snapshot")
        .into_iter()
        .map(|r| (r.id, r.quantity))
        .collect()
}

/// Quantity of every record keyed by what it stocks, comparable across databases.
pub async fn ledger_by_key(pool: &DbPool) -> BTreeMap<(String, Option<String>, String), i32> {
    stock_record::Entity::find()
        .all(pool)
        .await
        .expect("stock snapshot")
        .into_iter()
        .map(|r| ((r.component_type, r.model, r.furniture_type), r.quantity))
        .collect()
}

pub async fn all_orders(pool: &DbPool) -> Vec<order::Model> {
    order::Entity::find()
        .order_by_asc(order::Column::CreatedAt)
        .all(pool)
        .await
        .expect("orders")
}

pub fn factory_handler(name: &str) -> handler::Model {
    handler::Model {
        id: Uuid::new_v4(),
        name: name.to_string(),
        role: "factory".to_string(),
        active: true,
        created_at: Utc::now(),
    }
}

/// Handler directory returning a fixed answer and counting lookups.
pub struct StubDirectory {
    pub handler: Option<handler::Model>,
    pub lookups: AtomicUsize,
    pub roles: Mutex<Vec<String>>,
}

impl StubDirectory {
    pub fn with(handler: Option<handler::Model>) -> Arc<Self> {
        Arc::new(Self {
            handler,
            lookups: AtomicUsize::new(0),
            roles: Mutex::new(Vec::new()),
        })
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HandlerDirectory for StubDirectory {
    async fn find_active(&self, role: &str) -> Result<Option<handler::Model>, ServiceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.roles.lock().unwrap().push(role.to_string());
        Ok(self.handler.clone())
    }
}

/// Handler directory whose backing store is down.
pub struct FailingDirectory;

#[async_trait]
impl HandlerDirectory for FailingDirectory {
    async fn find_active(&self, _role: &str) -> Result<Option<handler::Model>, ServiceError> {
        Err(ServiceError::ServiceUnavailable("directory offline".into()))
    }
}

/// Event channel whose received events can be inspected.
pub struct CapturedEvents {
    pub sender: Arc<EventSender>,
    events: Arc<Mutex<Vec<Event>>>,
    task: tokio::task::JoinHandle<()>,
}

struct Capture(Arc<Mutex<Vec<Event>>>);

#[async_trait]
impl EventHandler for Capture {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

impl CapturedEvents {
    pub fn start() -> Self {
        let (tx, rx) = mpsc::channel(256);
        let events = Arc::new(Mutex::new(Vec::new()));
        let task = tokio::spawn(furnishop_api::events::process_events(
            rx,
            vec![Box::new(Capture(events.clone()))],
        ));
        Self {
            sender: Arc::new(EventSender::new(tx)),
            events,
            task,
        }
    }

    /// Waits until at least `count` events arrived, or two seconds passed.
    pub async fn wait_for(&self, count: usize) -> Vec<Event> {
        for _ in 0..200 {
            if self.events.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        self.events.lock().unwrap().clone()
    }
}

impl Drop for CapturedEvents {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Router over a fresh database plus its state.
pub async fn test_app(transactions: bool, handlers: Arc<dyn HandlerDirectory>) -> (Router, AppState) {
    let pool = memory_pool().await;
    let state = AppState::new(
        pool,
        test_config(),
        capabilities(transactions),
        handlers,
        None,
    );
    (furnishop_api::app_router(state.clone()), state)
}

pub async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    send(router, builder.body(body).unwrap()).await
}

pub async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("router response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, value)
}
