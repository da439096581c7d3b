//! Order admission.
//!
//! Normalizes a payload into validated orders, reserves stock for each one
//! and persists the admitted orders. With store transactions the whole batch
//! runs in one transaction and any failure leaves the ledger untouched.
//! Without them each order is reserved with guarded updates and compensated
//! on failure; orders admitted earlier in the batch stay admitted.

use chrono::Utc;
use metrics::counter;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, Set, SqlErr, TransactionTrait};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Instrument};
use uuid::Uuid;

use crate::db::{DbPool, StoreCapabilities};
use crate::entities::{handler, order};
use crate::errors::{AdmissionFailure, ServiceError};
use crate::events::{Event, EventSender};
use crate::models::{AdmissionPayload, OrderRequest, OrderStatus};
use crate::services::handler_directory::HandlerDirectory;
use crate::services::reservation::{ReservationEngine, StockReservation};

const DEFAULT_FACTORY_ROLE: &str = "factory";
const DEFAULT_MAX_BATCH_SIZE: usize = 100;

const ORDER_NUMBER_SUFFIX_LEN: usize = 12;

/// Generates an order number from the creation time, the position in the
/// batch and a random suffix taken from a v4 UUID.
pub fn generate_order_number(index: usize) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "ORD-{}-{:03}-{}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        index,
        &random[..ORDER_NUMBER_SUFFIX_LEN]
    )
}

#[derive(Clone)]
pub struct OrderAdmissionService {
    db_pool: Arc<DbPool>,
    capabilities: StoreCapabilities,
    engine: ReservationEngine,
    handlers: Arc<dyn HandlerDirectory>,
    factory_role: String,
    max_batch_size: usize,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderAdmissionService {
    pub fn new(
        db_pool: Arc<DbPool>,
        capabilities: StoreCapabilities,
        handlers: Arc<dyn HandlerDirectory>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db_pool,
            capabilities,
            engine: ReservationEngine::new(event_sender.clone()),
            handlers,
            factory_role: DEFAULT_FACTORY_ROLE.to_string(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            event_sender,
        }
    }

    pub fn with_factory_role(mut self, role: impl Into<String>) -> Self {
        self.factory_role = role.into();
        self
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    pub fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }

    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Admits every order in `payload` or reports the first one that failed.
    ///
    /// The work runs on its own task. Dropping the returned future (client
    /// disconnect, request timeout) does not stop a reservation halfway: the
    /// task still commits or compensates before it ends.
    #[instrument(skip(self, payload), fields(strategy = self.capabilities.strategy_name()))]
    pub async fn admit(&self, payload: AdmissionPayload) -> Result<Vec<order::Model>, ServiceError> {
        let service = self.clone();
        let task = tokio::spawn(
            async move { service.run_admission(payload).await }.in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Admission task did not complete");
                counter!("furnishop_admissions.rejected", 1, "code" => "server_error");
                Err(ServiceError::InternalError(format!("admission task failed: {}", e)))
            }
        }
    }

    async fn run_admission(&self, payload: AdmissionPayload) -> Result<Vec<order::Model>, ServiceError> {
        let result = match payload.into_requests(self.max_batch_size) {
            Ok(requests) => {
                let handler = self.find_handler().await;
                if self.capabilities.transactions {
                    self.admit_transactional(&requests, handler.as_ref()).await
                } else {
                    self.admit_compensating(&requests, handler.as_ref()).await
                }
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(orders) => {
                counter!("furnishop_admissions.accepted", orders.len() as u64);
                info!(count = orders.len(), "Orders admitted");
                for admitted in orders {
                    self.emit(Event::OrderAdmitted {
                        order_id: admitted.id,
                        order_number: admitted.order_number.clone(),
                        shop: admitted.shop.clone(),
                        status: admitted.status.clone(),
                    })
                    .await;
                }
            }
            Err(e) => {
                let code = e
                    .as_rejection()
                    .map(|r| r.failure.code())
                    .unwrap_or_else(|| "server_error".to_string());
                counter!("furnishop_admissions.rejected", 1, "code" => code.clone());
                match e.as_rejection() {
                    Some(_) => warn!(code = %code, error = %e, "Admission rejected"),
                    None => error!(error = %e, "Admission failed"),
                }
            }
        }

        result
    }

    /// Best-effort lookup of a handler to pre-assign; failures only log.
    async fn find_handler(&self) -> Option<handler::Model> {
        match self.handlers.find_active(&self.factory_role).await {
            Ok(found) => found,
            Err(e) => {
                warn!(role = %self.factory_role, error = %e, "Handler lookup failed; orders stay unassigned");
                None
            }
        }
    }

    async fn admit_transactional(
        &self,
        requests: &[OrderRequest],
        handler: Option<&handler::Model>,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let txn = self.db_pool.begin().await?;

        let mut orders = Vec::with_capacity(requests.len());
        let mut reservations = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let mut reservation = StockReservation::new();
            let outcome = match self.engine.reserve(&txn, request, &mut reservation).await {
                Ok(()) => insert_order(&txn, request, index, handler).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(created) => {
                    orders.push(created);
                    reservations.push(reservation);
                }
                Err(e) => {
                    if let Err(rollback_err) = txn.rollback().await {
                        error!(error = %rollback_err, "Failed to roll back admission transaction");
                    }
                    return Err(e.at_order(index));
                }
            }
        }

        txn.commit().await?;

        for reservation in &reservations {
            self.emit_reserved(reservation).await;
        }
        Ok(orders)
    }

    async fn admit_compensating(
        &self,
        requests: &[OrderRequest],
        handler: Option<&handler::Model>,
    ) -> Result<Vec<order::Model>, ServiceError> {
        let db = &*self.db_pool;

        let mut orders: Vec<order::Model> = Vec::with_capacity(requests.len());
        for (index, request) in requests.iter().enumerate() {
            let mut reservation = StockReservation::new();
            let outcome = match self.engine.reserve(db, request, &mut reservation).await {
                Ok(()) => insert_order(db, request, index, handler).await,
                Err(e) => Err(e),
            };

            match outcome {
                Ok(created) => {
                    self.emit_reserved(&reservation).await;
                    orders.push(created);
                }
                Err(e) => {
                    let report = reservation
                        .rollback(db, self.engine.event_sender())
                        .await;
                    if !report.is_clean() {
                        error!(
                            target: "furnishop_api::reconciliation",
                            order_index = index,
                            restored = report.restored,
                            failed = report.failed.len(),
                            "Order reservation only partially compensated"
                        );
                    }

                    let committed: Vec<String> =
                        orders.iter().map(|o| o.order_number.clone()).collect();
                    if !committed.is_empty() {
                        warn!(order_index = index, committed = ?committed, "Batch stopped after partial admission");
                    }
                    return Err(match e.at_order(index) {
                        ServiceError::AdmissionRejected(rejection) => {
                            ServiceError::AdmissionRejected(rejection.with_committed(committed))
                        }
                        other => other,
                    });
                }
            }
        }

        Ok(orders)
    }

    async fn emit_reserved(&self, reservation: &StockReservation) {
        for entry in reservation.entries() {
            self.emit(Event::StockReserved {
                record_id: entry.record_id,
                component: entry.component,
                quantity: entry.amount,
            })
            .await;
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }
}

/// Persists one admitted order with an empty audit trail.
async fn insert_order<C: ConnectionTrait>(
    conn: &C,
    request: &OrderRequest,
    index: usize,
    handler: Option<&handler::Model>,
) -> Result<order::Model, ServiceError> {
    let assigned_factory = request
        .assigned_factory
        .clone()
        .or_else(|| handler.map(|h| h.id.to_string()));
    let status = if assigned_factory.is_some() {
        OrderStatus::Assigned
    } else {
        OrderStatus::Requested
    };
    let order_number = request
        .order_number
        .clone()
        .unwrap_or_else(|| generate_order_number(index));
    let now = Utc::now();

    let created = order::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_number: Set(order_number.clone()),
        shop: Set(request.shop.clone()),
        shopkeeper: Set(request.shopkeeper.clone()),
        furniture_type: Set(request.furniture_type.clone()),
        back_model: Set(request.back_model.clone()),
        quantity: Set(request.quantity),
        headrest: Set(request.headrest),
        status: Set(status.as_str().to_string()),
        assigned_factory: Set(assigned_factory),
        audit: Set(json!([])),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(conn)
    .await
    .map_err(|e| duplicate_number_as_invalid(e, &order_number))?;

    info!(
        order_index = index,
        order_number = %created.order_number,
        status = %created.status,
        "Order persisted"
    );
    Ok(created)
}

/// An order number already taken is the caller's mistake, not a store fault.
fn duplicate_number_as_invalid(err: DbErr, order_number: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            AdmissionFailure::invalid(format!("order number {} already exists", order_number)).into()
        }
        _ => err.into(),
    }
}
