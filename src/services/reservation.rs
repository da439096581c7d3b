//! Reservation engine.
//!
//! Reserves every input one order consumes: the generic components from the
//! requirement calculator plus the matched back model. All decrements go
//! through the guarded update in [`stock_ledger::try_decrement`], so the
//! engine behaves the same on a transaction (where an abort undoes
//! everything) and on a bare pool connection (where [`StockReservation`]
//! holds what must be given back).

use metrics::counter;
use sea_orm::ConnectionTrait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::entities::stock_record::Model as StockRecord;
use crate::errors::{AdmissionFailure, ServiceError};
use crate::events::{Event, EventSender};
use crate::models::{ComponentType, OrderRequest};
use crate::services::back_model::BackModelLookup;
use crate::services::requirements::{back_model_component, generic_requirements};
use crate::services::stock_ledger;

/// Where an order is in its reservation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationPhase {
    Validating,
    CheckingComponents,
    ReservingBackModel,
    ReservingComponents,
    Committed,
}

/// One successful decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservedStock {
    pub record_id: Uuid,
    pub component: ComponentType,
    pub amount: i32,
}

/// Outcome of giving a reservation back.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    pub restored: usize,
    /// Entries that could not be restored, with the reason
    pub failed: Vec<(ReservedStock, String)>,
}

impl RollbackReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Compensation log for one order: every decrement made so far, in order.
#[derive(Debug, Clone)]
pub struct StockReservation {
    phase: ReservationPhase,
    entries: Vec<ReservedStock>,
}

impl Default for StockReservation {
    fn default() -> Self {
        Self::new()
    }
}

impl StockReservation {
    pub fn new() -> Self {
        Self {
            phase: ReservationPhase::Validating,
            entries: Vec::new(),
        }
    }

    pub fn phase(&self) -> ReservationPhase {
        self.phase
    }

    fn enter(&mut self, phase: ReservationPhase) {
        debug!(from = ?self.phase, to = ?phase, "Reservation phase");
        self.phase = phase;
    }

    pub fn record(&mut self, record_id: Uuid, component: ComponentType, amount: i32) {
        self.entries.push(ReservedStock {
            record_id,
            component,
            amount,
        });
    }

    pub fn entries(&self) -> &[ReservedStock] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Gives every recorded decrement back with a compensating increment,
    /// newest first. Failures never abort the rollback: each one is logged
    /// for reconciliation and the remaining entries are still attempted.
    pub async fn rollback<C: ConnectionTrait>(
        self,
        conn: &C,
        events: Option<&EventSender>,
    ) -> RollbackReport {
        let mut report = RollbackReport::default();

        for entry in self.entries.into_iter().rev() {
            let outcome = match stock_ledger::increment(conn, entry.record_id, entry.amount).await {
                Ok(Some(_)) => Ok(()),
                Ok(None) => Err("stock record no longer exists".to_string()),
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(()) => {
                    report.restored += 1;
                    counter!("furnishop_reservations.compensations", 1);
                    info!(
                        record_id = %entry.record_id,
                        component = %entry.component,
                        amount = entry.amount,
                        "Compensated stock reservation"
                    );
                    if let Some(events) = events {
                        events
                            .send_or_log(Event::StockCompensated {
                                record_id: entry.record_id,
                                quantity: entry.amount,
                            })
                            .await;
                    }
                }
                Err(reason) => {
                    counter!("furnishop_reservations.compensation_failures", 1);
                    error!(
                        target: "furnishop_api::reconciliation",
                        record_id = %entry.record_id,
                        component = %entry.component,
                        amount = entry.amount,
                        reason = %reason,
                        "Compensating increment failed"
                    );
                    if let Some(events) = events {
                        events
                            .send_or_log(Event::CompensationFailed {
                                record_id: entry.record_id,
                                quantity: entry.amount,
                                reason: reason.clone(),
                            })
                            .await;
                    }
                    report.failed.push((entry, reason));
                }
            }
        }

        report
    }
}

/// Reserves the stock one order needs.
#[derive(Clone, Default)]
pub struct ReservationEngine {
    event_sender: Option<Arc<EventSender>>,
}

impl ReservationEngine {
    pub fn new(event_sender: Option<Arc<EventSender>>) -> Self {
        Self { event_sender }
    }

    pub fn event_sender(&self) -> Option<&EventSender> {
        self.event_sender.as_deref()
    }

    /// Reserves every input of `order` on `conn`, recording each decrement in
    /// `reservation`.
    ///
    /// On error some decrements may already be recorded; the caller undoes
    /// them by rolling back its transaction or calling
    /// [`StockReservation::rollback`].
    #[instrument(skip(self, conn, order, reservation), fields(furniture_type = %order.furniture_type, quantity = order.quantity))]
    pub async fn reserve<C: ConnectionTrait>(
        &self,
        conn: &C,
        order: &OrderRequest,
        reservation: &mut StockReservation,
    ) -> Result<(), ServiceError> {
        reservation.enter(ReservationPhase::Validating);
        if order.quantity <= 0 {
            return Err(AdmissionFailure::invalid("quantity must be a positive integer").into());
        }

        reservation.enter(ReservationPhase::CheckingComponents);
        let requirements = generic_requirements(order)?;
        let mut candidates: BTreeMap<ComponentType, Vec<StockRecord>> = BTreeMap::new();
        for (&component, &needed) in &requirements {
            let records = stock_ledger::generic_candidates(conn, component).await?;
            let available = records.first().map(|r| r.quantity);
            if available.map_or(true, |a| a < needed) {
                return Err(insufficient(component, needed, available));
            }
            candidates.insert(component, records);
        }

        if let Some(model) = order.back_model.as_deref() {
            reservation.enter(ReservationPhase::ReservingBackModel);
            self.reserve_back_model(conn, model, order, reservation)
                .await?;
        }

        reservation.enter(ReservationPhase::ReservingComponents);
        for (&component, &needed) in &requirements {
            let records = candidates.remove(&component).unwrap_or_default();
            let mut reserved = false;
            for record in records.iter().filter(|r| r.quantity >= needed) {
                if stock_ledger::try_decrement(conn, record.id, needed)
                    .await?
                    .is_some()
                {
                    reservation.record(record.id, component, needed);
                    reserved = true;
                    break;
                }
            }
            if !reserved {
                // Another admission took the stock between check and reserve.
                let available = stock_ledger::generic_candidates(conn, component)
                    .await?
                    .first()
                    .map(|r| r.quantity);
                return Err(insufficient(component, needed, available));
            }
        }

        reservation.enter(ReservationPhase::Committed);
        Ok(())
    }

    async fn reserve_back_model<C: ConnectionTrait>(
        &self,
        conn: &C,
        model: &str,
        order: &OrderRequest,
        reservation: &mut StockReservation,
    ) -> Result<(), ServiceError> {
        let lookup = BackModelLookup::load(conn, model, &order.furniture_type).await?;
        let component = back_model_component(&order.furniture_type);

        for record in lookup.ranked(order.quantity) {
            if stock_ledger::try_decrement(conn, record.id, order.quantity)
                .await?
                .is_some()
            {
                reservation.record(record.id, component, order.quantity);
                return Ok(());
            }
            debug!(record_id = %record.id, "Back model candidate taken concurrently");
        }

        // Re-read so the diagnostics show the quantities that defeated us.
        let current = BackModelLookup::load(conn, model, &order.furniture_type).await?;
        warn!(model, required = order.quantity, "No back model record can cover the order");
        Err(current.failure(order.quantity).into())
    }
}

fn insufficient(component: ComponentType, needed: i32, available: Option<i32>) -> ServiceError {
    counter!("furnishop_reservations.insufficient", 1, "component" => component.as_str());
    AdmissionFailure::InsufficientComponent {
        component,
        needed,
        available,
    }
    .into()
}
