//! Back-model matcher.
//!
//! Resolves a free-text model name to a finished-part stock record. Matching
//! on the name is exact but case-insensitive; among the matches, a record
//! tagged with the order's furniture type wins over one with more stock.

use sea_orm::{ConnectionTrait, DbErr};
use tracing::debug;

use crate::entities::stock_record::Model as StockRecord;
use crate::errors::{AdmissionFailure, BackModelDiagnostics, ServiceError};
use crate::models::is_chair;
use crate::services::requirements::back_model_component;
use crate::services::stock_ledger;

fn same_furniture_type(a: &str, b: &str) -> bool {
    (is_chair(a) && is_chair(b)) || a.trim().eq_ignore_ascii_case(b.trim())
}

/// Every record matching a model name, as read from the ledger.
#[derive(Debug, Clone)]
pub struct BackModelLookup {
    pub model: String,
    pub furniture_type: String,
    pub records: Vec<StockRecord>,
}

impl BackModelLookup {
    /// Reads the records matching `model` among backs (chairs) or finished
    /// products (other furniture).
    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        model: &str,
        furniture_type: &str,
    ) -> Result<Self, DbErr> {
        let component = back_model_component(furniture_type);
        let records = stock_ledger::find_by_model(conn, component, model).await?;
        debug!(
            model,
            furniture_type,
            component = %component,
            matches = records.len(),
            "Back model lookup"
        );
        Ok(Self {
            model: model.trim().to_string(),
            furniture_type: furniture_type.to_string(),
            records,
        })
    }

    /// Candidates able to cover `required`, best first: furniture-type
    /// matches, then any other match. Ties keep ledger order.
    pub fn ranked(&self, required: i32) -> Vec<&StockRecord> {
        let (typed, other): (Vec<&StockRecord>, Vec<&StockRecord>) = self
            .records
            .iter()
            .filter(|r| r.quantity >= required)
            .partition(|r| same_furniture_type(&r.furniture_type, &self.furniture_type));
        typed.into_iter().chain(other).collect()
    }

    /// The preferred record for `required` units, or the reason there is none.
    pub fn resolve(&self, required: i32) -> Result<&StockRecord, AdmissionFailure> {
        self.ranked(required)
            .into_iter()
            .next()
            .ok_or_else(|| self.failure(required))
    }

    pub fn diagnostics(&self, required: i32) -> BackModelDiagnostics {
        BackModelDiagnostics {
            model: self.model.clone(),
            furniture_type: self.furniture_type.clone(),
            required,
            typed_matches: self
                .records
                .iter()
                .filter(|r| same_furniture_type(&r.furniture_type, &self.furniture_type))
                .map(StockRecord::summary)
                .collect(),
            all_matches: self.records.iter().map(StockRecord::summary).collect(),
        }
    }

    pub fn failure(&self, required: i32) -> AdmissionFailure {
        AdmissionFailure::InsufficientBackModel(Box::new(self.diagnostics(required)))
    }
}

/// Resolves `model` to a single stock record with at least `required` units.
pub async fn resolve_back_model<C: ConnectionTrait>(
    conn: &C,
    model: &str,
    furniture_type: &str,
    required: i32,
) -> Result<StockRecord, ServiceError> {
    let lookup = BackModelLookup::load(conn, model, furniture_type).await?;
    let record = lookup.resolve(required)?;
    Ok(record.clone())
}
