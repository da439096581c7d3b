use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::ComponentType;

/// Simplified error structure for OpenAPI documentation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Not Found",
    "message": "Not found: order ORD-20240101120000000-001-4f1c2a9be07d not found",
    "details": null,
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Body returned by the order-creation endpoint when admission fails.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": false,
    "message": "insufficient_castor",
    "details": {"orderIndex": 0, "component": "castor", "needed": 10, "available": 4}
}))]
pub struct AdmissionErrorBody {
    pub success: bool,
    /// Failure code: `invalid_order`, `insufficient_<component>`,
    /// `insufficient_back_model` or `server_error`
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub details: Option<Value>,
}

/// Summary of one stock record, used in back-model diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub id: Uuid,
    pub quantity: i32,
    pub furniture_type: String,
    pub model: Option<String>,
}

/// Everything the matcher saw while looking for a back model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BackModelDiagnostics {
    pub model: String,
    pub furniture_type: String,
    pub required: i32,
    /// Records matching the model name and the order's furniture type
    pub typed_matches: Vec<RecordSummary>,
    /// Records matching the model name regardless of furniture type
    pub all_matches: Vec<RecordSummary>,
}

/// Business-rule reasons an order cannot be admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionFailure {
    InvalidOrder {
        reason: String,
    },
    InsufficientComponent {
        component: ComponentType,
        needed: i32,
        available: Option<i32>,
    },
    InsufficientBackModel(Box<BackModelDiagnostics>),
}

impl AdmissionFailure {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOrder {
            reason: reason.into(),
        }
    }

    /// Machine-readable failure code surfaced to callers.
    pub fn code(&self) -> String {
        match self {
            Self::InvalidOrder { .. } => "invalid_order".to_string(),
            Self::InsufficientComponent { component, .. } => {
                format!("insufficient_{}", component.as_str())
            }
            Self::InsufficientBackModel(_) => "insufficient_back_model".to_string(),
        }
    }

    pub fn details(&self) -> Value {
        match self {
            Self::InvalidOrder { reason } => json!({ "reason": reason }),
            Self::InsufficientComponent {
                component,
                needed,
                available,
            } => json!({
                "component": component.as_str(),
                "needed": needed,
                "available": available,
            }),
            Self::InsufficientBackModel(diagnostics) => {
                serde_json::to_value(diagnostics.as_ref()).unwrap_or(Value::Null)
            }
        }
    }
}

impl std::fmt::Display for AdmissionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidOrder { reason } => write!(f, "invalid_order: {}", reason),
            Self::InsufficientComponent {
                component,
                needed,
                available,
            } => write!(
                f,
                "insufficient_{}: needed {}, available {}",
                component.as_str(),
                needed,
                available.map_or_else(|| "none".to_string(), |a| a.to_string())
            ),
            Self::InsufficientBackModel(d) => write!(
                f,
                "insufficient_back_model: '{}' x{} for {}",
                d.model, d.required, d.furniture_type
            ),
        }
    }
}

/// An admission failure pinned to the order in the batch that caused it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRejection {
    pub order_index: Option<usize>,
    pub failure: AdmissionFailure,
    /// Orders of the same batch that were already persisted before the
    /// failing one (only possible without store transactions).
    pub committed: Vec<String>,
}

impl AdmissionRejection {
    pub fn new(failure: AdmissionFailure) -> Self {
        Self {
            order_index: None,
            failure,
            committed: Vec::new(),
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.order_index = Some(index);
        self
    }

    pub fn with_committed(mut self, committed: Vec<String>) -> Self {
        self.committed = committed;
        self
    }

    pub fn details(&self) -> Value {
        let mut details = self.failure.details();
        if let Value::Object(map) = &mut details {
            if let Some(index) = self.order_index {
                map.insert("orderIndex".to_string(), json!(index));
            }
            if !self.committed.is_empty() {
                map.insert("committedOrders".to_string(), json!(self.committed));
            }
        }
        details
    }
}

impl std::fmt::Display for AdmissionRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.order_index {
            Some(index) => write!(f, "order #{}: {}", index, self.failure),
            None => write!(f, "{}", self.failure),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Admission rejected: {0}")]
    AdmissionRejected(AdmissionRejection),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<AdmissionFailure> for ServiceError {
    fn from(failure: AdmissionFailure) -> Self {
        ServiceError::AdmissionRejected(AdmissionRejection::new(failure))
    }
}

impl ServiceError {
    /// Convenience constructor for wrapping string-based database errors.
    pub fn database_error_message(message: impl Into<String>) -> Self {
        ServiceError::DatabaseError(DbErr::Custom(message.into()))
    }

    /// Returns the admission rejection carried by this error, if any.
    pub fn as_rejection(&self) -> Option<&AdmissionRejection> {
        match self {
            Self::AdmissionRejected(rejection) => Some(rejection),
            _ => None,
        }
    }

    /// Pins an admission failure to a batch position. Other errors pass through.
    pub fn at_order(self, index: usize) -> Self {
        match self {
            Self::AdmissionRejected(rejection) if rejection.order_index.is_none() => {
                Self::AdmissionRejected(rejection.at(index))
            }
            other => other,
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AdmissionRejected(rejection) => match rejection.failure {
                AdmissionFailure::InvalidOrder { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::CONFLICT,
            },
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::AdmissionRejected(rejection) => rejection.failure.code(),
            _ => self.to_string(),
        }
    }

    /// Renders the `{success, message, details}` body used by order admission.
    pub fn into_admission_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            Self::AdmissionRejected(rejection) => AdmissionErrorBody {
                success: false,
                message: rejection.failure.code(),
                details: Some(rejection.details()),
            },
            Self::ValidationError(msg) | Self::InvalidInput(msg) => AdmissionErrorBody {
                success: false,
                message: "invalid_order".to_string(),
                details: Some(json!({ "reason": msg })),
            },
            _ => AdmissionErrorBody {
                success: false,
                message: "server_error".to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let details = self
            .as_rejection()
            .map(|rejection| rejection.details().to_string());
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
