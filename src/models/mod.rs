//! Domain types shared by the entities, services and handlers.

pub mod order_request;

pub use order_request::{AdmissionPayload, OrderRequest, OrderRequestInput, ShopEnvelope};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kind of physical input tracked by the stock ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ComponentType {
    Back,
    Seat,
    Arm,
    Mechanism,
    GasLift,
    Castor,
    Chrome,
    Headrest,
    /// A finished item rather than a sub-part
    Product,
}

impl ComponentType {
    pub const ALL: [ComponentType; 9] = [
        ComponentType::Back,
        ComponentType::Seat,
        ComponentType::Arm,
        ComponentType::Mechanism,
        ComponentType::GasLift,
        ComponentType::Castor,
        ComponentType::Chrome,
        ComponentType::Headrest,
        ComponentType::Product,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Back => "back",
            ComponentType::Seat => "seat",
            ComponentType::Arm => "arm",
            ComponentType::Mechanism => "mechanism",
            ComponentType::GasLift => "gas_lift",
            ComponentType::Castor => "castor",
            ComponentType::Chrome => "chrome",
            ComponentType::Headrest => "headrest",
            ComponentType::Product => "product",
        }
    }

    /// Parses a stored or user supplied tag. Accepts plurals and the
    /// hyphenated `gas-lift` spelling.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "back" | "backs" => Some(ComponentType::Back),
            "seat" | "seats" => Some(ComponentType::Seat),
            "arm" | "arms" => Some(ComponentType::Arm),
            "mechanism" | "mechanisms" => Some(ComponentType::Mechanism),
            "gas_lift" | "gas-lift" | "gaslift" | "gas_lifts" => Some(ComponentType::GasLift),
            "castor" | "castors" => Some(ComponentType::Castor),
            "chrome" => Some(ComponentType::Chrome),
            "headrest" | "headrests" => Some(ComponentType::Headrest),
            "product" | "products" => Some(ComponentType::Product),
            _ => None,
        }
    }
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an admitted order. Only `Requested` and `Assigned` are set
/// at admission; the rest belong to downstream workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Requested,
    Assigned,
    Accepted,
    Approved,
    DriverAssigned,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Requested => "requested",
            OrderStatus::Assigned => "assigned",
            OrderStatus::Accepted => "accepted",
            OrderStatus::Approved => "approved",
            OrderStatus::DriverAssigned => "driver_assigned",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(OrderStatus::Requested),
            "assigned" => Ok(OrderStatus::Assigned),
            "accepted" => Ok(OrderStatus::Accepted),
            "approved" => Ok(OrderStatus::Approved),
            "driver_assigned" => Ok(OrderStatus::DriverAssigned),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(format!("unknown order status: {}", other)),
        }
    }
}

/// One entry of an order's append-only audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AuditEntry {
    pub actor: String,
    pub role: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Returns true for the furniture types that decompose into components.
pub fn is_chair(furniture_type: &str) -> bool {
    matches!(
        furniture_type.trim().to_ascii_lowercase().as_str(),
        "chair" | "chairs"
    )
}
