//! Component requirement calculator.
//!
//! Maps an order to the quantity of every component type it consumes. Only
//! chairs decompose into sub-parts; every other furniture type yields an
//! empty bill of materials.

use std::collections::BTreeMap;

use crate::errors::AdmissionFailure;
use crate::models::{is_chair, ComponentType, OrderRequest};

/// Component type to required quantity. Ordered so iteration (and therefore
/// reservation order) is stable.
pub type Requirements = BTreeMap<ComponentType, i32>;

/// Units of each component consumed by one chair. Headrest is handled
/// separately because it depends on the order option.
pub const CHAIR_BILL_OF_MATERIALS: [(ComponentType, i32); 7] = [
    (ComponentType::Back, 1),
    (ComponentType::Seat, 1),
    (ComponentType::Arm, 2),
    (ComponentType::Mechanism, 1),
    (ComponentType::GasLift, 1),
    (ComponentType::Castor, 5),
    (ComponentType::Chrome, 1),
];

/// Computes the component requirements of an order.
///
/// The headrest entry is always present for chairs; it is zero when the
/// option is off and a zero entry reserves nothing. A quantity whose
/// component needs overflow is an invalid order.
pub fn compute_requirements(order: &OrderRequest) -> Result<Requirements, AdmissionFailure> {
    let mut requirements = Requirements::new();
    if !is_chair(&order.furniture_type) {
        return Ok(requirements);
    }

    for (component, per_chair) in CHAIR_BILL_OF_MATERIALS {
        let needed = per_chair.checked_mul(order.quantity).ok_or_else(|| {
            AdmissionFailure::invalid(format!(
                "quantity {} needs more {} than can be counted",
                order.quantity, component
            ))
        })?;
        requirements.insert(component, needed);
    }
    let headrests = if order.headrest { order.quantity } else { 0 };
    requirements.insert(ComponentType::Headrest, headrests);

    Ok(requirements)
}

/// Which stock record kind a back-model name is matched against: finished
/// backs for chairs, finished products for everything else.
pub fn back_model_component(furniture_type: &str) -> ComponentType {
    if is_chair(furniture_type) {
        ComponentType::Back
    } else {
        ComponentType::Product
    }
}

/// Requirements that go through the generic component ledger for this order.
/// A named back model stands in for the generic back.
pub fn generic_requirements(order: &OrderRequest) -> Result<Requirements, AdmissionFailure> {
    let mut requirements = compute_requirements(order)?;
    if order.back_model.is_some() {
        requirements.remove(&ComponentType::Back);
    }
    requirements.retain(|_, quantity| *quantity > 0);
    Ok(requirements)
}
