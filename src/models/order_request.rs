use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::errors::{AdmissionFailure, AdmissionRejection, ServiceError};
use crate::services::requirements::compute_requirements;

pub const DEFAULT_FURNITURE_TYPE: &str = "chair";

/// Body accepted by the order-creation endpoint.
///
/// Variants are tried in declaration order, so an object carrying `items`
/// is always read as a shop envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AdmissionPayload {
    Envelope(ShopEnvelope),
    Batch(Vec<OrderRequestInput>),
    Single(OrderRequestInput),
}

/// Shop-style payload whose line items inherit the shop context.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopEnvelope {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub shopkeeper: Option<String>,
    pub items: Vec<OrderRequestInput>,
}

/// One order as it arrives over the wire, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequestInput {
    #[serde(default)]
    pub shop: Option<String>,
    #[serde(default)]
    pub shopkeeper: Option<String>,
    #[serde(default, alias = "type", alias = "furniture_type")]
    pub furniture_type: Option<String>,
    #[serde(
        default,
        alias = "productModel",
        alias = "back_model",
        alias = "product_model"
    )]
    pub back_model: Option<String>,
    /// Number or numeric string; validated into a positive integer
    #[serde(default)]
    pub quantity: Option<Value>,
    #[serde(default)]
    pub headrest: bool,
    #[serde(default, alias = "assigned_factory")]
    pub assigned_factory: Option<String>,
    #[serde(default, alias = "order_number")]
    pub order_number: Option<String>,
    /// Present only when a malformed envelope fell through to this variant
    #[serde(default, skip_serializing)]
    pub items: Option<Value>,
}

/// A validated order ready for reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub shop: Option<String>,
    pub shopkeeper: Option<String>,
    pub furniture_type: String,
    pub back_model: Option<String>,
    pub quantity: i32,
    pub headrest: bool,
    pub assigned_factory: Option<String>,
    pub order_number: Option<String>,
}

impl OrderRequest {
    /// Minimal chair order, mostly useful for seeding and tests.
    pub fn chair(quantity: i32) -> Self {
        Self {
            shop: None,
            shopkeeper: None,
            furniture_type: DEFAULT_FURNITURE_TYPE.to_string(),
            back_model: None,
            quantity,
            headrest: false,
            assigned_factory: None,
            order_number: None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts a JSON integer or a string holding one; anything else is rejected.
pub fn parse_quantity(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

impl OrderRequestInput {
    /// Validates the quantity and fills defaults. The quantity must also keep
    /// every component need within range.
    pub fn validate(self) -> Result<OrderRequest, AdmissionFailure> {
        if self.items.is_some() {
            return Err(AdmissionFailure::invalid("malformed items list"));
        }

        let raw = self
            .quantity
            .as_ref()
            .ok_or_else(|| AdmissionFailure::invalid("quantity is required"))?;
        let quantity = parse_quantity(raw)
            .ok_or_else(|| AdmissionFailure::invalid(format!("quantity {} is not an integer", raw)))?;
        if quantity <= 0 {
            return Err(AdmissionFailure::invalid(format!(
                "quantity must be positive, got {}",
                quantity
            )));
        }
        let quantity = i32::try_from(quantity)
            .map_err(|_| AdmissionFailure::invalid(format!("quantity {} is too large", quantity)))?;

        let request = OrderRequest {
            shop: non_blank(self.shop),
            shopkeeper: non_blank(self.shopkeeper),
            furniture_type: non_blank(self.furniture_type)
                .unwrap_or_else(|| DEFAULT_FURNITURE_TYPE.to_string()),
            back_model: non_blank(self.back_model),
            quantity,
            headrest: self.headrest,
            assigned_factory: non_blank(self.assigned_factory),
            order_number: non_blank(self.order_number),
        };
        compute_requirements(&request)?;
        Ok(request)
    }
}

impl AdmissionPayload {
    /// Flattens any payload shape into one list of raw orders.
    pub fn into_inputs(self) -> Vec<OrderRequestInput> {
        match self {
            AdmissionPayload::Single(input) => vec![input],
            AdmissionPayload::Batch(inputs) => inputs,
            AdmissionPayload::Envelope(envelope) => {
                let ShopEnvelope {
                    shop,
                    shopkeeper,
                    items,
                } = envelope;
                items
                    .into_iter()
                    .map(|mut item| {
                        if item.shop.is_none() {
                            item.shop = shop.clone();
                        }
                        if item.shopkeeper.is_none() {
                            item.shopkeeper = shopkeeper.clone();
                        }
                        item
                    })
                    .collect()
            }
        }
    }

    /// Normalizes and validates every order. The first invalid order rejects
    /// the whole payload; an empty payload is rejected as well, and so is a
    /// caller-supplied order number repeated within the batch.
    pub fn into_requests(self, max_batch_size: usize) -> Result<Vec<OrderRequest>, ServiceError> {
        let inputs = self.into_inputs();
        if inputs.is_empty() {
            return Err(AdmissionFailure::invalid("no orders in payload").into());
        }
        if inputs.len() > max_batch_size {
            return Err(AdmissionFailure::invalid(format!(
                "batch of {} orders exceeds the limit of {}",
                inputs.len(),
                max_batch_size
            ))
            .into());
        }

        let mut seen_numbers = HashSet::new();
        inputs
            .into_iter()
            .enumerate()
            .map(|(index, input)| {
                let reject = |failure: AdmissionFailure| {
                    ServiceError::AdmissionRejected(AdmissionRejection::new(failure).at(index))
                };
                let request = input.validate().map_err(reject)?;
                if let Some(number) = &request.order_number {
                    if !seen_numbers.insert(number.clone()) {
                        return Err(reject(AdmissionFailure::invalid(format!(
                            "order number {} appears more than once in the batch",
                            number
                        ))));
                    }
                }
                Ok(request)
            })
            .collect()
    }
}
