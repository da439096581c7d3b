use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::ComponentType;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is closed.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

/// Things that happen in the admission core that other parts of the system
/// may want to react to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderAdmitted {
        order_id: Uuid,
        order_number: String,
        shop: Option<String>,
        status: String,
    },
    StockReserved {
        record_id: Uuid,
        component: ComponentType,
        quantity: i32,
    },
    /// A reservation was given back after a later step of the same order failed.
    StockCompensated {
        record_id: Uuid,
        quantity: i32,
    },
    /// A compensating increment failed; the ledger now needs reconciliation.
    CompensationFailed {
        record_id: Uuid,
        quantity: i32,
        reason: String,
    },
}

// Handlers implementing this trait process events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Handler that writes every event to the log.
pub struct LoggingEventHandler;

#[async_trait]
impl EventHandler for LoggingEventHandler {
    async fn handle_event(&self, event: &Event) -> Result<(), String> {
        match event {
            Event::OrderAdmitted {
                order_number,
                shop,
                status,
                ..
            } => {
                info!(order_number = %order_number, shop = ?shop, status = %status, "Order admitted");
            }
            Event::StockReserved {
                record_id,
                component,
                quantity,
            } => {
                info!(record_id = %record_id, component = %component, quantity, "Stock reserved");
            }
            Event::StockCompensated {
                record_id,
                quantity,
            } => {
                info!(record_id = %record_id, quantity, "Stock reservation compensated");
            }
            Event::CompensationFailed {
                record_id,
                quantity,
                reason,
            } => {
                error!(
                    target: "furnishop_api::reconciliation",
                    record_id = %record_id,
                    quantity,
                    reason = %reason,
                    "Compensation failed; stock record requires manual reconciliation"
                );
            }
        }
        Ok(())
    }
}

/// Drains the event channel, handing every event to each handler in turn.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Box<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!("Failed to handle event {:?}: {}", event, e);
            }
        }
    }

    info!("Event channel closed; event processing loop stopped");
}
