//! Outbound integration messages.
//!
//! External systems (customer notifications, finance, carriers) are reached
//! through a typed message queue, never by direct calls from domain code.
//! A message is `{topic, payload}`; delivery is at-least-once and consumers
//! drain the queue out of band.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockpilot_core::WarehouseId;

/// Well-known outbound topics.
pub mod topics {
    pub const ORDER_NOTIFICATIONS: &str = "notifications.order";
    pub const ALERT_NOTIFICATIONS: &str = "notifications.alert";
    pub const FINANCE_REFUNDS: &str = "finance.refund";
    pub const CARRIER_SHIPMENTS: &str = "carrier.shipment";
}

/// A message destined for an external system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    message_id: Uuid,
    warehouse_id: WarehouseId,
    topic: String,
    payload: JsonValue,
    enqueued_at: DateTime<Utc>,
}

impl OutboundMessage {
    pub fn new(
        warehouse_id: WarehouseId,
        topic: impl Into<String>,
        payload: JsonValue,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: Uuid::now_v7(),
            warehouse_id,
            topic: topic.into(),
            payload,
            enqueued_at,
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &JsonValue {
        &self.payload
    }

    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}
