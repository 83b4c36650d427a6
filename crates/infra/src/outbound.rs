//! Outbound message queue implementations.

use std::sync::{Arc, Mutex};

use stockpilot_events::OutboundMessage;

/// Queue of messages bound for external systems.
///
/// Delivery is at-least-once: a consumer that crashes mid-drain re-reads
/// whatever it did not acknowledge, so external consumers must be
/// idempotent.
pub trait OutboundQueue: Send + Sync {
    fn enqueue(&self, message: OutboundMessage);

    /// Remove and return all pending messages for one topic, in enqueue order.
    fn drain_topic(&self, topic: &str) -> Vec<OutboundMessage>;

    fn pending(&self) -> usize;
}

impl<Q> OutboundQueue for Arc<Q>
where
    Q: OutboundQueue + ?Sized,
{
    fn enqueue(&self, message: OutboundMessage) {
        (**self).enqueue(message)
    }

    fn drain_topic(&self, topic: &str) -> Vec<OutboundMessage> {
        (**self).drain_topic(topic)
    }

    fn pending(&self) -> usize {
        (**self).pending()
    }
}

/// In-memory outbound queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryOutboundQueue {
    messages: Mutex<Vec<OutboundMessage>>,
}

impl InMemoryOutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutboundQueue for InMemoryOutboundQueue {
    fn enqueue(&self, message: OutboundMessage) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(message);
        }
    }

    fn drain_topic(&self, topic: &str) -> Vec<OutboundMessage> {
        let mut messages = match self.messages.lock() {
            Ok(m) => m,
            Err(_) => return vec![],
        };

        let mut drained = Vec::new();
        let mut kept = Vec::with_capacity(messages.len());
        for msg in messages.drain(..) {
            if msg.topic() == topic {
                drained.push(msg);
            } else {
                kept.push(msg);
            }
        }
        *messages = kept;
        drained
    }

    fn pending(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use stockpilot_core::WarehouseId;
    use stockpilot_events::outbound::topics;

    #[test]
    fn drain_is_per_topic_and_ordered() {
        let queue = InMemoryOutboundQueue::new();
        let warehouse_id = WarehouseId::from_uuid(uuid::Uuid::from_u128(1));

        queue.enqueue(OutboundMessage::new(
            warehouse_id,
            topics::ORDER_NOTIFICATIONS,
            json!({"order": 1}),
            Utc::now(),
        ));
        queue.enqueue(OutboundMessage::new(
            warehouse_id,
            topics::FINANCE_REFUNDS,
            json!({"refund": 57.0}),
            Utc::now(),
        ));
        queue.enqueue(OutboundMessage::new(
            warehouse_id,
            topics::ORDER_NOTIFICATIONS,
            json!({"order": 2}),
            Utc::now(),
        ));

        let orders = queue.drain_topic(topics::ORDER_NOTIFICATIONS);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].payload()["order"], 1);
        assert_eq!(orders[1].payload()["order"], 2);
        assert_eq!(queue.pending(), 1);
    }
}
