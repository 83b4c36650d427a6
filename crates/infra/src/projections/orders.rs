use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stockpilot_core::{CustomerId, WarehouseId};
use stockpilot_events::EventEnvelope;
use stockpilot_orders::{FulfillmentLink, OrderEvent, OrderId, OrderLine, OrderStatus};

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable order read model.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub status: OrderStatus,
    pub lines: Vec<OrderLine>,
    pub total_amount: f64,
    pub notes: String,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order lifecycle projection.
#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: ScopedStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> OrdersProjection<S>
where
    S: ScopedStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(warehouse_id, order_id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<OrderReadModel> {
        let mut orders = self.store.list(warehouse_id);
        orders.sort_by(|a, b| a.order_number.cmp(&b.order_number));
        orders
    }

    pub fn list_by_status(&self, warehouse_id: WarehouseId, status: OrderStatus) -> Vec<OrderReadModel> {
        self.list(warehouse_id)
            .into_iter()
            .filter(|o| o.status == status)
            .collect()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: OrderEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, order_id) = match &event {
            OrderEvent::OrderPlaced(e) => (e.warehouse_id, e.order_id),
            OrderEvent::OrderStatusChanged(e) => (e.warehouse_id, e.order_id),
            OrderEvent::OrderCancelled(e) => (e.warehouse_id, e.order_id),
            OrderEvent::FulfillmentLinked(e) => (e.warehouse_id, e.order_id),
        };
        ensure_scope(envelope, event_warehouse, order_id.0)?;

        match event {
            OrderEvent::OrderPlaced(e) => {
                self.store.upsert(
                    warehouse_id,
                    e.order_id,
                    OrderReadModel {
                        order_id: e.order_id,
                        order_number: e.order_number,
                        customer_id: e.customer_id,
                        status: OrderStatus::Pending,
                        lines: e.lines,
                        total_amount: e.total_amount,
                        notes: e.notes,
                        tracking_number: None,
                        estimated_delivery: None,
                        actual_delivery: None,
                        placed_at: e.occurred_at,
                        updated_at: e.occurred_at,
                    },
                );
            }
            OrderEvent::OrderStatusChanged(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &order_id) {
                    rm.status = e.to;
                    if e.estimated_delivery.is_some() {
                        rm.estimated_delivery = e.estimated_delivery;
                    }
                    if e.actual_delivery.is_some() {
                        rm.actual_delivery = e.actual_delivery;
                    }
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(warehouse_id, order_id, rm);
                }
            }
            OrderEvent::OrderCancelled(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &order_id) {
                    rm.status = OrderStatus::Cancelled;
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(warehouse_id, order_id, rm);
                }
            }
            OrderEvent::FulfillmentLinked(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &order_id) {
                    if let FulfillmentLink::TrackingNumber(tn) = &e.link {
                        rm.tracking_number = Some(tn.clone());
                    }
                    rm.updated_at = e.occurred_at;
                    self.store.upsert(warehouse_id, order_id, rm);
                }
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        for w in warehouses_in(&envs) {
            self.store.clear_warehouse(w);
        }
        sort_for_replay(&mut envs);
        for env in &envs {
            self.apply_envelope(env)?;
        }
        Ok(())
    }
}
