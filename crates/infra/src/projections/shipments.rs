use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_fulfillment::{PackageId, ShipmentEvent, ShipmentId, ShipmentStatus};
use stockpilot_orders::OrderId;

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable shipment read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShipmentReadModel {
    pub shipment_id: ShipmentId,
    pub shipment_number: String,
    pub order_id: OrderId,
    pub package_id: PackageId,
    pub tracking_number: String,
    pub carrier: String,
    pub status: ShipmentStatus,
    pub pickup_at: Option<DateTime<Utc>>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Shipment projection.
///
/// Also maintains the tracking-number index the application layer uses to
/// enforce tracking-number uniqueness per warehouse.
#[derive(Debug)]
pub struct ShipmentsProjection<S>
where
    S: ScopedStore<ShipmentId, ShipmentReadModel>,
{
    store: S,
    by_tracking_number: RwLock<HashMap<(WarehouseId, String), ShipmentId>>,
    cursors: ProjectionCursors,
}

impl<S> ShipmentsProjection<S>
where
    S: ScopedStore<ShipmentId, ShipmentReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            by_tracking_number: RwLock::new(HashMap::new()),
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &ShipmentId) -> Option<ShipmentReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<ShipmentReadModel> {
        let mut shipments = self.store.list(warehouse_id);
        shipments.sort_by(|a, b| a.shipment_number.cmp(&b.shipment_number));
        shipments
    }

    pub fn for_order(&self, warehouse_id: WarehouseId, order_id: OrderId) -> Option<ShipmentReadModel> {
        self.store
            .list(warehouse_id)
            .into_iter()
            .find(|s| s.order_id == order_id)
    }

    /// Resolve a shipment by its carrier tracking number.
    pub fn for_tracking_number(
        &self,
        warehouse_id: WarehouseId,
        tracking_number: &str,
    ) -> Option<ShipmentId> {
        self.by_tracking_number
            .read()
            .ok()?
            .get(&(warehouse_id, tracking_number.to_string()))
            .copied()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: ShipmentEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, shipment_id) = match &event {
            ShipmentEvent::ShipmentCreated(e) => (e.warehouse_id, e.shipment_id),
            ShipmentEvent::DispatchScheduled(e) => (e.warehouse_id, e.shipment_id),
            ShipmentEvent::ShipmentStatusChanged(e) => (e.warehouse_id, e.shipment_id),
        };
        ensure_scope(envelope, event_warehouse, shipment_id.0)?;

        match event {
            ShipmentEvent::ShipmentCreated(e) => {
                if let Ok(mut index) = self.by_tracking_number.write() {
                    index.insert((warehouse_id, e.tracking_number.clone()), e.shipment_id);
                }
                self.store.upsert(
                    warehouse_id,
                    e.shipment_id,
                    ShipmentReadModel {
                        shipment_id: e.shipment_id,
                        shipment_number: e.shipment_number,
                        order_id: e.order_id,
                        package_id: e.package_id,
                        tracking_number: e.tracking_number,
                        carrier: e.carrier,
                        status: ShipmentStatus::Scheduled,
                        pickup_at: None,
                        shipped_at: None,
                        delivered_at: None,
                    },
                );
            }
            ShipmentEvent::DispatchScheduled(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &shipment_id) {
                    rm.status = ShipmentStatus::DispatchScheduled;
                    rm.pickup_at = Some(e.pickup_at);
                    self.store.upsert(warehouse_id, shipment_id, rm);
                }
            }
            ShipmentEvent::ShipmentStatusChanged(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &shipment_id) {
                    rm.status = e.to;
                    match e.to {
                        ShipmentStatus::Shipped => rm.shipped_at = Some(e.occurred_at),
                        ShipmentStatus::Delivered => rm.delivered_at = Some(e.occurred_at),
                        _ => {}
                    }
                    self.store.upsert(warehouse_id, shipment_id, rm);
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
        if let Ok(mut index) = self.by_tracking_number.write() {
            index.clear();
        }
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
