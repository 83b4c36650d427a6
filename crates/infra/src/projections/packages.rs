use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_fulfillment::{PackageEvent, PackageId, PackageStatus, PickListId};
use stockpilot_orders::OrderId;

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable package read model.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageReadModel {
    pub package_id: PackageId,
    pub package_number: String,
    pub order_id: OrderId,
    pub pick_list_id: PickListId,
    pub status: PackageStatus,
    pub dimensions: String,
    pub item_count: usize,
    pub total_weight_kg: f64,
}

#[derive(Debug)]
pub struct PackagesProjection<S>
where
    S: ScopedStore<PackageId, PackageReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> PackagesProjection<S>
where
    S: ScopedStore<PackageId, PackageReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &PackageId) -> Option<PackageReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<PackageReadModel> {
        let mut packages = self.store.list(warehouse_id);
        packages.sort_by(|a, b| a.package_number.cmp(&b.package_number));
        packages
    }

    pub fn for_order(&self, warehouse_id: WarehouseId, order_id: OrderId) -> Option<PackageReadModel> {
        self.store
            .list(warehouse_id)
            .into_iter()
            .find(|p| p.order_id == order_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: PackageEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, package_id) = match &event {
            PackageEvent::PackageCreated(e) => (e.warehouse_id, e.package_id),
            PackageEvent::ItemPacked(e) => (e.warehouse_id, e.package_id),
            PackageEvent::PackagePacked(e) => (e.warehouse_id, e.package_id),
        };
        ensure_scope(envelope, event_warehouse, package_id.0)?;

        match event {
            PackageEvent::PackageCreated(e) => {
                self.store.upsert(
                    warehouse_id,
                    e.package_id,
                    PackageReadModel {
                        package_id: e.package_id,
                        package_number: e.package_number,
                        order_id: e.order_id,
                        pick_list_id: e.pick_list_id,
                        status: PackageStatus::Packing,
                        dimensions: e.dimensions,
                        item_count: 0,
                        total_weight_kg: 0.0,
                    },
                );
            }
            PackageEvent::ItemPacked(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &package_id) {
                    rm.item_count += 1;
                    rm.total_weight_kg += e.unit_weight_kg * e.quantity as f64;
                    self.store.upsert(warehouse_id, package_id, rm);
                }
            }
            PackageEvent::PackagePacked(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &package_id) {
                    rm.status = PackageStatus::Packed;
                    rm.total_weight_kg = e.total_weight_kg;
                    self.store.upsert(warehouse_id, package_id, rm);
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
