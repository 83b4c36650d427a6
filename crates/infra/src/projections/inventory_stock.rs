use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use stockpilot_core::{ProductId, WarehouseId};
use stockpilot_events::EventEnvelope;
use stockpilot_inventory::{AlertType, InventoryEvent, InventoryRecordId, StockStatus};

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable inventory read model: one row per tracked product.
#[derive(Debug, Clone, PartialEq)]
pub struct StockReadModel {
    pub record_id: InventoryRecordId,
    pub product_id: ProductId,
    pub location: String,
    pub current_stock: i64,
    pub reserved_stock: i64,
    pub minimum_stock_level: i64,
    pub maximum_stock_level: i64,
    pub reorder_point: i64,
    pub unit_cost: f64,
    pub status: StockStatus,
    pub open_alerts: Vec<AlertType>,
}

impl StockReadModel {
    pub fn available_stock(&self) -> i64 {
        self.current_stock - self.reserved_stock
    }
}

/// Inventory stock projection.
///
/// Maintains the per-record read model plus a product index so the
/// application layer can resolve "which record tracks product X here".
#[derive(Debug)]
pub struct InventoryStockProjection<S>
where
    S: ScopedStore<InventoryRecordId, StockReadModel>,
{
    store: S,
    by_product: RwLock<HashMap<(WarehouseId, ProductId), InventoryRecordId>>,
    cursors: ProjectionCursors,
}

impl<S> InventoryStockProjection<S>
where
    S: ScopedStore<InventoryRecordId, StockReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            by_product: RwLock::new(HashMap::new()),
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, record_id: &InventoryRecordId) -> Option<StockReadModel> {
        self.store.get(warehouse_id, record_id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<StockReadModel> {
        self.store.list(warehouse_id)
    }

    /// Resolve the record tracking a product in this warehouse.
    pub fn record_for_product(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Option<InventoryRecordId> {
        self.by_product
            .read()
            .ok()?
            .get(&(warehouse_id, product_id))
            .copied()
    }

    #[cfg(test)]
    pub(crate) fn seed_for_tests(&self, warehouse_id: WarehouseId, record: StockReadModel) {
        if let Ok(mut index) = self.by_product.write() {
            index.insert((warehouse_id, record.product_id), record.record_id);
        }
        self.store.upsert(warehouse_id, record.record_id, record);
    }

    /// Records with at least one open alert.
    pub fn list_alerting(&self, warehouse_id: WarehouseId) -> Vec<StockReadModel> {
        let mut records: Vec<_> = self
            .store
            .list(warehouse_id)
            .into_iter()
            .filter(|r| !r.open_alerts.is_empty())
            .collect();
        records.sort_by_key(|r| r.product_id);
        records
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: InventoryEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let record_id = match &event {
            InventoryEvent::ProductTracked(e) => e.record_id,
            InventoryEvent::StockReserved(e) => e.record_id,
            InventoryEvent::StockReleased(e) => e.record_id,
            InventoryEvent::StockSold(e) => e.record_id,
            InventoryEvent::ProductRestocked(e) => e.record_id,
            InventoryEvent::StockAdjusted(e) => e.record_id,
            InventoryEvent::StockAlertRaised(e) => e.record_id,
            InventoryEvent::AlertResolved(e) => e.record_id,
        };
        let event_warehouse = match &event {
            InventoryEvent::ProductTracked(e) => e.warehouse_id,
            InventoryEvent::StockReserved(e) => e.warehouse_id,
            InventoryEvent::StockReleased(e) => e.warehouse_id,
            InventoryEvent::StockSold(e) => e.warehouse_id,
            InventoryEvent::ProductRestocked(e) => e.warehouse_id,
            InventoryEvent::StockAdjusted(e) => e.warehouse_id,
            InventoryEvent::StockAlertRaised(e) => e.warehouse_id,
            InventoryEvent::AlertResolved(e) => e.warehouse_id,
        };
        ensure_scope(envelope, event_warehouse, record_id.0)?;

        match event {
            InventoryEvent::ProductTracked(e) => {
                self.store.upsert(
                    warehouse_id,
                    e.record_id,
                    StockReadModel {
                        record_id: e.record_id,
                        product_id: e.product_id,
                        location: e.location,
                        current_stock: e.initial_stock,
                        reserved_stock: 0,
                        minimum_stock_level: e.minimum_stock_level,
                        maximum_stock_level: e.maximum_stock_level,
                        reorder_point: e.reorder_point,
                        unit_cost: e.unit_cost,
                        status: stockpilot_inventory::record::derive_status(
                            e.initial_stock,
                            e.minimum_stock_level,
                            e.reorder_point,
                            e.maximum_stock_level,
                        ),
                        open_alerts: Vec::new(),
                    },
                );
                if let Ok(mut index) = self.by_product.write() {
                    index.insert((warehouse_id, e.product_id), e.record_id);
                }
            }
            _ => {
                let Some(mut rm) = self.store.get(warehouse_id, &record_id) else {
                    // Stream replayed out of order across aggregates; the
                    // tracked event will arrive first on rebuild.
                    return Err(ProjectionError::Deserialize(format!(
                        "inventory record {record_id} not yet tracked"
                    )));
                };
                match event {
                    InventoryEvent::ProductTracked(_) => unreachable!(),
                    InventoryEvent::StockReserved(e) => {
                        rm.reserved_stock += e.quantity;
                    }
                    InventoryEvent::StockReleased(e) => {
                        rm.reserved_stock -= e.quantity;
                    }
                    InventoryEvent::StockSold(e) => {
                        rm.current_stock -= e.quantity;
                        rm.reserved_stock -= e.reservation_consumed;
                    }
                    InventoryEvent::ProductRestocked(e) => {
                        rm.current_stock += e.quantity;
                    }
                    InventoryEvent::StockAdjusted(e) => {
                        rm.current_stock = e.counted_quantity;
                        rm.reserved_stock = rm.reserved_stock.min(e.counted_quantity).max(0);
                    }
                    InventoryEvent::StockAlertRaised(e) => {
                        if !rm.open_alerts.contains(&e.alert_type) {
                            rm.open_alerts.push(e.alert_type);
                        }
                    }
                    InventoryEvent::AlertResolved(e) => {
                        rm.open_alerts.retain(|a| *a != e.alert_type);
                    }
                }
                rm.status = stockpilot_inventory::record::derive_status(
                    rm.current_stock,
                    rm.minimum_stock_level,
                    rm.reorder_point,
                    rm.maximum_stock_level,
                );
                self.store.upsert(warehouse_id, record_id, rm);
            }
        }

        self.cursors.advance(envelope);
        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.clear();
        if let Ok(mut index) = self.by_product.write() {
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
