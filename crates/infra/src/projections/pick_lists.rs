use serde_json::Value as JsonValue;

use stockpilot_core::{ProductId, WarehouseId};
use stockpilot_events::EventEnvelope;
use stockpilot_fulfillment::{PickListEvent, PickListId, PickListStatus};
use stockpilot_orders::OrderId;

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickItemView {
    pub product_id: ProductId,
    pub location: String,
    pub quantity_to_pick: i64,
    pub quantity_picked: i64,
}

/// Queryable pick list read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickListReadModel {
    pub pick_list_id: PickListId,
    pub pick_list_number: String,
    pub order_id: OrderId,
    pub status: PickListStatus,
    pub picker: Option<String>,
    pub items: Vec<PickItemView>,
    pub estimated_pick_minutes: i64,
}

#[derive(Debug)]
pub struct PickListsProjection<S>
where
    S: ScopedStore<PickListId, PickListReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> PickListsProjection<S>
where
    S: ScopedStore<PickListId, PickListReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &PickListId) -> Option<PickListReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<PickListReadModel> {
        let mut lists = self.store.list(warehouse_id);
        lists.sort_by(|a, b| a.pick_list_number.cmp(&b.pick_list_number));
        lists
    }

    /// The pick list raised for an order, if any.
    pub fn for_order(&self, warehouse_id: WarehouseId, order_id: OrderId) -> Option<PickListReadModel> {
        self.store
            .list(warehouse_id)
            .into_iter()
            .find(|p| p.order_id == order_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: PickListEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, pick_list_id) = match &event {
            PickListEvent::PickListCreated(e) => (e.warehouse_id, e.pick_list_id),
            PickListEvent::PickerAssigned(e) => (e.warehouse_id, e.pick_list_id),
            PickListEvent::PickingStarted(e) => (e.warehouse_id, e.pick_list_id),
            PickListEvent::ItemPicked(e) => (e.warehouse_id, e.pick_list_id),
            PickListEvent::PickListCompleted(e) => (e.warehouse_id, e.pick_list_id),
            PickListEvent::PickListCancelled(e) => (e.warehouse_id, e.pick_list_id),
        };
        ensure_scope(envelope, event_warehouse, pick_list_id.0)?;

        match event {
            PickListEvent::PickListCreated(e) => {
                self.store.upsert(
                    warehouse_id,
                    e.pick_list_id,
                    PickListReadModel {
                        pick_list_id: e.pick_list_id,
                        pick_list_number: e.pick_list_number,
                        order_id: e.order_id,
                        status: PickListStatus::Pending,
                        picker: None,
                        items: e
                            .items
                            .into_iter()
                            .map(|spec| PickItemView {
                                product_id: spec.product_id,
                                location: spec.location,
                                quantity_to_pick: spec.quantity,
                                quantity_picked: 0,
                            })
                            .collect(),
                        estimated_pick_minutes: e.estimated_pick_minutes,
                    },
                );
            }
            other => {
                let Some(mut rm) = self.store.get(warehouse_id, &pick_list_id) else {
                    return Ok(());
                };
                match other {
                    PickListEvent::PickListCreated(_) => unreachable!(),
                    PickListEvent::PickerAssigned(e) => {
                        rm.picker = Some(e.picker);
                    }
                    PickListEvent::PickingStarted(_) => {
                        rm.status = PickListStatus::InProgress;
                    }
                    PickListEvent::ItemPicked(e) => {
                        if let Some(item) = rm.items.iter_mut().find(|i| i.product_id == e.product_id) {
                            item.quantity_picked += e.quantity;
                        }
                        if rm.items.iter().any(|i| i.quantity_picked > 0)
                            && rm.status == PickListStatus::InProgress
                        {
                            rm.status = PickListStatus::PartiallyPicked;
                        }
                    }
                    PickListEvent::PickListCompleted(_) => {
                        rm.status = PickListStatus::Completed;
                    }
                    PickListEvent::PickListCancelled(_) => {
                        rm.status = PickListStatus::Cancelled;
                    }
                }
                self.store.upsert(warehouse_id, pick_list_id, rm);
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
