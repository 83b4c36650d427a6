use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_orders::OrderId;
use stockpilot_returns::{ReturnEvent, ReturnId, ReturnLine, ReturnReason, ReturnStatus};

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable return order read model.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnReadModel {
    pub return_id: ReturnId,
    pub return_number: String,
    pub order_id: OrderId,
    pub reason: ReturnReason,
    pub status: ReturnStatus,
    pub lines: Vec<ReturnLine>,
    pub total_quantity: i64,
    pub restocked_quantity: i64,
    pub total_refund: f64,
}

/// Returns projection.
///
/// Maintains the per-order index used to enforce the
/// one-active-return-per-order rule.
#[derive(Debug)]
pub struct ReturnsProjection<S>
where
    S: ScopedStore<ReturnId, ReturnReadModel>,
{
    store: S,
    active_by_order: RwLock<HashMap<(WarehouseId, OrderId), ReturnId>>,
    cursors: ProjectionCursors,
}

impl<S> ReturnsProjection<S>
where
    S: ScopedStore<ReturnId, ReturnReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            active_by_order: RwLock::new(HashMap::new()),
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &ReturnId) -> Option<ReturnReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<ReturnReadModel> {
        let mut returns = self.store.list(warehouse_id);
        returns.sort_by(|a, b| a.return_number.cmp(&b.return_number));
        returns
    }

    /// The active (non-terminal) return held against an order, if any.
    pub fn active_for_order(&self, warehouse_id: WarehouseId, order_id: OrderId) -> Option<ReturnId> {
        self.active_by_order
            .read()
            .ok()?
            .get(&(warehouse_id, order_id))
            .copied()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: ReturnEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, return_id) = match &event {
            ReturnEvent::ReturnRequested(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ReturnApproved(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ReturnRejected(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ReturnReceived(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::InspectionStarted(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ItemRestocked(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ItemRepaired(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ProcessingStarted(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::RefundBreakdownSet(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ReturnCompleted(e) => (e.warehouse_id, e.return_id),
            ReturnEvent::ReturnCancelled(e) => (e.warehouse_id, e.return_id),
        };
        ensure_scope(envelope, event_warehouse, return_id.0)?;

        match event {
            ReturnEvent::ReturnRequested(e) => {
                if let Ok(mut index) = self.active_by_order.write() {
                    index.insert((warehouse_id, e.order_id), e.return_id);
                }
                let total_quantity = e.lines.iter().map(|l| l.quantity).sum();
                self.store.upsert(
                    warehouse_id,
                    e.return_id,
                    ReturnReadModel {
                        return_id: e.return_id,
                        return_number: e.return_number,
                        order_id: e.order_id,
                        reason: e.reason,
                        status: ReturnStatus::Requested,
                        lines: e.lines,
                        total_quantity,
                        restocked_quantity: 0,
                        total_refund: 0.0,
                    },
                );
            }
            other => {
                let Some(mut rm) = self.store.get(warehouse_id, &return_id) else {
                    return Ok(());
                };
                match other {
                    ReturnEvent::ReturnRequested(_) => unreachable!(),
                    ReturnEvent::ReturnApproved(_) => rm.status = ReturnStatus::Approved,
                    ReturnEvent::ReturnRejected(_) => rm.status = ReturnStatus::Rejected,
                    ReturnEvent::ReturnReceived(_) => rm.status = ReturnStatus::Received,
                    ReturnEvent::InspectionStarted(_) => rm.status = ReturnStatus::Inspecting,
                    ReturnEvent::ItemRestocked(e) => rm.restocked_quantity += e.quantity,
                    ReturnEvent::ItemRepaired(_) => {}
                    ReturnEvent::ProcessingStarted(_) => rm.status = ReturnStatus::Processing,
                    ReturnEvent::RefundBreakdownSet(e) => rm.total_refund = e.total_refund,
                    ReturnEvent::ReturnCompleted(_) => rm.status = ReturnStatus::Completed,
                    ReturnEvent::ReturnCancelled(_) => rm.status = ReturnStatus::Cancelled,
                }
                if !rm.status.is_active() {
                    if let Ok(mut index) = self.active_by_order.write() {
                        index.remove(&(warehouse_id, rm.order_id));
                    }
                }
                self.store.upsert(warehouse_id, return_id, rm);
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
        if let Ok(mut index) = self.active_by_order.write() {
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
