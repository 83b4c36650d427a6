use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_exceptions::{
    ExceptionEvent, ExceptionId, ExceptionSeverity, ExceptionStatus, ExceptionType, Priority,
    ResolutionEfficiency, ResolutionType, resolution_efficiency,
};
use stockpilot_orders::OrderId;

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable delivery exception read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionReadModel {
    pub exception_id: ExceptionId,
    pub exception_number: String,
    pub tracking_number: String,
    pub order_id: OrderId,
    pub exception_type: ExceptionType,
    pub severity: ExceptionSeverity,
    pub priority: Priority,
    pub status: ExceptionStatus,
    pub assigned_to: Option<String>,
    pub resolution_type: Option<ResolutionType>,
    pub resolution_duration_hours: Option<i64>,
    pub efficiency: Option<ResolutionEfficiency>,
    pub reported_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Delivery exception projection.
///
/// Maintains the per-tracking-number index used to enforce the
/// one-unresolved-exception-per-tracking-number rule.
#[derive(Debug)]
pub struct ExceptionsProjection<S>
where
    S: ScopedStore<ExceptionId, ExceptionReadModel>,
{
    store: S,
    open_by_tracking: RwLock<HashMap<(WarehouseId, String), ExceptionId>>,
    cursors: ProjectionCursors,
}

impl<S> ExceptionsProjection<S>
where
    S: ScopedStore<ExceptionId, ExceptionReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            open_by_tracking: RwLock::new(HashMap::new()),
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &ExceptionId) -> Option<ExceptionReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<ExceptionReadModel> {
        let mut exceptions = self.store.list(warehouse_id);
        exceptions.sort_by(|a, b| a.exception_number.cmp(&b.exception_number));
        exceptions
    }

    pub fn list_unresolved(&self, warehouse_id: WarehouseId) -> Vec<ExceptionReadModel> {
        self.list(warehouse_id)
            .into_iter()
            .filter(|e| e.status.is_active())
            .collect()
    }

    /// The unresolved exception held against a tracking number, if any.
    pub fn open_for_tracking_number(
        &self,
        warehouse_id: WarehouseId,
        tracking_number: &str,
    ) -> Option<ExceptionId> {
        self.open_by_tracking
            .read()
            .ok()?
            .get(&(warehouse_id, tracking_number.to_string()))
            .copied()
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: ExceptionEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, exception_id) = match &event {
            ExceptionEvent::ExceptionOpened(e) => (e.warehouse_id, e.exception_id),
            ExceptionEvent::ExceptionAssigned(e) => (e.warehouse_id, e.exception_id),
            ExceptionEvent::ExceptionEscalated(e) => (e.warehouse_id, e.exception_id),
            ExceptionEvent::ExceptionResolved(e) => (e.warehouse_id, e.exception_id),
            ExceptionEvent::ExceptionClosed(e) => (e.warehouse_id, e.exception_id),
        };
        ensure_scope(envelope, event_warehouse, exception_id.0)?;

        match event {
            ExceptionEvent::ExceptionOpened(e) => {
                if let Ok(mut index) = self.open_by_tracking.write() {
                    index.insert((warehouse_id, e.tracking_number.clone()), e.exception_id);
                }
                self.store.upsert(
                    warehouse_id,
                    e.exception_id,
                    ExceptionReadModel {
                        exception_id: e.exception_id,
                        exception_number: e.exception_number,
                        tracking_number: e.tracking_number,
                        order_id: e.order_id,
                        exception_type: e.exception_type,
                        severity: e.severity,
                        priority: e.priority,
                        status: ExceptionStatus::Open,
                        assigned_to: None,
                        resolution_type: None,
                        resolution_duration_hours: None,
                        efficiency: None,
                        reported_at: e.occurred_at,
                        resolved_at: None,
                    },
                );
            }
            ExceptionEvent::ExceptionAssigned(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &exception_id) {
                    rm.assigned_to = Some(e.assignee);
                    // Assignment reopens a resolved exception.
                    rm.status = ExceptionStatus::InProgress;
                    if let Ok(mut index) = self.open_by_tracking.write() {
                        index.insert((warehouse_id, rm.tracking_number.clone()), exception_id);
                    }
                    self.store.upsert(warehouse_id, exception_id, rm);
                }
            }
            ExceptionEvent::ExceptionEscalated(_) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &exception_id) {
                    rm.status = ExceptionStatus::Escalated;
                    rm.priority = Priority::Urgent;
                    self.store.upsert(warehouse_id, exception_id, rm);
                }
            }
            ExceptionEvent::ExceptionResolved(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &exception_id) {
                    rm.status = ExceptionStatus::Resolved;
                    rm.resolution_type = Some(e.resolution_type);
                    rm.resolution_duration_hours = Some(e.resolution_duration_hours);
                    rm.efficiency = Some(resolution_efficiency(e.resolution_duration_hours));
                    rm.resolved_at = Some(e.occurred_at);
                    if let Ok(mut index) = self.open_by_tracking.write() {
                        index.remove(&(warehouse_id, rm.tracking_number.clone()));
                    }
                    self.store.upsert(warehouse_id, exception_id, rm);
                }
            }
            ExceptionEvent::ExceptionClosed(_) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &exception_id) {
                    rm.status = ExceptionStatus::Closed;
                    self.store.upsert(warehouse_id, exception_id, rm);
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
        if let Ok(mut index) = self.open_by_tracking.write() {
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
