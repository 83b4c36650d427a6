use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_fulfillment::{ShipmentId, TrackingEntry, TrackingLogEvent, TrackingLogId};

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable tracking log read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingReadModel {
    pub tracking_log_id: TrackingLogId,
    pub tracking_number: String,
    pub shipment_id: ShipmentId,
    pub entries: Vec<TrackingEntry>,
}

impl TrackingReadModel {
    pub fn latest_entry(&self) -> Option<&TrackingEntry> {
        self.entries.last()
    }

    pub fn milestones(&self) -> Vec<&TrackingEntry> {
        self.entries.iter().filter(|e| e.milestone).collect()
    }
}

#[derive(Debug)]
pub struct TrackingProjection<S>
where
    S: ScopedStore<TrackingLogId, TrackingReadModel>,
{
    store: S,
    by_tracking_number: RwLock<HashMap<(WarehouseId, String), TrackingLogId>>,
    cursors: ProjectionCursors,
}

impl<S> TrackingProjection<S>
where
    S: ScopedStore<TrackingLogId, TrackingReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            by_tracking_number: RwLock::new(HashMap::new()),
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &TrackingLogId) -> Option<TrackingReadModel> {
        self.store.get(warehouse_id, id)
    }

    /// Resolve the log for a carrier tracking number.
    pub fn for_tracking_number(
        &self,
        warehouse_id: WarehouseId,
        tracking_number: &str,
    ) -> Option<TrackingReadModel> {
        let id = *self
            .by_tracking_number
            .read()
            .ok()?
            .get(&(warehouse_id, tracking_number.to_string()))?;
        self.store.get(warehouse_id, &id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: TrackingLogEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, log_id) = match &event {
            TrackingLogEvent::TrackingStarted(e) => (e.warehouse_id, e.tracking_log_id),
            TrackingLogEvent::TrackingEventAppended(e) => (e.warehouse_id, e.tracking_log_id),
        };
        ensure_scope(envelope, event_warehouse, log_id.0)?;

        match event {
            TrackingLogEvent::TrackingStarted(e) => {
                if let Ok(mut index) = self.by_tracking_number.write() {
                    index.insert((warehouse_id, e.tracking_number.clone()), e.tracking_log_id);
                }
                self.store.upsert(
                    warehouse_id,
                    e.tracking_log_id,
                    TrackingReadModel {
                        tracking_log_id: e.tracking_log_id,
                        tracking_number: e.tracking_number,
                        shipment_id: e.shipment_id,
                        entries: Vec::new(),
                    },
                );
            }
            TrackingLogEvent::TrackingEventAppended(e) => {
                if let Some(mut rm) = self.store.get(warehouse_id, &log_id) {
                    rm.entries.push(TrackingEntry {
                        event_type: e.event_type,
                        description: e.description,
                        location: e.location,
                        milestone: e.milestone,
                        event_time: e.event_time,
                    });
                    self.store.upsert(warehouse_id, log_id, rm);
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
