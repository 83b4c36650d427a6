use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_fulfillment::{PackageId, QualityCheckEvent, QualityCheckId, QualityResult};
use stockpilot_orders::OrderId;

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable quality check read model (latest inspection wins).
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheckReadModel {
    pub quality_check_id: QualityCheckId,
    pub order_id: OrderId,
    pub package_id: PackageId,
    pub inspector: String,
    pub overall_score: f64,
    pub result: QualityResult,
    pub recheck_required: bool,
    pub approved_for_shipment: bool,
    pub inspected_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct QualityChecksProjection<S>
where
    S: ScopedStore<QualityCheckId, QualityCheckReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> QualityChecksProjection<S>
where
    S: ScopedStore<QualityCheckId, QualityCheckReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &QualityCheckId) -> Option<QualityCheckReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<QualityCheckReadModel> {
        self.store.list(warehouse_id)
    }

    pub fn for_order(&self, warehouse_id: WarehouseId, order_id: OrderId) -> Option<QualityCheckReadModel> {
        self.store
            .list(warehouse_id)
            .into_iter()
            .find(|q| q.order_id == order_id)
    }

    /// The check covering a package, if one has been recorded. There is one
    /// check stream per package; rechecks land on the same stream, so the
    /// read model always reflects the latest inspection.
    pub fn for_package(&self, warehouse_id: WarehouseId, package_id: PackageId) -> Option<QualityCheckReadModel> {
        self.store
            .list(warehouse_id)
            .into_iter()
            .find(|q| q.package_id == package_id)
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let QualityCheckEvent::InspectionRecorded(e) = decode_payload(envelope)?;
        ensure_scope(envelope, e.warehouse_id, e.quality_check_id.0)?;

        self.store.upsert(
            envelope.warehouse_id(),
            e.quality_check_id,
            QualityCheckReadModel {
                quality_check_id: e.quality_check_id,
                order_id: e.order_id,
                package_id: e.package_id,
                inspector: e.inspector,
                overall_score: e.overall_score,
                result: e.result,
                recheck_required: e.recheck_required,
                approved_for_shipment: e.approved_for_shipment,
                inspected_at: e.occurred_at,
            },
        );

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
