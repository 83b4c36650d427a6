use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;
use stockpilot_reconciliation::{Discrepancy, ReportEvent, ReportId, ReportStatus};

use super::cursor::{CursorDecision, ProjectionCursors, ProjectionError, decode_payload, ensure_scope};
use super::replay::{sort_for_replay, warehouses_in};
use crate::read_model::ScopedStore;

/// Queryable reconciliation report read model.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportReadModel {
    pub report_id: ReportId,
    pub report_number: String,
    pub counted_by: String,
    pub status: ReportStatus,
    pub discrepancies: Vec<Discrepancy>,
    pub accuracy_rate: f64,
    pub variance_rate: f64,
    pub approved_by: Option<String>,
}

#[derive(Debug)]
pub struct ReportsProjection<S>
where
    S: ScopedStore<ReportId, ReportReadModel>,
{
    store: S,
    cursors: ProjectionCursors,
}

impl<S> ReportsProjection<S>
where
    S: ScopedStore<ReportId, ReportReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: ProjectionCursors::new(),
        }
    }

    pub fn get(&self, warehouse_id: WarehouseId, id: &ReportId) -> Option<ReportReadModel> {
        self.store.get(warehouse_id, id)
    }

    pub fn list(&self, warehouse_id: WarehouseId) -> Vec<ReportReadModel> {
        let mut reports = self.store.list(warehouse_id);
        reports.sort_by(|a, b| a.report_number.cmp(&b.report_number));
        reports
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self.cursors.check(envelope)? == CursorDecision::Skip {
            return Ok(());
        }

        let event: ReportEvent = decode_payload(envelope)?;
        let warehouse_id = envelope.warehouse_id();
        let (event_warehouse, report_id) = match &event {
            ReportEvent::ReportOpened(e) => (e.warehouse_id, e.report_id),
            ReportEvent::DiscrepancyRecorded(e) => (e.warehouse_id, e.report_id),
            ReportEvent::ReportCompleted(e) => (e.warehouse_id, e.report_id),
            ReportEvent::ReportApproved(e) => (e.warehouse_id, e.report_id),
            ReportEvent::DiscrepancyAdjusted(e) => (e.warehouse_id, e.report_id),
        };
        ensure_scope(envelope, event_warehouse, report_id.0)?;

        match event {
            ReportEvent::ReportOpened(e) => {
                self.store.upsert(
                    warehouse_id,
                    e.report_id,
                    ReportReadModel {
                        report_id: e.report_id,
                        report_number: e.report_number,
                        counted_by: e.counted_by,
                        status: ReportStatus::InProgress,
                        discrepancies: Vec::new(),
                        accuracy_rate: 100.0,
                        variance_rate: 0.0,
                        approved_by: None,
                    },
                );
            }
            other => {
                let Some(mut rm) = self.store.get(warehouse_id, &report_id) else {
                    return Ok(());
                };
                match other {
                    ReportEvent::ReportOpened(_) => unreachable!(),
                    ReportEvent::DiscrepancyRecorded(e) => {
                        rm.discrepancies.push(Discrepancy {
                            product_id: e.product_id,
                            location: e.location,
                            expected_quantity: e.expected_quantity,
                            counted_quantity: e.counted_quantity,
                            variance_quantity: e.variance_quantity,
                            variance_value: e.variance_value,
                            variance_type: e.variance_type,
                            severity: e.severity,
                            adjusted: false,
                        });
                    }
                    ReportEvent::ReportCompleted(e) => {
                        rm.status = ReportStatus::Completed;
                        rm.accuracy_rate = e.accuracy_rate;
                        rm.variance_rate = e.variance_rate;
                    }
                    ReportEvent::ReportApproved(e) => {
                        rm.status = ReportStatus::Approved;
                        rm.approved_by = Some(e.approved_by);
                    }
                    ReportEvent::DiscrepancyAdjusted(e) => {
                        if let Some(d) = rm
                            .discrepancies
                            .iter_mut()
                            .find(|d| d.product_id == e.product_id && d.location == e.location)
                        {
                            d.adjusted = true;
                        }
                    }
                }
                self.store.upsert(warehouse_id, report_id, rm);
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
