//! Deterministic replay support for projection rebuilds.

use serde_json::Value as JsonValue;

use stockpilot_core::WarehouseId;
use stockpilot_events::EventEnvelope;

/// Sort envelopes into the canonical replay order: warehouse, aggregate,
/// sequence. Replaying in this order is deterministic regardless of the
/// order envelopes were collected in.
pub fn sort_for_replay(envelopes: &mut [EventEnvelope<JsonValue>]) {
    envelopes.sort_by_key(|e| {
        (
            *e.warehouse_id().as_uuid().as_bytes(),
            *e.aggregate_id().as_uuid().as_bytes(),
            e.sequence_number(),
        )
    });
}

/// Distinct warehouses present in a batch (for clearing read models before
/// a rebuild).
pub fn warehouses_in(envelopes: &[EventEnvelope<JsonValue>]) -> Vec<WarehouseId> {
    let mut warehouses: Vec<_> = envelopes.iter().map(|e| e.warehouse_id()).collect();
    warehouses.sort_by_key(|w| *w.as_uuid().as_bytes());
    warehouses.dedup();
    warehouses
}
