//! Projection cursor tracking.
//!
//! Cursors record the last processed sequence number per
//! `(warehouse, aggregate)` stream. Replays at or below the cursor are
//! skipped, which makes projections idempotent under at-least-once delivery
//! and lets rebuilds start from a clean slate by clearing the cursors.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use stockpilot_core::{AggregateId, WarehouseId};
use stockpilot_events::EventEnvelope;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("warehouse isolation violation: {0}")]
    WarehouseIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Outcome of a cursor check for an incoming envelope.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CursorDecision {
    /// New event; apply it and advance the cursor afterwards.
    Apply,
    /// Duplicate or replay at/below the cursor; safe to ignore.
    Skip,
}

/// Per-stream cursor table shared by all projections.
#[derive(Debug, Default)]
pub struct ProjectionCursors {
    inner: RwLock<HashMap<(WarehouseId, AggregateId), u64>>,
}

impl ProjectionCursors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide whether an envelope should be applied.
    ///
    /// The first event of a stream may carry any positive sequence number
    /// (stores start at 1); after that, strict +1 increments are enforced.
    pub fn check(&self, envelope: &EventEnvelope<JsonValue>) -> Result<CursorDecision, ProjectionError> {
        let key = (envelope.warehouse_id(), envelope.aggregate_id());
        let seq = envelope.sequence_number();

        let cursors = self
            .inner
            .read()
            .map_err(|_| ProjectionError::Deserialize("cursor lock poisoned".to_string()))?;
        let last = *cursors.get(&key).unwrap_or(&0);

        if seq == 0 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }
        if seq <= last {
            return Ok(CursorDecision::Skip);
        }
        if last != 0 && seq != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence { last, found: seq });
        }

        Ok(CursorDecision::Apply)
    }

    /// Advance the cursor after a successful apply.
    pub fn advance(&self, envelope: &EventEnvelope<JsonValue>) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.insert(
                (envelope.warehouse_id(), envelope.aggregate_id()),
                envelope.sequence_number(),
            );
        }
    }

    /// Reset all cursors (rebuild support).
    pub fn clear(&self) {
        if let Ok(mut cursors) = self.inner.write() {
            cursors.clear();
        }
    }
}

/// Deserialize a typed domain event out of an envelope payload.
pub fn decode_payload<E: DeserializeOwned>(
    envelope: &EventEnvelope<JsonValue>,
) -> Result<E, ProjectionError> {
    serde_json::from_value(envelope.payload().clone())
        .map_err(|e| ProjectionError::Deserialize(e.to_string()))
}

/// Validate that the event's own scoping matches the envelope's.
pub fn ensure_scope(
    envelope: &EventEnvelope<JsonValue>,
    event_warehouse: WarehouseId,
    event_aggregate: AggregateId,
) -> Result<(), ProjectionError> {
    if event_warehouse != envelope.warehouse_id() {
        return Err(ProjectionError::WarehouseIsolation(
            "event warehouse_id does not match envelope warehouse_id".to_string(),
        ));
    }
    if event_aggregate != envelope.aggregate_id() {
        return Err(ProjectionError::WarehouseIsolation(
            "event aggregate id does not match envelope aggregate_id".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    fn envelope(seq: u64) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::from_u128(9),
            WarehouseId::from_uuid(Uuid::from_u128(1)),
            AggregateId::from_uuid(Uuid::from_u128(2)),
            "test.aggregate",
            seq,
            json!({}),
        )
    }

    #[test]
    fn duplicates_are_skipped() {
        let cursors = ProjectionCursors::new();
        assert_eq!(cursors.check(&envelope(1)).unwrap(), CursorDecision::Apply);
        cursors.advance(&envelope(1));
        assert_eq!(cursors.check(&envelope(1)).unwrap(), CursorDecision::Skip);
        assert_eq!(cursors.check(&envelope(2)).unwrap(), CursorDecision::Apply);
    }

    #[test]
    fn gaps_are_rejected() {
        let cursors = ProjectionCursors::new();
        cursors.advance(&envelope(1));
        let err = cursors.check(&envelope(3)).unwrap_err();
        match err {
            ProjectionError::NonMonotonicSequence { last: 1, found: 3 } => {}
            other => panic!("expected NonMonotonicSequence, got {other:?}"),
        }
    }
}
