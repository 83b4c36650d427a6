//! Command execution pipeline (application-level orchestration).
//!
//! Implements the command dispatch pattern for event-sourced aggregates:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from store (warehouse-scoped)
//!   ↓
//! 2. Rehydrate aggregate (apply historical events)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Persist events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to bus (projections consume them)
//! ```
//!
//! Publication is best-effort: events are already persisted when publication
//! runs, so a failed publish is logged and the command still succeeds. The
//! read side can be rebuilt from the store.
//!
//! This module contains no IO itself; it composes the `EventStore` and
//! `EventBus` traits, which keeps it testable against in-memory
//! implementations.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockpilot_core::{Aggregate, AggregateId, DomainError, ExpectedVersion, WarehouseId};
use stockpilot_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
use crate::locks::LockTimeout;

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (stale aggregate version, duplicates).
    Concurrency(String),
    /// Warehouse isolation violation (cross-warehouse stream mixing).
    WarehouseIsolation(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain-level not found.
    NotFound,
    /// A stock operation asked for more units than available.
    InsufficientStock { requested: i64, available: i64 },
    /// A status transition the entity's transition table forbids.
    IllegalTransition { from: String, to: String },
    /// Failed to deserialize historical event payloads.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Transient system failure (lock timeouts, overload). Retryable.
    System(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            EventStoreError::WarehouseIsolation(msg) => {
                DispatchError::WarehouseIsolation(msg.clone())
            }
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::InsufficientStock {
                requested,
                available,
            } => DispatchError::InsufficientStock {
                requested,
                available,
            },
            DomainError::IllegalTransition { from, to } => {
                DispatchError::IllegalTransition { from, to }
            }
        }
    }
}

impl From<LockTimeout> for DispatchError {
    fn from(value: LockTimeout) -> Self {
        DispatchError::System(value.to_string())
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the API layer and the storage layer, giving every command
/// the same execution model while domain code stays pure. Generic over the
/// store and bus so tests run against `InMemoryEventStore` and
/// `InMemoryEventBus` and production can swap in real backends.
///
/// Concurrency is optimistic: the dispatcher loads the stream version and
/// expects exactly that version on append. A concurrent writer makes the
/// append fail with `DispatchError::Concurrency`; callers retry by
/// re-executing the command.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full event-sourcing pipeline.
    ///
    /// `make_aggregate` is a factory closure so the dispatcher can work with
    /// any aggregate type without knowing how to construct it (e.g.
    /// `|_, id| Order::empty(OrderId::new(id))`).
    ///
    /// Returns the committed `StoredEvent`s with assigned sequence numbers.
    /// Warehouse isolation is validated both when loading the stream and
    /// against the store's own checks, so a buggy backend cannot leak
    /// another warehouse's events into a rehydration.
    pub fn dispatch<A>(
        &self,
        warehouse_id: WarehouseId,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(WarehouseId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockpilot_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (warehouse-scoped)
        let history = self.store.load_stream(warehouse_id, aggregate_id)?;
        validate_loaded_stream(warehouse_id, aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(warehouse_id, aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let aggregate_type = aggregate_type.into();
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    warehouse_id,
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events. Best-effort: they are persisted
        // already, so consumers can be caught up by a rebuild.
        for stored in &committed {
            if let Err(e) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    aggregate_type = %stored.aggregate_type,
                    sequence_number = stored.sequence_number,
                    error = ?e,
                    "event publication failed after append"
                );
            }
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    warehouse_id: WarehouseId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Enforce warehouse isolation even if a buggy backend returns foreign
    // data. Also ensure the stream is monotonic by sequence number.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.warehouse_id != warehouse_id {
            return Err(DispatchError::WarehouseIsolation(format!(
                "loaded stream contains wrong warehouse_id at index {idx}"
            )));
        }
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::WarehouseIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}
