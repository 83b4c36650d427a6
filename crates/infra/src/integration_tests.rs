//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → EventStore → EventBus → Projection → ReadModel
//!
//! Verifies:
//! - Commands produce events that update read models correctly
//! - Warehouse isolation is preserved
//! - Optimistic concurrency conflicts are detected

use std::sync::Arc;

use chrono::Utc;

use stockpilot_core::{AggregateId, ExpectedVersion, WarehouseId};
use stockpilot_events::{EventBus, EventEnvelope, InMemoryEventBus};
use stockpilot_inventory::{
    InventoryCommand, InventoryRecord, InventoryRecordId, ReserveStock, StockStatus, TrackProduct,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, UncommittedEvent};
use crate::projections::inventory_stock::{InventoryStockProjection, StockReadModel};
use crate::read_model::InMemoryScopedStore;

type TestBus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;
type TestStore = Arc<InMemoryEventStore>;
type TestProjection =
    Arc<InventoryStockProjection<Arc<InMemoryScopedStore<InventoryRecordId, StockReadModel>>>>;

fn test_warehouse_id() -> WarehouseId {
    WarehouseId::new()
}

fn test_record_id() -> InventoryRecordId {
    InventoryRecordId::new(AggregateId::new())
}

fn setup() -> (CommandDispatcher<TestStore, TestBus>, TestStore, TestProjection) {
    let store: TestStore = Arc::new(InMemoryEventStore::new());
    let bus: TestBus = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store.clone(), bus.clone());
    let read_model_store: Arc<InMemoryScopedStore<InventoryRecordId, StockReadModel>> =
        Arc::new(InMemoryScopedStore::new());
    let projection = Arc::new(InventoryStockProjection::new(read_model_store));

    // Subscribe to the bus BEFORE any events are published
    let projection_clone = projection.clone();
    let bus_clone = bus.clone();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    std::thread::spawn(move || {
        let sub = bus_clone.subscribe();
        let _ = ready_tx.send(());
        loop {
            match sub.recv() {
                Ok(env) => {
                    if let Err(e) = projection_clone.apply_envelope(&env) {
                        eprintln!("Failed to apply envelope: {:?}", e);
                    }
                }
                Err(_) => break,
            }
        }
    });
    // Ensure subscriber is ready before returning (prevents missing early events).
    let _ = ready_rx.recv_timeout(std::time::Duration::from_secs(1));

    (dispatcher, store, projection)
}

/// Helper: Wait a short time for events to be processed.
/// The subscriber thread processes events synchronously.
fn wait_for_processing() {
    std::thread::sleep(std::time::Duration::from_millis(50));
}

fn track_command(warehouse_id: WarehouseId, record_id: InventoryRecordId) -> TrackProduct {
    TrackProduct {
        warehouse_id,
        record_id,
        product_id: stockpilot_core::ProductId::new(),
        location: "A-01-01".to_string(),
        initial_stock: 40,
        minimum_stock_level: 5,
        maximum_stock_level: 500,
        reorder_point: 10,
        unit_cost: 2.5,
        occurred_at: Utc::now(),
    }
}

fn dispatch_track(
    dispatcher: &CommandDispatcher<TestStore, TestBus>,
    warehouse_id: WarehouseId,
    record_id: InventoryRecordId,
) {
    dispatcher
        .dispatch(
            warehouse_id,
            record_id.0,
            "inventory.record",
            InventoryCommand::TrackProduct(track_command(warehouse_id, record_id)),
            |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
        )
        .unwrap();
}

#[test]
fn command_tracks_product_and_updates_read_model() {
    let (dispatcher, _store, projection) = setup();
    let warehouse_id = test_warehouse_id();
    let record_id = test_record_id();

    let result = dispatcher.dispatch(
        warehouse_id,
        record_id.0,
        "inventory.record",
        InventoryCommand::TrackProduct(track_command(warehouse_id, record_id)),
        |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
    );

    assert!(result.is_ok());
    let stored_events = result.unwrap();
    assert_eq!(stored_events.len(), 1);
    assert_eq!(stored_events[0].sequence_number, 1);

    wait_for_processing();

    let rm = projection.get(warehouse_id, &record_id).unwrap();
    assert_eq!(rm.record_id, record_id);
    assert_eq!(rm.current_stock, 40);
    assert_eq!(rm.reserved_stock, 0);
    assert_eq!(rm.status, StockStatus::Optimal);
}

#[test]
fn reservations_accumulate_in_read_model() {
    let (dispatcher, _store, projection) = setup();
    let warehouse_id = test_warehouse_id();
    let record_id = test_record_id();

    dispatch_track(&dispatcher, warehouse_id, record_id);
    wait_for_processing();

    for quantity in [5, 10, 3] {
        dispatcher
            .dispatch(
                warehouse_id,
                record_id.0,
                "inventory.record",
                InventoryCommand::ReserveStock(ReserveStock {
                    warehouse_id,
                    record_id,
                    quantity,
                    occurred_at: Utc::now(),
                }),
                |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
            )
            .unwrap();
        wait_for_processing();
    }

    let rm = projection.get(warehouse_id, &record_id).unwrap();
    assert_eq!(rm.reserved_stock, 18);
    assert_eq!(rm.available_stock(), 22);
}

#[test]
fn warehouse_isolation_preserved() {
    let (dispatcher, _store, projection) = setup();
    let warehouse1 = test_warehouse_id();
    let warehouse2 = test_warehouse_id();
    let record1_id = test_record_id();
    let record2_id = test_record_id();

    dispatch_track(&dispatcher, warehouse1, record1_id);
    dispatch_track(&dispatcher, warehouse2, record2_id);
    wait_for_processing();

    let warehouse1_records = projection.list(warehouse1);
    assert_eq!(warehouse1_records.len(), 1);
    assert_eq!(warehouse1_records[0].record_id, record1_id);

    let warehouse2_records = projection.list(warehouse2);
    assert_eq!(warehouse2_records.len(), 1);
    assert_eq!(warehouse2_records[0].record_id, record2_id);

    // Neither warehouse sees the other's record.
    assert!(projection.get(warehouse1, &record2_id).is_none());
    assert!(projection.get(warehouse2, &record1_id).is_none());
}

#[test]
fn optimistic_concurrency_conflict_detected() {
    let (dispatcher, store, _projection) = setup();
    let warehouse_id = test_warehouse_id();
    let record_id = test_record_id();

    dispatch_track(&dispatcher, warehouse_id, record_id);

    // A writer that rehydrated before the track commits would expect
    // version 0. Its append must be rejected.
    let payload = stockpilot_inventory::InventoryEvent::StockReserved(
        stockpilot_inventory::StockReserved {
            warehouse_id,
            record_id,
            quantity: 1,
            occurred_at: Utc::now(),
        },
    );
    let stale = UncommittedEvent::from_typed(
        warehouse_id,
        record_id.0,
        "inventory.record",
        uuid::Uuid::now_v7(),
        &payload,
    )
    .unwrap();

    let result = store.append(vec![stale], ExpectedVersion::Exact(0));
    match result.unwrap_err() {
        EventStoreError::Concurrency(_) => {}
        e => panic!("Expected Concurrency, got: {:?}", e),
    }
}

#[test]
fn rejected_command_does_not_update_read_model() {
    let (dispatcher, _store, projection) = setup();
    let warehouse_id = test_warehouse_id();
    let record_id = test_record_id();

    dispatch_track(&dispatcher, warehouse_id, record_id);
    wait_for_processing();

    // Reserving more than available must fail without touching the read side.
    let result = dispatcher.dispatch(
        warehouse_id,
        record_id.0,
        "inventory.record",
        InventoryCommand::ReserveStock(ReserveStock {
            warehouse_id,
            record_id,
            quantity: 41,
            occurred_at: Utc::now(),
        }),
        |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
    );

    match result.unwrap_err() {
        DispatchError::InsufficientStock {
            requested: 41,
            available: 40,
        } => {}
        e => panic!("Expected InsufficientStock, got: {:?}", e),
    }

    wait_for_processing();

    let rm = projection.get(warehouse_id, &record_id).unwrap();
    assert_eq!(rm.reserved_stock, 0);
}

#[test]
fn projection_rebuild_matches_live_state() {
    let (dispatcher, store, projection) = setup();
    let warehouse_id = test_warehouse_id();
    let record_id = test_record_id();

    dispatch_track(&dispatcher, warehouse_id, record_id);
    dispatcher
        .dispatch(
            warehouse_id,
            record_id.0,
            "inventory.record",
            InventoryCommand::ReserveStock(ReserveStock {
                warehouse_id,
                record_id,
                quantity: 7,
                occurred_at: Utc::now(),
            }),
            |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
        )
        .unwrap();
    wait_for_processing();

    let live = projection.get(warehouse_id, &record_id).unwrap();

    // Rebuild a second projection from the persisted stream only.
    let rebuilt_store: Arc<InMemoryScopedStore<InventoryRecordId, StockReadModel>> =
        Arc::new(InMemoryScopedStore::new());
    let rebuilt = InventoryStockProjection::new(rebuilt_store);
    let history = store.load_stream(warehouse_id, record_id.0).unwrap();
    rebuilt
        .rebuild_from_scratch(history.iter().map(|e| e.to_envelope()))
        .unwrap();

    assert_eq!(rebuilt.get(warehouse_id, &record_id), Some(live));
}
