use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use stockpilot_core::{AggregateId, ProductId, WarehouseId};
use stockpilot_events::EventEnvelope;
use stockpilot_events::InMemoryEventBus;
use stockpilot_infra::command_dispatcher::CommandDispatcher;
use stockpilot_infra::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
use stockpilot_infra::projections::inventory_stock::{InventoryStockProjection, StockReadModel};
use stockpilot_infra::read_model::InMemoryScopedStore;
use stockpilot_inventory::{
    AdjustStock, InventoryCommand, InventoryEvent, InventoryRecord, InventoryRecordId,
    ProductTracked, StockAdjusted, TrackProduct,
};

/// Naive CRUD simulation: direct key-value updates (no events, no history).
#[derive(Debug, Clone)]
struct NaiveCrudStore {
    inner: Arc<RwLock<HashMap<(WarehouseId, AggregateId), CrudState>>>,
}

#[derive(Debug, Clone, PartialEq)]
struct CrudState {
    location: String,
    current_stock: i64,
    version: u64, // For optimistic concurrency (not used in benchmarks)
}

impl NaiveCrudStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn track(&self, warehouse_id: WarehouseId, record_id: AggregateId, location: String, stock: i64) {
        let mut map = self.inner.write().unwrap();
        map.insert(
            (warehouse_id, record_id),
            CrudState {
                location,
                current_stock: stock,
                version: 1,
            },
        );
    }

    fn adjust(&self, warehouse_id: WarehouseId, record_id: AggregateId, counted: i64) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        if let Some(state) = map.get_mut(&(warehouse_id, record_id)) {
            if counted < 0 {
                return Err(());
            }
            state.current_stock = counted;
            state.version += 1;
            Ok(())
        } else {
            Err(())
        }
    }
}

fn track_cmd(warehouse_id: WarehouseId, record_id: InventoryRecordId) -> TrackProduct {
    TrackProduct {
        warehouse_id,
        record_id,
        product_id: ProductId::new(),
        location: "A-01-01".to_string(),
        initial_stock: 100,
        minimum_stock_level: 5,
        maximum_stock_level: 500,
        reorder_point: 10,
        unit_cost: 2.5,
        occurred_at: Utc::now(),
    }
}

fn setup_event_sourcing() -> (
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>,
    WarehouseId,
    AggregateId,
) {
    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> = Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus);
    let warehouse_id = WarehouseId::new();
    let record_id = AggregateId::new();
    (dispatcher, warehouse_id, record_id)
}

fn bench_command_execution_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("command_execution_latency");
    group.sample_size(1000);

    // Benchmark: TrackProduct command (first command, no history)
    group.bench_function("track_product_fresh", |b| {
        let (dispatcher, warehouse_id, _) = setup_event_sourcing();
        b.iter(|| {
            let record_id = AggregateId::new();
            let cmd = black_box(track_cmd(warehouse_id, InventoryRecordId::new(record_id)));
            dispatcher
                .dispatch(
                    warehouse_id,
                    record_id,
                    "inventory.record",
                    InventoryCommand::TrackProduct(cmd),
                    |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
                )
                .unwrap();
        });
    });

    // Benchmark: AdjustStock command after tracking (with history)
    group.bench_function("adjust_stock_with_history", |b| {
        let (dispatcher, warehouse_id, record_id) = setup_event_sourcing();
        let record_id_typed = InventoryRecordId::new(record_id);

        dispatcher
            .dispatch(
                warehouse_id,
                record_id,
                "inventory.record",
                InventoryCommand::TrackProduct(track_cmd(warehouse_id, record_id_typed)),
                |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
            )
            .unwrap();

        b.iter(|| {
            let adjust_cmd = AdjustStock {
                warehouse_id,
                record_id: record_id_typed,
                counted_quantity: black_box(100),
                reason: "cycle count".to_string(),
                occurred_at: Utc::now(),
            };
            dispatcher
                .dispatch(
                    warehouse_id,
                    record_id,
                    "inventory.record",
                    InventoryCommand::AdjustStock(adjust_cmd),
                    |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
                )
                .unwrap();
        });
    });

    group.finish();
}

fn bench_event_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_append_throughput");
    group.throughput(Throughput::Elements(1));

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("batch_append", batch_size),
            batch_size,
            |b, &size| {
                let store = InMemoryEventStore::new();
                let warehouse_id = WarehouseId::new();
                let record_id = AggregateId::new();

                b.iter(|| {
                    let events: Vec<UncommittedEvent> = (0..size)
                        .map(|i| {
                            let event = InventoryEvent::StockAdjusted(StockAdjusted {
                                warehouse_id,
                                record_id: InventoryRecordId::new(record_id),
                                previous_quantity: i as i64,
                                counted_quantity: (i + 1) as i64,
                                reason: "cycle count".to_string(),
                                occurred_at: Utc::now(),
                            });
                            UncommittedEvent::from_typed(
                                warehouse_id,
                                record_id,
                                "inventory.record",
                                uuid::Uuid::now_v7(),
                                &event,
                            )
                            .unwrap()
                        })
                        .collect();

                    black_box(
                        store
                            .append(events, stockpilot_core::ExpectedVersion::Any)
                            .unwrap(),
                    );
                });
            },
        );
    }

    group.finish();
}

fn bench_projection_rebuild_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("projection_rebuild_speed");

    for event_count in [10, 100, 1000, 10000].iter() {
        group.bench_with_input(
            BenchmarkId::new("rebuild_from_events", event_count),
            event_count,
            |b, &count| {
                let store = InMemoryEventStore::new();
                let warehouse_id = WarehouseId::new();
                let record_id = AggregateId::new();
                let record_id_typed = InventoryRecordId::new(record_id);

                // Pre-generate events
                let mut all_envelopes = Vec::new();
                {
                    let tracked = InventoryEvent::ProductTracked(ProductTracked {
                        warehouse_id,
                        record_id: record_id_typed,
                        product_id: ProductId::new(),
                        location: "A-01-01".to_string(),
                        initial_stock: 100,
                        minimum_stock_level: 5,
                        maximum_stock_level: 500,
                        reorder_point: 10,
                        unit_cost: 2.5,
                        occurred_at: Utc::now(),
                    });
                    let uncommitted = UncommittedEvent::from_typed(
                        warehouse_id,
                        record_id,
                        "inventory.record",
                        uuid::Uuid::now_v7(),
                        &tracked,
                    )
                    .unwrap();
                    let stored = store
                        .append(vec![uncommitted], stockpilot_core::ExpectedVersion::Any)
                        .unwrap();
                    all_envelopes.push(stored[0].to_envelope());

                    // Stock corrections on top
                    for i in 0..(count - 1) {
                        let adjusted = InventoryEvent::StockAdjusted(StockAdjusted {
                            warehouse_id,
                            record_id: record_id_typed,
                            previous_quantity: 100,
                            counted_quantity: 100 + (i % 10) as i64,
                            reason: "cycle count".to_string(),
                            occurred_at: Utc::now(),
                        });
                        let uncommitted = UncommittedEvent::from_typed(
                            warehouse_id,
                            record_id,
                            "inventory.record",
                            uuid::Uuid::now_v7(),
                            &adjusted,
                        )
                        .unwrap();
                        let stored = store
                            .append(
                                vec![uncommitted],
                                stockpilot_core::ExpectedVersion::Exact((i + 1) as u64),
                            )
                            .unwrap();
                        all_envelopes.push(stored[0].to_envelope());
                    }
                }

                let read_model_store: Arc<InMemoryScopedStore<InventoryRecordId, StockReadModel>> =
                    Arc::new(InMemoryScopedStore::new());
                let projection = InventoryStockProjection::new(read_model_store);

                b.iter(|| {
                    projection.rebuild_from_scratch(black_box(all_envelopes.clone())).unwrap();
                });
            },
        );
    }

    group.finish();
}

fn bench_event_sourcing_vs_naive_crud(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_sourcing_vs_naive_crud");
    group.sample_size(1000);

    // Benchmark: Event sourcing (track + adjust)
    group.bench_function("event_sourcing_track_and_adjust", |b| {
        let (dispatcher, warehouse_id, _) = setup_event_sourcing();

        b.iter(|| {
            let record_id = AggregateId::new();
            let record_id_typed = InventoryRecordId::new(record_id);

            dispatcher
                .dispatch(
                    warehouse_id,
                    record_id,
                    "inventory.record",
                    InventoryCommand::TrackProduct(track_cmd(warehouse_id, record_id_typed)),
                    |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
                )
                .unwrap();

            let adjust_cmd = AdjustStock {
                warehouse_id,
                record_id: record_id_typed,
                counted_quantity: 90,
                reason: "cycle count".to_string(),
                occurred_at: Utc::now(),
            };
            dispatcher
                .dispatch(
                    warehouse_id,
                    record_id,
                    "inventory.record",
                    InventoryCommand::AdjustStock(adjust_cmd),
                    |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
                )
                .unwrap();
        });
    });

    // Benchmark: Naive CRUD (track + adjust)
    group.bench_function("naive_crud_track_and_adjust", |b| {
        let store = NaiveCrudStore::new();
        let warehouse_id = WarehouseId::new();
        let record_id = AggregateId::new();

        b.iter(|| {
            store.track(warehouse_id, record_id, "A-01-01".to_string(), 100);
            store.adjust(warehouse_id, record_id, 90).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_command_execution_latency,
    bench_event_append_throughput,
    bench_projection_rebuild_speed,
    bench_event_sourcing_vs_naive_crud
);
criterion_main!(benches);
