//! Infrastructure wiring plus the multi-aggregate orchestration flows.
//!
//! Single-aggregate commands go straight through the dispatcher. Flows that
//! span aggregates (order placement reservations, pipeline stage gates,
//! reship, return restock, audit adjustments) live here: they take the
//! relevant locks, check predecessor state against the read models, and
//! dispatch the command sequence.
//!
//! Committed events are folded into the projections synchronously on the
//! command path, so a gate that runs right after a dispatch sees its own
//! writes. The event bus feeds the realtime stream only.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};

use stockpilot_core::{
    Aggregate, AggregateId, CustomerId, DomainError, NumberGenerator, ProductId, WarehouseId,
};
use stockpilot_events::outbound::topics;
use stockpilot_events::{EventBus, EventEnvelope, InMemoryEventBus, OutboundMessage};
use stockpilot_exceptions::{
    DeliveryException, ExceptionCommand, ExceptionId, ExceptionSeverity, ExceptionType,
    OpenException, Priority, ResolutionType, ResolveException,
};
use stockpilot_fulfillment::{
    AppendTrackingEvent, CreatePackage, CreatePickList, CreateShipment, InspectionChecks,
    InspectionScores, Package, PackageCommand, PackageId, PackageStatus, PickItemSpec, PickList,
    PickListCommand, PickListId, PickListStatus, QualityCheck, QualityCheckCommand,
    QualityCheckId, RecordInspection, Shipment, ShipmentCommand, ShipmentId, StartTracking,
    TrackingLog, TrackingLogCommand, TrackingLogId,
};
use stockpilot_infra::{
    audit::{audit_count, CountAudit, CountLine},
    command_dispatcher::{CommandDispatcher, DispatchError},
    event_store::{InMemoryEventStore, StoredEvent},
    locks::{order_lock_key, product_lock_key, LockRegistry},
    numbers::SequentialNumbers,
    outbound::{InMemoryOutboundQueue, OutboundQueue},
    projections::{
        exceptions::{ExceptionReadModel, ExceptionsProjection},
        inventory_stock::{InventoryStockProjection, StockReadModel},
        orders::{OrderReadModel, OrdersProjection},
        packages::{PackageReadModel, PackagesProjection},
        pick_lists::{PickListReadModel, PickListsProjection},
        quality_checks::{QualityCheckReadModel, QualityChecksProjection},
        reports::{ReportReadModel, ReportsProjection},
        returns::{ReturnReadModel, ReturnsProjection},
        shipments::{ShipmentReadModel, ShipmentsProjection},
        tracking::{TrackingProjection, TrackingReadModel},
    },
    read_model::InMemoryScopedStore,
};
use stockpilot_inventory::{
    AdjustStock, InventoryCommand, InventoryEvent, InventoryRecord, InventoryRecordId,
    ReleaseStock, ReserveStock, ResolveAlert, RestockProduct, SellStock, TrackProduct,
};
use stockpilot_orders::{
    CancelOrder, FulfillmentLink, LinkFulfillment, Order, OrderCommand, OrderId, OrderLine,
    OrderStatus, PlaceOrder, TransitionStatus,
};
use stockpilot_reconciliation::{
    ApproveReport, CompleteReport, MarkDiscrepancyAdjusted, OpenReport, ReconciliationReport,
    RecordDiscrepancy, ReportCommand, ReportId,
};
use stockpilot_returns::{
    CompleteReturn, ItemCondition, RecordRestock, RequestReturn, ReturnCommand, ReturnId,
    ReturnLine, ReturnOrder, ReturnReason,
};

/// Realtime message broadcasted via SSE.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RealtimeMessage {
    pub warehouse_id: WarehouseId,
    pub topic: String,
    pub payload: serde_json::Value,
}

type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;
type SharedBus = Arc<Bus>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, SharedBus>;
type Store<K, V> = Arc<InMemoryScopedStore<K, V>>;

pub struct AppServices {
    dispatcher: Dispatcher,
    event_store: Arc<InMemoryEventStore>,
    locks: Arc<LockRegistry>,
    numbers: Arc<SequentialNumbers>,
    outbound: Arc<InMemoryOutboundQueue>,
    inventory: Arc<InventoryStockProjection<Store<InventoryRecordId, StockReadModel>>>,
    orders: Arc<OrdersProjection<Store<OrderId, OrderReadModel>>>,
    pick_lists: Arc<PickListsProjection<Store<PickListId, PickListReadModel>>>,
    packages: Arc<PackagesProjection<Store<PackageId, PackageReadModel>>>,
    quality_checks: Arc<QualityChecksProjection<Store<QualityCheckId, QualityCheckReadModel>>>,
    shipments: Arc<ShipmentsProjection<Store<ShipmentId, ShipmentReadModel>>>,
    tracking: Arc<TrackingProjection<Store<TrackingLogId, TrackingReadModel>>>,
    exceptions: Arc<ExceptionsProjection<Store<ExceptionId, ExceptionReadModel>>>,
    returns: Arc<ReturnsProjection<Store<ReturnId, ReturnReadModel>>>,
    reports: Arc<ReportsProjection<Store<ReportId, ReportReadModel>>>,
    realtime_tx: broadcast::Sender<RealtimeMessage>,
}

pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let bus: SharedBus = Arc::new(Bus::new());

    let inventory = Arc::new(InventoryStockProjection::new(new_store()));
    let orders = Arc::new(OrdersProjection::new(new_store()));
    let pick_lists = Arc::new(PickListsProjection::new(new_store()));
    let packages = Arc::new(PackagesProjection::new(new_store()));
    let quality_checks = Arc::new(QualityChecksProjection::new(new_store()));
    let shipments = Arc::new(ShipmentsProjection::new(new_store()));
    let tracking = Arc::new(TrackingProjection::new(new_store()));
    let exceptions = Arc::new(ExceptionsProjection::new(new_store()));
    let returns = Arc::new(ReturnsProjection::new(new_store()));
    let reports = Arc::new(ReportsProjection::new(new_store()));

    // Realtime channel (SSE): lossy broadcast, warehouse-filtered in handlers.
    let (realtime_tx, _realtime_rx) = broadcast::channel::<RealtimeMessage>(256);

    // Background subscriber: bus -> realtime stream. Projections are updated
    // on the command path, so consumers here only observe.
    {
        let sub = bus.subscribe();
        let realtime_tx = realtime_tx.clone();
        tokio::task::spawn_blocking(move || loop {
            match sub.recv() {
                Ok(env) => {
                    let _ = realtime_tx.send(RealtimeMessage {
                        warehouse_id: env.warehouse_id(),
                        topic: format!("{}.projection_updated", env.aggregate_type()),
                        payload: serde_json::json!({
                            "kind": "projection_update",
                            "aggregate_type": env.aggregate_type(),
                            "aggregate_id": env.aggregate_id().to_string(),
                            "sequence_number": env.sequence_number(),
                        }),
                    });
                }
                Err(_) => break,
            }
        });
    }

    let dispatcher = CommandDispatcher::new(store.clone(), bus);
    AppServices {
        dispatcher,
        event_store: store,
        locks: Arc::new(LockRegistry::with_default_timeout()),
        numbers: Arc::new(SequentialNumbers::new()),
        outbound: Arc::new(InMemoryOutboundQueue::new()),
        inventory,
        orders,
        pick_lists,
        packages,
        quality_checks,
        shipments,
        tracking,
        exceptions,
        returns,
        reports,
        realtime_tx,
    }
}

fn new_store<K, V>() -> Store<K, V> {
    Arc::new(InMemoryScopedStore::new())
}

impl AppServices {
    pub fn realtime_tx(&self) -> &broadcast::Sender<RealtimeMessage> {
        &self.realtime_tx
    }

    pub fn outbound(&self) -> &Arc<InMemoryOutboundQueue> {
        &self.outbound
    }

    pub fn event_store(&self) -> &Arc<InMemoryEventStore> {
        &self.event_store
    }

    /// Dispatch one command and fold the committed events into the read side.
    fn dispatch<A>(
        &self,
        warehouse_id: WarehouseId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        command: A::Command,
        make_aggregate: impl FnOnce(WarehouseId, AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: stockpilot_events::Event + serde::Serialize + serde::de::DeserializeOwned,
    {
        let committed = self.dispatcher.dispatch::<A>(
            warehouse_id,
            aggregate_id,
            aggregate_type,
            command,
            make_aggregate,
        )?;
        self.apply_committed(&committed);
        Ok(committed)
    }

    fn apply_committed(&self, committed: &[StoredEvent]) {
        for stored in committed {
            let env = stored.to_envelope();
            let result = match stored.aggregate_type.as_str() {
                "inventory.record" => self.inventory.apply_envelope(&env),
                "orders.order" => self.orders.apply_envelope(&env),
                "fulfillment.pick_list" => self.pick_lists.apply_envelope(&env),
                "fulfillment.package" => self.packages.apply_envelope(&env),
                "fulfillment.quality_check" => self.quality_checks.apply_envelope(&env),
                "fulfillment.shipment" => self.shipments.apply_envelope(&env),
                "fulfillment.tracking_log" => self.tracking.apply_envelope(&env),
                "exceptions.exception" => self.exceptions.apply_envelope(&env),
                "returns.return" => self.returns.apply_envelope(&env),
                "reconciliation.report" => self.reports.apply_envelope(&env),
                _ => Ok(()),
            };
            if let Err(e) = result {
                tracing::warn!(
                    aggregate_type = %stored.aggregate_type,
                    sequence_number = stored.sequence_number,
                    error = %e,
                    "projection apply failed"
                );
            }
        }
    }

    fn enqueue_outbound(&self, warehouse_id: WarehouseId, topic: &str, payload: JsonValue) {
        self.outbound
            .enqueue(OutboundMessage::new(warehouse_id, topic, payload, Utc::now()));
    }

    // ----- inventory -----

    pub fn inventory_get(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Option<StockReadModel> {
        let record_id = self.inventory.record_for_product(warehouse_id, product_id)?;
        self.inventory.get(warehouse_id, &record_id)
    }

    pub fn inventory_list(&self, warehouse_id: WarehouseId) -> Vec<StockReadModel> {
        self.inventory.list(warehouse_id)
    }

    pub fn inventory_alerts(&self, warehouse_id: WarehouseId) -> Vec<StockReadModel> {
        self.inventory.list_alerting(warehouse_id)
    }

    pub fn track_product(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        location: String,
        initial_stock: i64,
        minimum_stock_level: i64,
        maximum_stock_level: i64,
        reorder_point: i64,
        unit_cost: f64,
    ) -> Result<InventoryRecordId, DispatchError> {
        if self.inventory.record_for_product(warehouse_id, product_id).is_some() {
            return Err(DispatchError::Concurrency(
                "product is already tracked in this warehouse".to_string(),
            ));
        }
        let record_id = InventoryRecordId::new(AggregateId::new());
        let _guard = self
            .locks
            .acquire(warehouse_id, product_lock_key(product_id))?;
        self.dispatch_inventory(
            warehouse_id,
            record_id,
            InventoryCommand::TrackProduct(TrackProduct {
                warehouse_id,
                record_id,
                product_id,
                location,
                initial_stock,
                minimum_stock_level,
                maximum_stock_level,
                reorder_point,
                unit_cost,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(record_id)
    }

    pub fn adjust_stock_by_product(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        counted_quantity: i64,
        reason: String,
    ) -> Result<(), DispatchError> {
        let record_id = self.record_for(warehouse_id, product_id)?;
        let _guard = self
            .locks
            .acquire(warehouse_id, product_lock_key(product_id))?;
        self.dispatch_inventory(
            warehouse_id,
            record_id,
            InventoryCommand::AdjustStock(AdjustStock {
                warehouse_id,
                record_id,
                counted_quantity,
                reason,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    pub fn stock_operation(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        op: StockOperation,
        quantity: i64,
    ) -> Result<(), DispatchError> {
        let record_id = self.record_for(warehouse_id, product_id)?;
        let _guard = self
            .locks
            .acquire(warehouse_id, product_lock_key(product_id))?;
        let occurred_at = Utc::now();
        let command = match op {
            StockOperation::Reserve => InventoryCommand::ReserveStock(ReserveStock {
                warehouse_id,
                record_id,
                quantity,
                occurred_at,
            }),
            StockOperation::Release => InventoryCommand::ReleaseStock(ReleaseStock {
                warehouse_id,
                record_id,
                quantity,
                occurred_at,
            }),
            StockOperation::Sell => InventoryCommand::SellStock(SellStock {
                warehouse_id,
                record_id,
                quantity,
                occurred_at,
            }),
            StockOperation::Restock => InventoryCommand::RestockProduct(RestockProduct {
                warehouse_id,
                record_id,
                quantity,
                occurred_at,
            }),
        };
        self.dispatch_inventory(warehouse_id, record_id, command)?;
        Ok(())
    }

    pub fn resolve_alert(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
        alert_type: stockpilot_inventory::AlertType,
    ) -> Result<(), DispatchError> {
        let record_id = self.record_for(warehouse_id, product_id)?;
        let _guard = self
            .locks
            .acquire(warehouse_id, product_lock_key(product_id))?;
        self.dispatch_inventory(
            warehouse_id,
            record_id,
            InventoryCommand::ResolveAlert(ResolveAlert {
                warehouse_id,
                record_id,
                alert_type,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    fn record_for(
        &self,
        warehouse_id: WarehouseId,
        product_id: ProductId,
    ) -> Result<InventoryRecordId, DispatchError> {
        self.inventory
            .record_for_product(warehouse_id, product_id)
            .ok_or(DispatchError::NotFound)
    }

    /// Inventory dispatch with alert fan-out: a raised alert becomes an
    /// outbound notification.
    fn dispatch_inventory(
        &self,
        warehouse_id: WarehouseId,
        record_id: InventoryRecordId,
        command: InventoryCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        let committed = self.dispatch::<InventoryRecord>(
            warehouse_id,
            record_id.0,
            "inventory.record",
            command,
            |_, id| InventoryRecord::empty(InventoryRecordId::new(id)),
        )?;
        for stored in &committed {
            if let Ok(InventoryEvent::StockAlertRaised(e)) =
                serde_json::from_value::<InventoryEvent>(stored.payload.clone())
            {
                self.enqueue_outbound(
                    warehouse_id,
                    topics::ALERT_NOTIFICATIONS,
                    serde_json::json!({
                        "record_id": e.record_id.to_string(),
                        "alert_type": e.alert_type,
                        "status": e.status,
                        "current_stock": e.current_stock,
                    }),
                );
            }
        }
        Ok(committed)
    }

    // ----- orders -----

    pub fn order_get(&self, warehouse_id: WarehouseId, order_id: OrderId) -> Option<OrderReadModel> {
        self.orders.get(warehouse_id, &order_id)
    }

    pub fn orders_list(&self, warehouse_id: WarehouseId) -> Vec<OrderReadModel> {
        self.orders.list(warehouse_id)
    }

    pub fn orders_by_status(
        &self,
        warehouse_id: WarehouseId,
        status: OrderStatus,
    ) -> Vec<OrderReadModel> {
        self.orders.list_by_status(warehouse_id, status)
    }

    /// Place an order: reserve every line, then commit the order.
    ///
    /// All-or-nothing: a failed reservation releases what was already taken
    /// and the placement fails. Locks are taken order-first, then products in
    /// canonical key order.
    pub fn place_order(
        &self,
        warehouse_id: WarehouseId,
        customer_id: CustomerId,
        lines: Vec<OrderLine>,
        notes: String,
    ) -> Result<(OrderId, String), DispatchError> {
        if lines.is_empty() {
            return Err(DispatchError::Validation(
                "order must have at least one line".to_string(),
            ));
        }

        // Resolve every product up front so we fail before reserving anything.
        let mut records = Vec::with_capacity(lines.len());
        for line in &lines {
            records.push((self.record_for(warehouse_id, line.product_id)?, line.clone()));
        }

        let order_id = OrderId::new(AggregateId::new());
        let mut keys = vec![order_lock_key(order_id)];
        keys.extend(lines.iter().map(|l| product_lock_key(l.product_id)));
        let _guard = self.locks.acquire_many(warehouse_id, keys)?;

        let occurred_at = Utc::now();
        let mut reserved: Vec<(InventoryRecordId, i64)> = Vec::new();
        for (record_id, line) in &records {
            let result = self.dispatch_inventory(
                warehouse_id,
                *record_id,
                InventoryCommand::ReserveStock(ReserveStock {
                    warehouse_id,
                    record_id: *record_id,
                    quantity: line.quantity,
                    occurred_at,
                }),
            );
            match result {
                Ok(_) => reserved.push((*record_id, line.quantity)),
                Err(e) => {
                    self.release_reservations(warehouse_id, &reserved);
                    return Err(e);
                }
            }
        }

        let order_number = self.numbers.next("ORD");
        let place = OrderCommand::PlaceOrder(PlaceOrder {
            warehouse_id,
            order_id,
            order_number: order_number.clone(),
            customer_id,
            lines,
            notes,
            occurred_at,
        });
        if let Err(e) = self.dispatch_order(warehouse_id, order_id, place) {
            self.release_reservations(warehouse_id, &reserved);
            return Err(e);
        }

        self.enqueue_outbound(
            warehouse_id,
            topics::ORDER_NOTIFICATIONS,
            serde_json::json!({
                "order_id": order_id.to_string(),
                "order_number": order_number,
                "event": "placed",
            }),
        );
        Ok((order_id, order_number))
    }

    fn release_reservations(&self, warehouse_id: WarehouseId, reserved: &[(InventoryRecordId, i64)]) {
        for (record_id, quantity) in reserved {
            let release = InventoryCommand::ReleaseStock(ReleaseStock {
                warehouse_id,
                record_id: *record_id,
                quantity: *quantity,
                occurred_at: Utc::now(),
            });
            if let Err(e) = self.dispatch_inventory(warehouse_id, *record_id, release) {
                tracing::warn!(record_id = %record_id, error = ?e, "compensating release failed");
            }
        }
    }

    pub fn transition_order(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        next: OrderStatus,
    ) -> Result<(), DispatchError> {
        let _guard = self.locks.acquire(warehouse_id, order_lock_key(order_id))?;
        self.dispatch_order(
            warehouse_id,
            order_id,
            OrderCommand::TransitionStatus(TransitionStatus {
                warehouse_id,
                order_id,
                next,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Cancel an order and release every line reservation.
    pub fn cancel_order(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        reason: String,
    ) -> Result<(), DispatchError> {
        let rm = self
            .orders
            .get(warehouse_id, &order_id)
            .ok_or(DispatchError::NotFound)?;

        let mut keys = vec![order_lock_key(order_id)];
        keys.extend(rm.lines.iter().map(|l| product_lock_key(l.product_id)));
        let _guard = self.locks.acquire_many(warehouse_id, keys)?;

        self.dispatch_order(
            warehouse_id,
            order_id,
            OrderCommand::CancelOrder(CancelOrder {
                warehouse_id,
                order_id,
                reason: reason.clone(),
                occurred_at: Utc::now(),
            }),
        )?;

        let reservations: Vec<(InventoryRecordId, i64)> = rm
            .lines
            .iter()
            .filter_map(|l| {
                self.inventory
                    .record_for_product(warehouse_id, l.product_id)
                    .map(|r| (r, l.quantity))
            })
            .collect();
        self.release_reservations(warehouse_id, &reservations);

        self.enqueue_outbound(
            warehouse_id,
            topics::ORDER_NOTIFICATIONS,
            serde_json::json!({
                "order_id": order_id.to_string(),
                "order_number": rm.order_number,
                "event": "cancelled",
                "reason": reason,
            }),
        );
        Ok(())
    }

    fn dispatch_order(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        command: OrderCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<Order>(warehouse_id, order_id.0, "orders.order", command, |_, id| {
            Order::empty(OrderId::new(id))
        })
    }

    // ----- fulfillment: picking -----

    pub fn pick_list_get(
        &self,
        warehouse_id: WarehouseId,
        pick_list_id: PickListId,
    ) -> Option<PickListReadModel> {
        self.pick_lists.get(warehouse_id, &pick_list_id)
    }

    /// Stage gate: pick lists are cut from confirmed orders, one per order.
    pub fn create_pick_list(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
    ) -> Result<(PickListId, String), DispatchError> {
        let order = self
            .orders
            .get(warehouse_id, &order_id)
            .ok_or(DispatchError::NotFound)?;
        if !matches!(order.status, OrderStatus::Confirmed | OrderStatus::Processing) {
            return Err(DispatchError::IllegalTransition {
                from: order.status.as_str().to_string(),
                to: "picking".to_string(),
            });
        }
        if self.pick_lists.for_order(warehouse_id, order_id).is_some() {
            return Err(DispatchError::Concurrency(
                "order already has a pick list".to_string(),
            ));
        }

        let mut items = Vec::with_capacity(order.lines.len());
        for line in &order.lines {
            let record_id = self.record_for(warehouse_id, line.product_id)?;
            let location = self
                .inventory
                .get(warehouse_id, &record_id)
                .map(|r| r.location)
                .unwrap_or_default();
            items.push(PickItemSpec {
                product_id: line.product_id,
                location,
                quantity: line.quantity,
            });
        }

        let pick_list_id = PickListId::new(AggregateId::new());
        let pick_list_number = self.numbers.next("PL");
        let _guard = self.locks.acquire(warehouse_id, order_lock_key(order_id))?;
        self.dispatch_pick_list(
            warehouse_id,
            pick_list_id,
            PickListCommand::CreatePickList(CreatePickList {
                warehouse_id,
                pick_list_id,
                pick_list_number: pick_list_number.clone(),
                order_id,
                items,
                occurred_at: Utc::now(),
            }),
        )?;
        self.dispatch_order(
            warehouse_id,
            order_id,
            OrderCommand::LinkFulfillment(LinkFulfillment {
                warehouse_id,
                order_id,
                link: FulfillmentLink::PickList(pick_list_id.0),
                occurred_at: Utc::now(),
            }),
        )?;
        Ok((pick_list_id, pick_list_number))
    }

    pub fn dispatch_pick_list(
        &self,
        warehouse_id: WarehouseId,
        pick_list_id: PickListId,
        command: PickListCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<PickList>(
            warehouse_id,
            pick_list_id.0,
            "fulfillment.pick_list",
            command,
            |_, id| PickList::empty(PickListId::new(id)),
        )
    }

    // ----- fulfillment: packing -----

    pub fn package_get(
        &self,
        warehouse_id: WarehouseId,
        package_id: PackageId,
    ) -> Option<PackageReadModel> {
        self.packages.get(warehouse_id, &package_id)
    }

    /// Stage gate: packing starts only after the pick list is completed.
    pub fn create_package(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        pick_list_id: PickListId,
        dimensions: String,
    ) -> Result<(PackageId, String), DispatchError> {
        let pick_list = self
            .pick_lists
            .get(warehouse_id, &pick_list_id)
            .ok_or(DispatchError::NotFound)?;
        if pick_list.order_id != order_id {
            return Err(DispatchError::Validation(
                "pick list does not belong to this order".to_string(),
            ));
        }
        if pick_list.status != PickListStatus::Completed {
            return Err(DispatchError::IllegalTransition {
                from: pick_list.status.as_str().to_string(),
                to: "packing".to_string(),
            });
        }

        let package_id = PackageId::new(AggregateId::new());
        let package_number = self.numbers.next("PKG");
        self.dispatch_package(
            warehouse_id,
            package_id,
            PackageCommand::CreatePackage(CreatePackage {
                warehouse_id,
                package_id,
                package_number: package_number.clone(),
                order_id,
                pick_list_id,
                dimensions,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok((package_id, package_number))
    }

    pub fn dispatch_package(
        &self,
        warehouse_id: WarehouseId,
        package_id: PackageId,
        command: PackageCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<Package>(
            warehouse_id,
            package_id.0,
            "fulfillment.package",
            command,
            |_, id| Package::empty(PackageId::new(id)),
        )
    }

    // ----- fulfillment: quality -----

    pub fn quality_check_get(
        &self,
        warehouse_id: WarehouseId,
        quality_check_id: QualityCheckId,
    ) -> Option<QualityCheckReadModel> {
        self.quality_checks.get(warehouse_id, &quality_check_id)
    }

    /// Stage gate: inspections run against packed packages.
    pub fn record_inspection(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        package_id: PackageId,
        inspector: String,
        scores: InspectionScores,
        checks: InspectionChecks,
        recheck_required: bool,
    ) -> Result<QualityCheckId, DispatchError> {
        let package = self
            .packages
            .get(warehouse_id, &package_id)
            .ok_or(DispatchError::NotFound)?;
        if package.order_id != order_id {
            return Err(DispatchError::Validation(
                "package does not belong to this order".to_string(),
            ));
        }
        if package.status != PackageStatus::Packed {
            return Err(DispatchError::IllegalTransition {
                from: package.status.as_str().to_string(),
                to: "quality_check".to_string(),
            });
        }

        // One check stream per package: a recheck targets the existing
        // aggregate, whose own guard rejects re-inspection once approved.
        let quality_check_id = match self.quality_checks.for_package(warehouse_id, package_id) {
            Some(existing) => existing.quality_check_id,
            None => QualityCheckId::new(AggregateId::new()),
        };
        self.dispatch::<QualityCheck>(
            warehouse_id,
            quality_check_id.0,
            "fulfillment.quality_check",
            QualityCheckCommand::RecordInspection(RecordInspection {
                warehouse_id,
                quality_check_id,
                order_id,
                package_id,
                inspector,
                scores,
                checks,
                recheck_required,
                occurred_at: Utc::now(),
            }),
            |_, id| QualityCheck::empty(QualityCheckId::new(id)),
        )?;
        Ok(quality_check_id)
    }

    // ----- fulfillment: shipments + tracking -----

    pub fn shipment_get(
        &self,
        warehouse_id: WarehouseId,
        shipment_id: ShipmentId,
    ) -> Option<ShipmentReadModel> {
        self.shipments.get(warehouse_id, &shipment_id)
    }

    /// Stage gates: packed package, approved quality check, unique tracking
    /// number. Also starts the tracking log and links the order.
    pub fn create_shipment(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        package_id: PackageId,
        tracking_number: String,
        carrier: String,
    ) -> Result<(ShipmentId, String), DispatchError> {
        let package = self
            .packages
            .get(warehouse_id, &package_id)
            .ok_or(DispatchError::NotFound)?;
        if package.order_id != order_id {
            return Err(DispatchError::Validation(
                "package does not belong to this order".to_string(),
            ));
        }
        if package.status != PackageStatus::Packed {
            return Err(DispatchError::IllegalTransition {
                from: package.status.as_str().to_string(),
                to: "shipment".to_string(),
            });
        }
        let quality = self
            .quality_checks
            .for_order(warehouse_id, order_id)
            .ok_or_else(|| {
                DispatchError::Validation("order has no quality check on record".to_string())
            })?;
        if !quality.approved_for_shipment {
            return Err(DispatchError::InvariantViolation(
                "quality check did not approve this order for shipment".to_string(),
            ));
        }

        self.start_shipment(warehouse_id, order_id, package_id, tracking_number, carrier)
    }

    /// Shared by shipment creation and reship: uniqueness gate + shipment +
    /// tracking log + order link + carrier handoff message.
    fn start_shipment(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        package_id: PackageId,
        tracking_number: String,
        carrier: String,
    ) -> Result<(ShipmentId, String), DispatchError> {
        let _guard = self
            .locks
            .acquire(warehouse_id, format!("tracking:{tracking_number}"))?;
        if self
            .shipments
            .for_tracking_number(warehouse_id, &tracking_number)
            .is_some()
        {
            return Err(DispatchError::Concurrency(format!(
                "tracking number {tracking_number} is already in use"
            )));
        }

        let shipment_id = ShipmentId::new(AggregateId::new());
        let shipment_number = self.numbers.next("SHP");
        let occurred_at = Utc::now();
        self.dispatch_shipment(
            warehouse_id,
            shipment_id,
            ShipmentCommand::CreateShipment(CreateShipment {
                warehouse_id,
                shipment_id,
                shipment_number: shipment_number.clone(),
                order_id,
                package_id,
                tracking_number: tracking_number.clone(),
                carrier: carrier.clone(),
                occurred_at,
            }),
        )?;

        let tracking_log_id = TrackingLogId::new(AggregateId::new());
        self.dispatch_tracking(
            warehouse_id,
            tracking_log_id,
            TrackingLogCommand::StartTracking(StartTracking {
                warehouse_id,
                tracking_log_id,
                tracking_number: tracking_number.clone(),
                shipment_id,
                occurred_at,
            }),
        )?;

        self.dispatch_order(
            warehouse_id,
            order_id,
            OrderCommand::LinkFulfillment(LinkFulfillment {
                warehouse_id,
                order_id,
                link: FulfillmentLink::Shipment(shipment_id.0),
                occurred_at,
            }),
        )?;
        self.dispatch_order(
            warehouse_id,
            order_id,
            OrderCommand::LinkFulfillment(LinkFulfillment {
                warehouse_id,
                order_id,
                link: FulfillmentLink::TrackingNumber(tracking_number.clone()),
                occurred_at,
            }),
        )?;

        self.enqueue_outbound(
            warehouse_id,
            topics::CARRIER_SHIPMENTS,
            serde_json::json!({
                "shipment_id": shipment_id.to_string(),
                "shipment_number": shipment_number,
                "tracking_number": tracking_number,
                "carrier": carrier,
            }),
        );
        Ok((shipment_id, shipment_number))
    }

    pub fn dispatch_shipment(
        &self,
        warehouse_id: WarehouseId,
        shipment_id: ShipmentId,
        command: ShipmentCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<Shipment>(
            warehouse_id,
            shipment_id.0,
            "fulfillment.shipment",
            command,
            |_, id| Shipment::empty(ShipmentId::new(id)),
        )
    }

    pub fn tracking_for_number(
        &self,
        warehouse_id: WarehouseId,
        tracking_number: &str,
    ) -> Option<TrackingReadModel> {
        self.tracking.for_tracking_number(warehouse_id, tracking_number)
    }

    pub fn append_tracking_event(
        &self,
        warehouse_id: WarehouseId,
        tracking_number: &str,
        event_type: String,
        description: String,
        location: String,
        event_time: DateTime<Utc>,
    ) -> Result<(), DispatchError> {
        let log = self
            .tracking
            .for_tracking_number(warehouse_id, tracking_number)
            .ok_or(DispatchError::NotFound)?;
        self.dispatch_tracking(
            warehouse_id,
            log.tracking_log_id,
            TrackingLogCommand::AppendTrackingEvent(AppendTrackingEvent {
                warehouse_id,
                tracking_log_id: log.tracking_log_id,
                event_type,
                description,
                location,
                event_time,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    fn dispatch_tracking(
        &self,
        warehouse_id: WarehouseId,
        tracking_log_id: TrackingLogId,
        command: TrackingLogCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<TrackingLog>(
            warehouse_id,
            tracking_log_id.0,
            "fulfillment.tracking_log",
            command,
            |_, id| TrackingLog::empty(TrackingLogId::new(id)),
        )
    }

    // ----- exceptions -----

    pub fn exception_get(
        &self,
        warehouse_id: WarehouseId,
        exception_id: ExceptionId,
    ) -> Option<ExceptionReadModel> {
        self.exceptions.get(warehouse_id, &exception_id)
    }

    pub fn exceptions_list(&self, warehouse_id: WarehouseId) -> Vec<ExceptionReadModel> {
        self.exceptions.list(warehouse_id)
    }

    /// One unresolved exception per tracking number; the order is resolved
    /// from the shipment behind the tracking number.
    pub fn open_exception(
        &self,
        warehouse_id: WarehouseId,
        tracking_number: String,
        exception_type: ExceptionType,
        severity: ExceptionSeverity,
        priority: Priority,
        description: String,
    ) -> Result<(ExceptionId, String), DispatchError> {
        let _guard = self
            .locks
            .acquire(warehouse_id, format!("tracking:{tracking_number}"))?;

        let shipment_id = self
            .shipments
            .for_tracking_number(warehouse_id, &tracking_number)
            .ok_or(DispatchError::NotFound)?;
        let shipment = self
            .shipments
            .get(warehouse_id, &shipment_id)
            .ok_or(DispatchError::NotFound)?;
        if self
            .exceptions
            .open_for_tracking_number(warehouse_id, &tracking_number)
            .is_some()
        {
            return Err(DispatchError::Concurrency(format!(
                "tracking number {tracking_number} already has an unresolved exception"
            )));
        }

        let exception_id = ExceptionId::new(AggregateId::new());
        let exception_number = self.numbers.next("EXC");
        self.dispatch_exception(
            warehouse_id,
            exception_id,
            ExceptionCommand::OpenException(OpenException {
                warehouse_id,
                exception_id,
                exception_number: exception_number.clone(),
                tracking_number,
                order_id: shipment.order_id,
                exception_type,
                severity,
                priority,
                description,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok((exception_id, exception_number))
    }

    /// Resolution side effects: `Reship` re-enters the pipeline with the
    /// replacement tracking number; `Refund` fails the order and hands the
    /// case to finance.
    pub fn resolve_exception(
        &self,
        warehouse_id: WarehouseId,
        exception_id: ExceptionId,
        resolution_type: ResolutionType,
        notes: String,
        replacement_tracking_number: Option<String>,
    ) -> Result<(), DispatchError> {
        let rm = self
            .exceptions
            .get(warehouse_id, &exception_id)
            .ok_or(DispatchError::NotFound)?;

        self.dispatch_exception(
            warehouse_id,
            exception_id,
            ExceptionCommand::ResolveException(ResolveException {
                warehouse_id,
                exception_id,
                resolution_type,
                notes,
                replacement_tracking_number: replacement_tracking_number.clone(),
                occurred_at: Utc::now(),
            }),
        )?;

        match resolution_type {
            ResolutionType::Reship => {
                // Validated by the aggregate: Reship always carries one.
                if let Some(replacement) = replacement_tracking_number {
                    let shipment_id = self
                        .shipments
                        .for_tracking_number(warehouse_id, &rm.tracking_number)
                        .ok_or(DispatchError::NotFound)?;
                    let shipment = self
                        .shipments
                        .get(warehouse_id, &shipment_id)
                        .ok_or(DispatchError::NotFound)?;
                    self.start_shipment(
                        warehouse_id,
                        shipment.order_id,
                        shipment.package_id,
                        replacement,
                        shipment.carrier,
                    )?;
                }
            }
            ResolutionType::Refund => {
                self.transition_order(warehouse_id, rm.order_id, OrderStatus::Failed)?;
                self.enqueue_outbound(
                    warehouse_id,
                    topics::FINANCE_REFUNDS,
                    serde_json::json!({
                        "order_id": rm.order_id.to_string(),
                        "exception_number": rm.exception_number,
                        "reason": "delivery_exception",
                    }),
                );
            }
            _ => {}
        }
        Ok(())
    }

    pub fn dispatch_exception(
        &self,
        warehouse_id: WarehouseId,
        exception_id: ExceptionId,
        command: ExceptionCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<DeliveryException>(
            warehouse_id,
            exception_id.0,
            "exceptions.exception",
            command,
            |_, id| DeliveryException::empty(ExceptionId::new(id)),
        )
    }

    // ----- returns -----

    pub fn return_get(&self, warehouse_id: WarehouseId, return_id: ReturnId) -> Option<ReturnReadModel> {
        self.returns.get(warehouse_id, &return_id)
    }

    pub fn returns_list(&self, warehouse_id: WarehouseId) -> Vec<ReturnReadModel> {
        self.returns.list(warehouse_id)
    }

    /// One active return per order.
    pub fn request_return(
        &self,
        warehouse_id: WarehouseId,
        order_id: OrderId,
        reason: ReturnReason,
        lines: Vec<ReturnLine>,
    ) -> Result<(ReturnId, String), DispatchError> {
        let _guard = self.locks.acquire(warehouse_id, order_lock_key(order_id))?;
        if self.orders.get(warehouse_id, &order_id).is_none() {
            return Err(DispatchError::NotFound);
        }
        if self.returns.active_for_order(warehouse_id, order_id).is_some() {
            return Err(DispatchError::Concurrency(
                "order already has an active return".to_string(),
            ));
        }

        let return_id = ReturnId::new(AggregateId::new());
        let return_number = self.numbers.next("RET");
        self.dispatch_return(
            warehouse_id,
            return_id,
            ReturnCommand::RequestReturn(RequestReturn {
                warehouse_id,
                return_id,
                return_number: return_number.clone(),
                order_id,
                reason,
                lines,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok((return_id, return_number))
    }

    /// Sellable returned units go back into the inventory record.
    pub fn record_return_restock(
        &self,
        warehouse_id: WarehouseId,
        return_id: ReturnId,
        product_id: ProductId,
        quantity: i64,
        condition: ItemCondition,
    ) -> Result<(), DispatchError> {
        self.dispatch_return(
            warehouse_id,
            return_id,
            ReturnCommand::RecordRestock(RecordRestock {
                warehouse_id,
                return_id,
                product_id,
                quantity,
                condition,
                occurred_at: Utc::now(),
            }),
        )?;

        if condition.is_sellable() {
            let record_id = self.record_for(warehouse_id, product_id)?;
            let _guard = self
                .locks
                .acquire(warehouse_id, product_lock_key(product_id))?;
            self.dispatch_inventory(
                warehouse_id,
                record_id,
                InventoryCommand::RestockProduct(RestockProduct {
                    warehouse_id,
                    record_id,
                    quantity,
                    occurred_at: Utc::now(),
                }),
            )?;
        }
        Ok(())
    }

    /// Completion hands the refund to finance.
    pub fn complete_return(
        &self,
        warehouse_id: WarehouseId,
        return_id: ReturnId,
    ) -> Result<(), DispatchError> {
        self.dispatch_return(
            warehouse_id,
            return_id,
            ReturnCommand::CompleteReturn(CompleteReturn {
                warehouse_id,
                return_id,
                occurred_at: Utc::now(),
            }),
        )?;

        if let Some(rm) = self.returns.get(warehouse_id, &return_id) {
            self.enqueue_outbound(
                warehouse_id,
                topics::FINANCE_REFUNDS,
                serde_json::json!({
                    "return_id": return_id.to_string(),
                    "return_number": rm.return_number,
                    "order_id": rm.order_id.to_string(),
                    "total_refund": rm.total_refund,
                }),
            );
        }
        Ok(())
    }

    pub fn dispatch_return(
        &self,
        warehouse_id: WarehouseId,
        return_id: ReturnId,
        command: ReturnCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<ReturnOrder>(
            warehouse_id,
            return_id.0,
            "returns.return",
            command,
            |_, id| ReturnOrder::empty(ReturnId::new(id)),
        )
    }

    // ----- reconciliation -----

    pub fn report_get(&self, warehouse_id: WarehouseId, report_id: ReportId) -> Option<ReportReadModel> {
        self.reports.get(warehouse_id, &report_id)
    }

    pub fn reports_list(&self, warehouse_id: WarehouseId) -> Vec<ReportReadModel> {
        self.reports.list(warehouse_id)
    }

    /// Run a physical-count audit: open a report and record one discrepancy
    /// per counted line that disagrees with the books. Product locks are held
    /// for the duration so the book figures cannot move mid-audit.
    pub fn run_audit(
        &self,
        warehouse_id: WarehouseId,
        counted_by: String,
        lines: Vec<CountLine>,
    ) -> Result<(ReportId, String, CountAudit), DispatchError> {
        let keys = lines.iter().map(|l| product_lock_key(l.product_id)).collect();
        let _guard = self.locks.acquire_many(warehouse_id, keys)?;

        let audit = audit_count(&self.inventory, warehouse_id, &lines)?;

        let report_id = ReportId::new(AggregateId::new());
        let report_number = self.numbers.next("RPT");
        let occurred_at = Utc::now();
        self.dispatch_report(
            warehouse_id,
            report_id,
            ReportCommand::OpenReport(OpenReport {
                warehouse_id,
                report_id,
                report_number: report_number.clone(),
                counted_by,
                occurred_at,
            }),
        )?;
        for input in &audit.discrepancies {
            self.dispatch_report(
                warehouse_id,
                report_id,
                ReportCommand::RecordDiscrepancy(RecordDiscrepancy {
                    warehouse_id,
                    report_id,
                    product_id: input.product_id,
                    location: input.location.clone(),
                    expected_quantity: input.expected_quantity,
                    counted_quantity: input.counted_quantity,
                    unit_cost: input.unit_cost,
                    occurred_at,
                }),
            )?;
        }
        Ok((report_id, report_number, audit))
    }

    pub fn complete_report(
        &self,
        warehouse_id: WarehouseId,
        report_id: ReportId,
        total_expected_quantity: i64,
    ) -> Result<(), DispatchError> {
        self.dispatch_report(
            warehouse_id,
            report_id,
            ReportCommand::CompleteReport(CompleteReport {
                warehouse_id,
                report_id,
                total_expected_quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        Ok(())
    }

    /// Approval corrects the books: every discrepancy becomes a stock
    /// adjustment and is marked adjusted on the report.
    pub fn approve_report(
        &self,
        warehouse_id: WarehouseId,
        report_id: ReportId,
        approved_by: String,
    ) -> Result<(), DispatchError> {
        self.dispatch_report(
            warehouse_id,
            report_id,
            ReportCommand::ApproveReport(ApproveReport {
                warehouse_id,
                report_id,
                approved_by,
                occurred_at: Utc::now(),
            }),
        )?;

        let rm = self
            .reports
            .get(warehouse_id, &report_id)
            .ok_or(DispatchError::NotFound)?;
        for d in rm.discrepancies.iter().filter(|d| !d.adjusted) {
            let record_id = self.record_for(warehouse_id, d.product_id)?;
            let _guard = self
                .locks
                .acquire(warehouse_id, product_lock_key(d.product_id))?;
            self.dispatch_inventory(
                warehouse_id,
                record_id,
                InventoryCommand::AdjustStock(AdjustStock {
                    warehouse_id,
                    record_id,
                    counted_quantity: d.counted_quantity,
                    reason: format!("reconciliation {}", rm.report_number),
                    occurred_at: Utc::now(),
                }),
            )?;
            self.dispatch_report(
                warehouse_id,
                report_id,
                ReportCommand::MarkDiscrepancyAdjusted(MarkDiscrepancyAdjusted {
                    warehouse_id,
                    report_id,
                    product_id: d.product_id,
                    location: d.location.clone(),
                    occurred_at: Utc::now(),
                }),
            )?;
        }
        Ok(())
    }

    fn dispatch_report(
        &self,
        warehouse_id: WarehouseId,
        report_id: ReportId,
        command: ReportCommand,
    ) -> Result<Vec<StoredEvent>, DispatchError> {
        self.dispatch::<ReconciliationReport>(
            warehouse_id,
            report_id.0,
            "reconciliation.report",
            command,
            |_, id| ReconciliationReport::empty(ReportId::new(id)),
        )
    }
}

/// Stock mutation kinds shared by the product-scoped inventory routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockOperation {
    Reserve,
    Release,
    Sell,
    Restock,
}

/// Build an SSE stream for a warehouse (used by `/stream`).
pub fn warehouse_sse_stream(
    services: Arc<AppServices>,
    warehouse_id: WarehouseId,
) -> Sse<impl tokio_stream::Stream<Item = Result<SseEvent, Infallible>>> {
    let rx = services.realtime_tx().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(move |msg| match msg {
        Ok(m) if m.warehouse_id == warehouse_id => {
            let data = serde_json::to_string(&m.payload).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(SseEvent::default().event(m.topic).data(data)))
        }
        _ => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
