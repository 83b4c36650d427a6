use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ProductId, WarehouseId};
use stockpilot_events::Event;

/// Inventory record identifier (one record per product per warehouse).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InventoryRecordId(pub AggregateId);

impl InventoryRecordId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for InventoryRecordId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Derived stock status.
///
/// Recomputed after every mutation; never stored stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockStatus {
    OutOfStock,
    Critical,
    Low,
    Optimal,
    Overstock,
}

/// Alert categories. At most one open alert per (record, alert type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    OutOfStock,
    CriticalStock,
    LowStock,
    Overstock,
}

/// Explicit status derivation from the raw stock numbers.
pub fn derive_status(current: i64, minimum: i64, reorder_point: i64, maximum: i64) -> StockStatus {
    if current <= 0 {
        StockStatus::OutOfStock
    } else if current <= minimum {
        StockStatus::Critical
    } else if current <= reorder_point {
        StockStatus::Low
    } else if (current as f64) > (maximum as f64) * 0.9 {
        StockStatus::Overstock
    } else {
        StockStatus::Optimal
    }
}

fn alert_for(status: StockStatus) -> Option<AlertType> {
    match status {
        StockStatus::OutOfStock => Some(AlertType::OutOfStock),
        StockStatus::Critical => Some(AlertType::CriticalStock),
        StockStatus::Low => Some(AlertType::LowStock),
        StockStatus::Overstock => Some(AlertType::Overstock),
        StockStatus::Optimal => None,
    }
}

/// Aggregate root: InventoryRecord.
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryRecord {
    id: InventoryRecordId,
    warehouse_id: Option<WarehouseId>,
    product_id: Option<ProductId>,
    location: String,
    current_stock: i64,
    reserved_stock: i64,
    minimum_stock_level: i64,
    maximum_stock_level: i64,
    reorder_point: i64,
    unit_cost: f64,
    status: StockStatus,
    open_alerts: BTreeSet<AlertType>,
    last_restocked_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl InventoryRecord {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: InventoryRecordId) -> Self {
        Self {
            id,
            warehouse_id: None,
            product_id: None,
            location: String::new(),
            current_stock: 0,
            reserved_stock: 0,
            minimum_stock_level: 0,
            maximum_stock_level: 0,
            reorder_point: 0,
            unit_cost: 0.0,
            status: StockStatus::OutOfStock,
            open_alerts: BTreeSet::new(),
            last_restocked_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> InventoryRecordId {
        self.id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn product_id(&self) -> Option<ProductId> {
        self.product_id
    }

    pub fn current_stock(&self) -> i64 {
        self.current_stock
    }

    pub fn reserved_stock(&self) -> i64 {
        self.reserved_stock
    }

    /// `available = current - reserved`. The command guards make a negative
    /// result unrepresentable.
    pub fn available_stock(&self) -> i64 {
        self.current_stock - self.reserved_stock
    }

    pub fn status(&self) -> StockStatus {
        self.status
    }

    pub fn open_alerts(&self) -> &BTreeSet<AlertType> {
        &self.open_alerts
    }

    pub fn unit_cost(&self) -> f64 {
        self.unit_cost
    }

    pub fn last_restocked_at(&self) -> Option<DateTime<Utc>> {
        self.last_restocked_at
    }

    fn derive_own_status(&self, current: i64) -> StockStatus {
        derive_status(
            current,
            self.minimum_stock_level,
            self.reorder_point,
            self.maximum_stock_level,
        )
    }
}

impl AggregateRoot for InventoryRecord {
    type Id = InventoryRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: TrackProduct (start managing stock for a product).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackProduct {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub product_id: ProductId,
    pub location: String,
    pub initial_stock: i64,
    pub minimum_stock_level: i64,
    pub maximum_stock_level: i64,
    pub reorder_point: i64,
    pub unit_cost: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (hold units for an order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (return held units to availability).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SellStock (ship units; consumes the matching reservation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellStock {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RestockProduct (receiving / sellable returns).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestockProduct {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (absolute correction from a reconciliation audit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub counted_quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveAlert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolveAlert {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub alert_type: AlertType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryCommand {
    TrackProduct(TrackProduct),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
    SellStock(SellStock),
    RestockProduct(RestockProduct),
    AdjustStock(AdjustStock),
    ResolveAlert(ResolveAlert),
}

/// Event: ProductTracked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductTracked {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub product_id: ProductId,
    pub location: String,
    pub initial_stock: i64,
    pub minimum_stock_level: i64,
    pub maximum_stock_level: i64,
    pub reorder_point: i64,
    pub unit_cost: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReserved {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
///
/// `quantity` is the effective release (requested clamped to the held
/// reservation), so `apply` stays a plain subtraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockReleased {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockSold.
///
/// `reservation_consumed` is `min(reserved, quantity)` at decision time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSold {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub reservation_consumed: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductRestocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRestocked {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted (absolute correction).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub previous_quantity: i64,
    pub counted_quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAlertRaised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockAlertRaised {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub alert_type: AlertType,
    pub status: StockStatus,
    pub current_stock: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AlertResolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertResolved {
    pub warehouse_id: WarehouseId,
    pub record_id: InventoryRecordId,
    pub alert_type: AlertType,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InventoryEvent {
    ProductTracked(ProductTracked),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    StockSold(StockSold),
    ProductRestocked(ProductRestocked),
    StockAdjusted(StockAdjusted),
    StockAlertRaised(StockAlertRaised),
    AlertResolved(AlertResolved),
}

impl Event for InventoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            InventoryEvent::ProductTracked(_) => "inventory.record.tracked",
            InventoryEvent::StockReserved(_) => "inventory.record.stock_reserved",
            InventoryEvent::StockReleased(_) => "inventory.record.stock_released",
            InventoryEvent::StockSold(_) => "inventory.record.stock_sold",
            InventoryEvent::ProductRestocked(_) => "inventory.record.restocked",
            InventoryEvent::StockAdjusted(_) => "inventory.record.stock_adjusted",
            InventoryEvent::StockAlertRaised(_) => "inventory.record.alert_raised",
            InventoryEvent::AlertResolved(_) => "inventory.record.alert_resolved",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            InventoryEvent::ProductTracked(e) => e.occurred_at,
            InventoryEvent::StockReserved(e) => e.occurred_at,
            InventoryEvent::StockReleased(e) => e.occurred_at,
            InventoryEvent::StockSold(e) => e.occurred_at,
            InventoryEvent::ProductRestocked(e) => e.occurred_at,
            InventoryEvent::StockAdjusted(e) => e.occurred_at,
            InventoryEvent::StockAlertRaised(e) => e.occurred_at,
            InventoryEvent::AlertResolved(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InventoryRecord {
    type Command = InventoryCommand;
    type Event = InventoryEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            InventoryEvent::ProductTracked(e) => {
                self.id = e.record_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.product_id = Some(e.product_id);
                self.location = e.location.clone();
                self.current_stock = e.initial_stock;
                self.reserved_stock = 0;
                self.minimum_stock_level = e.minimum_stock_level;
                self.maximum_stock_level = e.maximum_stock_level;
                self.reorder_point = e.reorder_point;
                self.unit_cost = e.unit_cost;
                self.created = true;
            }
            InventoryEvent::StockReserved(e) => {
                self.reserved_stock += e.quantity;
            }
            InventoryEvent::StockReleased(e) => {
                self.reserved_stock -= e.quantity;
            }
            InventoryEvent::StockSold(e) => {
                self.current_stock -= e.quantity;
                self.reserved_stock -= e.reservation_consumed;
            }
            InventoryEvent::ProductRestocked(e) => {
                self.current_stock += e.quantity;
                self.last_restocked_at = Some(e.occurred_at);
            }
            InventoryEvent::StockAdjusted(e) => {
                self.current_stock = e.counted_quantity;
                // A shrinking correction can undercut held reservations.
                self.reserved_stock = self.reserved_stock.min(self.current_stock);
            }
            InventoryEvent::StockAlertRaised(e) => {
                self.open_alerts.insert(e.alert_type);
            }
            InventoryEvent::AlertResolved(e) => {
                self.open_alerts.remove(&e.alert_type);
            }
        }

        // Explicit recomputation after every evolution; status is never stale.
        self.status = self.derive_own_status(self.current_stock);

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            InventoryCommand::TrackProduct(cmd) => self.handle_track(cmd),
            InventoryCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            InventoryCommand::ReleaseStock(cmd) => self.handle_release(cmd),
            InventoryCommand::SellStock(cmd) => self.handle_sell(cmd),
            InventoryCommand::RestockProduct(cmd) => self.handle_restock(cmd),
            InventoryCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            InventoryCommand::ResolveAlert(cmd) => self.handle_resolve_alert(cmd),
        }
    }
}

impl InventoryRecord {
    fn ensure_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.warehouse_id != Some(warehouse_id) {
            return Err(DomainError::invariant("warehouse mismatch"));
        }
        Ok(())
    }

    fn ensure_record_id(&self, record_id: InventoryRecordId) -> Result<(), DomainError> {
        if self.id != record_id {
            return Err(DomainError::invariant("record_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    /// Idempotent alerting: raise at most one open alert per alert type.
    fn maybe_alert(
        &self,
        warehouse_id: WarehouseId,
        next_current: i64,
        occurred_at: DateTime<Utc>,
    ) -> Option<InventoryEvent> {
        let next_status = self.derive_own_status(next_current);
        let alert_type = alert_for(next_status)?;
        if self.open_alerts.contains(&alert_type) {
            return None;
        }
        Some(InventoryEvent::StockAlertRaised(StockAlertRaised {
            warehouse_id,
            record_id: self.id,
            alert_type,
            status: next_status,
            current_stock: next_current,
            occurred_at,
        }))
    }

    fn handle_track(&self, cmd: &TrackProduct) -> Result<Vec<InventoryEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product is already tracked"));
        }
        if cmd.location.trim().is_empty() {
            return Err(DomainError::validation("location cannot be empty"));
        }
        if cmd.initial_stock < 0 {
            return Err(DomainError::validation("initial stock cannot be negative"));
        }
        if cmd.minimum_stock_level < 0 || cmd.reorder_point < 0 || cmd.maximum_stock_level < 0 {
            return Err(DomainError::validation("stock levels cannot be negative"));
        }
        if cmd.minimum_stock_level > cmd.reorder_point
            || cmd.reorder_point > cmd.maximum_stock_level
        {
            return Err(DomainError::validation(
                "stock levels must satisfy minimum <= reorder point <= maximum",
            ));
        }
        if cmd.unit_cost < 0.0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }

        let mut events = vec![InventoryEvent::ProductTracked(ProductTracked {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            product_id: cmd.product_id,
            location: cmd.location.clone(),
            initial_stock: cmd.initial_stock,
            minimum_stock_level: cmd.minimum_stock_level,
            maximum_stock_level: cmd.maximum_stock_level,
            reorder_point: cmd.reorder_point,
            unit_cost: cmd.unit_cost,
            occurred_at: cmd.occurred_at,
        })];

        // Status is derived against the command's own levels; the record has
        // no levels of its own before the first event.
        let status = derive_status(
            cmd.initial_stock,
            cmd.minimum_stock_level,
            cmd.reorder_point,
            cmd.maximum_stock_level,
        );
        if let Some(alert_type) = alert_for(status) {
            events.push(InventoryEvent::StockAlertRaised(StockAlertRaised {
                warehouse_id: cmd.warehouse_id,
                record_id: cmd.record_id,
                alert_type,
                status,
                current_stock: cmd.initial_stock,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.quantity > self.available_stock() {
            return Err(DomainError::insufficient_stock(
                cmd.quantity,
                self.available_stock(),
            ));
        }

        Ok(vec![InventoryEvent::StockReserved(StockReserved {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        // Floor at zero: never drive the reservation negative.
        let effective = cmd.quantity.min(self.reserved_stock);

        Ok(vec![InventoryEvent::StockReleased(StockReleased {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            quantity: effective,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sell(&self, cmd: &SellStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        // Guard on available, not current: units reserved for other orders
        // are not sellable even though they are physically on the shelf.
        if cmd.quantity > self.available_stock() {
            return Err(DomainError::insufficient_stock(
                cmd.quantity,
                self.available_stock(),
            ));
        }

        let next_current = self.current_stock - cmd.quantity;
        let mut events = vec![InventoryEvent::StockSold(StockSold {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            reservation_consumed: cmd.quantity.min(self.reserved_stock),
            occurred_at: cmd.occurred_at,
        })];
        if let Some(alert) = self.maybe_alert(cmd.warehouse_id, next_current, cmd.occurred_at) {
            events.push(alert);
        }
        Ok(events)
    }

    fn handle_restock(&self, cmd: &RestockProduct) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let next_current = self.current_stock + cmd.quantity;
        let mut events = vec![InventoryEvent::ProductRestocked(ProductRestocked {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })];
        if let Some(alert) = self.maybe_alert(cmd.warehouse_id, next_current, cmd.occurred_at) {
            events.push(alert);
        }
        Ok(events)
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if cmd.counted_quantity < 0 {
            return Err(DomainError::validation("counted quantity cannot be negative"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("adjustment reason cannot be empty"));
        }

        let mut events = vec![InventoryEvent::StockAdjusted(StockAdjusted {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            previous_quantity: self.current_stock,
            counted_quantity: cmd.counted_quantity,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })];
        if let Some(alert) = self.maybe_alert(cmd.warehouse_id, cmd.counted_quantity, cmd.occurred_at)
        {
            events.push(alert);
        }
        Ok(events)
    }

    fn handle_resolve_alert(&self, cmd: &ResolveAlert) -> Result<Vec<InventoryEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_record_id(cmd.record_id)?;

        if !self.open_alerts.contains(&cmd.alert_type) {
            return Err(DomainError::not_found());
        }

        Ok(vec![InventoryEvent::AlertResolved(AlertResolved {
            warehouse_id: cmd.warehouse_id,
            record_id: cmd.record_id,
            alert_type: cmd.alert_type,
            occurred_at: cmd.occurred_at,
        })])
    }
}
