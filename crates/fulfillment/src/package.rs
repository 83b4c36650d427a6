use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ProductId, WarehouseId};
use stockpilot_events::Event;
use stockpilot_orders::OrderId;

use crate::pick_list::PickListId;

/// Package identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub AggregateId);

impl PackageId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PackageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Packing,
    Packed,
    Cancelled,
}

impl PackageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageStatus::Packing => "packing",
            PackageStatus::Packed => "packed",
            PackageStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackedItem {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_weight_kg: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate root: Package.
///
/// Total weight is recomputed from the items on every mutation (weight = Σ
/// unit weight × quantity); it is never stored stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    id: PackageId,
    warehouse_id: Option<WarehouseId>,
    order_id: Option<OrderId>,
    pick_list_id: Option<PickListId>,
    package_number: String,
    dimensions: String,
    items: Vec<PackedItem>,
    total_weight_kg: f64,
    status: PackageStatus,
    packed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Package {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PackageId) -> Self {
        Self {
            id,
            warehouse_id: None,
            order_id: None,
            pick_list_id: None,
            package_number: String::new(),
            dimensions: String::new(),
            items: Vec::new(),
            total_weight_kg: 0.0,
            status: PackageStatus::Packing,
            packed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PackageId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn pick_list_id(&self) -> Option<PickListId> {
        self.pick_list_id
    }

    pub fn status(&self) -> PackageStatus {
        self.status
    }

    pub fn items(&self) -> &[PackedItem] {
        &self.items
    }

    pub fn total_weight_kg(&self) -> f64 {
        self.total_weight_kg
    }

    pub fn is_packed(&self) -> bool {
        self.status == PackageStatus::Packed
    }

    fn recompute_weight(&mut self) {
        self.total_weight_kg = round2(
            self.items
                .iter()
                .map(|i| i.unit_weight_kg * i.quantity as f64)
                .sum(),
        );
    }
}

impl AggregateRoot for Package {
    type Id = PackageId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePackage.
///
/// The "pick list must be completed" gate is checked by the application layer
/// against the pick list read model before this command is dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePackage {
    pub warehouse_id: WarehouseId,
    pub package_id: PackageId,
    pub package_number: String,
    pub order_id: OrderId,
    pub pick_list_id: PickListId,
    pub dimensions: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AddPackedItem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddPackedItem {
    pub warehouse_id: WarehouseId,
    pub package_id: PackageId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_weight_kg: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkPacked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkPacked {
    pub warehouse_id: WarehouseId,
    pub package_id: PackageId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PackageCommand {
    CreatePackage(CreatePackage),
    AddPackedItem(AddPackedItem),
    MarkPacked(MarkPacked),
}

/// Event: PackageCreated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageCreated {
    pub warehouse_id: WarehouseId,
    pub package_id: PackageId,
    pub package_number: String,
    pub order_id: OrderId,
    pub pick_list_id: PickListId,
    pub dimensions: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemPacked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPacked {
    pub warehouse_id: WarehouseId,
    pub package_id: PackageId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_weight_kg: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PackagePacked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackagePacked {
    pub warehouse_id: WarehouseId,
    pub package_id: PackageId,
    pub total_weight_kg: f64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PackageEvent {
    PackageCreated(PackageCreated),
    ItemPacked(ItemPacked),
    PackagePacked(PackagePacked),
}

impl Event for PackageEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PackageEvent::PackageCreated(_) => "fulfillment.package.created",
            PackageEvent::ItemPacked(_) => "fulfillment.package.item_packed",
            PackageEvent::PackagePacked(_) => "fulfillment.package.packed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PackageEvent::PackageCreated(e) => e.occurred_at,
            PackageEvent::ItemPacked(e) => e.occurred_at,
            PackageEvent::PackagePacked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Package {
    type Command = PackageCommand;
    type Event = PackageEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PackageEvent::PackageCreated(e) => {
                self.id = e.package_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.order_id = Some(e.order_id);
                self.pick_list_id = Some(e.pick_list_id);
                self.package_number = e.package_number.clone();
                self.dimensions = e.dimensions.clone();
                self.status = PackageStatus::Packing;
                self.created = true;
            }
            PackageEvent::ItemPacked(e) => {
                self.items.push(PackedItem {
                    product_id: e.product_id,
                    quantity: e.quantity,
                    unit_weight_kg: e.unit_weight_kg,
                });
                self.recompute_weight();
            }
            PackageEvent::PackagePacked(e) => {
                self.status = PackageStatus::Packed;
                self.packed_at = Some(e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PackageCommand::CreatePackage(cmd) => self.handle_create(cmd),
            PackageCommand::AddPackedItem(cmd) => self.handle_add_item(cmd),
            PackageCommand::MarkPacked(cmd) => self.handle_mark_packed(cmd),
        }
    }
}

impl Package {
    fn ensure_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.warehouse_id != Some(warehouse_id) {
            return Err(DomainError::invariant("warehouse mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePackage) -> Result<Vec<PackageEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("package already exists"));
        }
        if cmd.package_number.trim().is_empty() {
            return Err(DomainError::validation("package number cannot be empty"));
        }

        Ok(vec![PackageEvent::PackageCreated(PackageCreated {
            warehouse_id: cmd.warehouse_id,
            package_id: cmd.package_id,
            package_number: cmd.package_number.clone(),
            order_id: cmd.order_id,
            pick_list_id: cmd.pick_list_id,
            dimensions: cmd.dimensions.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_add_item(&self, cmd: &AddPackedItem) -> Result<Vec<PackageEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != PackageStatus::Packing {
            return Err(DomainError::invariant(
                "items can only be added while the package is being packed",
            ));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if cmd.unit_weight_kg < 0.0 {
            return Err(DomainError::validation("unit weight cannot be negative"));
        }

        Ok(vec![PackageEvent::ItemPacked(ItemPacked {
            warehouse_id: cmd.warehouse_id,
            package_id: cmd.package_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            unit_weight_kg: cmd.unit_weight_kg,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_packed(&self, cmd: &MarkPacked) -> Result<Vec<PackageEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != PackageStatus::Packing {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                PackageStatus::Packed.as_str(),
            ));
        }
        if self.items.is_empty() {
            return Err(DomainError::invariant("cannot pack an empty package"));
        }

        Ok(vec![PackageEvent::PackagePacked(PackagePacked {
            warehouse_id: cmd.warehouse_id,
            package_id: cmd.package_id,
            total_weight_kg: self.total_weight_kg,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpilot_events::execute;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(uuid::Uuid::from_u128(1))
    }

    fn test_package_id() -> PackageId {
        PackageId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn created_package() -> Package {
        let mut pkg = Package::empty(test_package_id());
        execute(
            &mut pkg,
            &PackageCommand::CreatePackage(CreatePackage {
                warehouse_id: test_warehouse_id(),
                package_id: test_package_id(),
                package_number: "PKG-000001".to_string(),
                order_id: OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3))),
                pick_list_id: PickListId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(4))),
                dimensions: "40x30x20".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        pkg
    }

    fn add_item(pkg: &mut Package, quantity: i64, unit_weight_kg: f64) {
        execute(
            pkg,
            &PackageCommand::AddPackedItem(AddPackedItem {
                warehouse_id: test_warehouse_id(),
                package_id: test_package_id(),
                product_id: ProductId::from_uuid(uuid::Uuid::from_u128(10)),
                quantity,
                unit_weight_kg,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
    }

    #[test]
    fn weight_is_recomputed_from_items() {
        let mut pkg = created_package();
        add_item(&mut pkg, 2, 1.25);
        add_item(&mut pkg, 3, 0.5);
        assert!((pkg.total_weight_kg() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn mark_packed_requires_items() {
        let mut pkg = created_package();
        let err = execute(
            &mut pkg,
            &PackageCommand::MarkPacked(MarkPacked {
                warehouse_id: test_warehouse_id(),
                package_id: test_package_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("empty package") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn packed_package_is_sealed() {
        let mut pkg = created_package();
        add_item(&mut pkg, 1, 2.0);
        execute(
            &mut pkg,
            &PackageCommand::MarkPacked(MarkPacked {
                warehouse_id: test_warehouse_id(),
                package_id: test_package_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert!(pkg.is_packed());

        let err = execute(
            &mut pkg,
            &PackageCommand::AddPackedItem(AddPackedItem {
                warehouse_id: test_warehouse_id(),
                package_id: test_package_id(),
                product_id: ProductId::from_uuid(uuid::Uuid::from_u128(11)),
                quantity: 1,
                unit_weight_kg: 1.0,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("being packed") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }
}
