use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ProductId, WarehouseId};
use stockpilot_events::Event;
use stockpilot_orders::OrderId;

/// Pick list identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PickListId(pub AggregateId);

impl PickListId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PickListId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickListStatus {
    Pending,
    InProgress,
    PartiallyPicked,
    Completed,
    Cancelled,
}

impl PickListStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickListStatus::Pending => "pending",
            PickListStatus::InProgress => "in_progress",
            PickListStatus::PartiallyPicked => "partially_picked",
            PickListStatus::Completed => "completed",
            PickListStatus::Cancelled => "cancelled",
        }
    }
}

/// One line to pick.
///
/// Invariant: `quantity_picked + remaining() == quantity_to_pick` at all times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickItem {
    pub product_id: ProductId,
    pub location: String,
    pub quantity_to_pick: i64,
    pub quantity_picked: i64,
}

impl PickItem {
    pub fn remaining(&self) -> i64 {
        self.quantity_to_pick - self.quantity_picked
    }
}

/// Input shape for pick list creation (picked quantity always starts at 0).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickItemSpec {
    pub product_id: ProductId,
    pub location: String,
    pub quantity: i64,
}

/// Aggregate root: PickList.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickList {
    id: PickListId,
    warehouse_id: Option<WarehouseId>,
    order_id: Option<OrderId>,
    pick_list_number: String,
    assigned_picker: Option<String>,
    status: PickListStatus,
    items: Vec<PickItem>,
    estimated_pick_minutes: i64,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl PickList {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PickListId) -> Self {
        Self {
            id,
            warehouse_id: None,
            order_id: None,
            pick_list_number: String::new(),
            assigned_picker: None,
            status: PickListStatus::Pending,
            items: Vec::new(),
            estimated_pick_minutes: 0,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PickListId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> PickListStatus {
        self.status
    }

    pub fn items(&self) -> &[PickItem] {
        &self.items
    }

    pub fn assigned_picker(&self) -> Option<&str> {
        self.assigned_picker.as_deref()
    }

    pub fn estimated_pick_minutes(&self) -> i64 {
        self.estimated_pick_minutes
    }

    pub fn total_to_pick(&self) -> i64 {
        self.items.iter().map(|i| i.quantity_to_pick).sum()
    }

    pub fn total_picked(&self) -> i64 {
        self.items.iter().map(|i| i.quantity_picked).sum()
    }

    pub fn total_remaining(&self) -> i64 {
        self.items.iter().map(|i| i.remaining()).sum()
    }

    pub fn is_fully_picked(&self) -> bool {
        self.items.iter().all(|i| i.remaining() == 0)
    }
}

impl AggregateRoot for PickList {
    type Id = PickListId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePickList.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePickList {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub pick_list_number: String,
    pub order_id: OrderId,
    pub items: Vec<PickItemSpec>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignPicker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignPicker {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub picker: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartPicking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPicking {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordPick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPick {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelPickList.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelPickList {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickListCommand {
    CreatePickList(CreatePickList),
    AssignPicker(AssignPicker),
    StartPicking(StartPicking),
    RecordPick(RecordPick),
    CancelPickList(CancelPickList),
}

/// Event: PickListCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListCreated {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub pick_list_number: String,
    pub order_id: OrderId,
    pub items: Vec<PickItemSpec>,
    pub estimated_pick_minutes: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickerAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickerAssigned {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub picker: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickingStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickingStarted {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemPicked.
///
/// `quantity` is the effective pick (requested clamped to what remains for
/// the item).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPicked {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickListCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListCompleted {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PickListCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickListCancelled {
    pub warehouse_id: WarehouseId,
    pub pick_list_id: PickListId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PickListEvent {
    PickListCreated(PickListCreated),
    PickerAssigned(PickerAssigned),
    PickingStarted(PickingStarted),
    ItemPicked(ItemPicked),
    PickListCompleted(PickListCompleted),
    PickListCancelled(PickListCancelled),
}

impl Event for PickListEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PickListEvent::PickListCreated(_) => "fulfillment.pick_list.created",
            PickListEvent::PickerAssigned(_) => "fulfillment.pick_list.picker_assigned",
            PickListEvent::PickingStarted(_) => "fulfillment.pick_list.started",
            PickListEvent::ItemPicked(_) => "fulfillment.pick_list.item_picked",
            PickListEvent::PickListCompleted(_) => "fulfillment.pick_list.completed",
            PickListEvent::PickListCancelled(_) => "fulfillment.pick_list.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PickListEvent::PickListCreated(e) => e.occurred_at,
            PickListEvent::PickerAssigned(e) => e.occurred_at,
            PickListEvent::PickingStarted(e) => e.occurred_at,
            PickListEvent::ItemPicked(e) => e.occurred_at,
            PickListEvent::PickListCompleted(e) => e.occurred_at,
            PickListEvent::PickListCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PickList {
    type Command = PickListCommand;
    type Event = PickListEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PickListEvent::PickListCreated(e) => {
                self.id = e.pick_list_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.order_id = Some(e.order_id);
                self.pick_list_number = e.pick_list_number.clone();
                self.items = e
                    .items
                    .iter()
                    .map(|spec| PickItem {
                        product_id: spec.product_id,
                        location: spec.location.clone(),
                        quantity_to_pick: spec.quantity,
                        quantity_picked: 0,
                    })
                    .collect();
                self.estimated_pick_minutes = e.estimated_pick_minutes;
                self.status = PickListStatus::Pending;
                self.created = true;
            }
            PickListEvent::PickerAssigned(e) => {
                self.assigned_picker = Some(e.picker.clone());
            }
            PickListEvent::PickingStarted(_) => {
                self.status = PickListStatus::InProgress;
            }
            PickListEvent::ItemPicked(e) => {
                if let Some(item) = self.items.iter_mut().find(|i| i.product_id == e.product_id) {
                    item.quantity_picked += e.quantity;
                }
                if !self.is_fully_picked() {
                    self.status = PickListStatus::PartiallyPicked;
                }
            }
            PickListEvent::PickListCompleted(e) => {
                self.status = PickListStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            PickListEvent::PickListCancelled(_) => {
                self.status = PickListStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PickListCommand::CreatePickList(cmd) => self.handle_create(cmd),
            PickListCommand::AssignPicker(cmd) => self.handle_assign(cmd),
            PickListCommand::StartPicking(cmd) => self.handle_start(cmd),
            PickListCommand::RecordPick(cmd) => self.handle_pick(cmd),
            PickListCommand::CancelPickList(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl PickList {
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

    fn ensure_open(&self) -> Result<(), DomainError> {
        match self.status {
            PickListStatus::Completed | PickListStatus::Cancelled => Err(
                DomainError::invariant("pick list is already closed"),
            ),
            _ => Ok(()),
        }
    }

    fn handle_create(&self, cmd: &CreatePickList) -> Result<Vec<PickListEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("pick list already exists"));
        }
        if cmd.pick_list_number.trim().is_empty() {
            return Err(DomainError::validation("pick list number cannot be empty"));
        }
        if cmd.items.is_empty() {
            return Err(DomainError::validation("pick list must have at least one item"));
        }
        for item in &cmd.items {
            if item.quantity <= 0 {
                return Err(DomainError::validation("item quantity must be positive"));
            }
            if item.location.trim().is_empty() {
                return Err(DomainError::validation("item location cannot be empty"));
            }
        }

        // Rough floor estimate: two minutes per line plus staging overhead.
        let estimated_pick_minutes = 2 * cmd.items.len() as i64 + 10;

        Ok(vec![PickListEvent::PickListCreated(PickListCreated {
            warehouse_id: cmd.warehouse_id,
            pick_list_id: cmd.pick_list_id,
            pick_list_number: cmd.pick_list_number.clone(),
            order_id: cmd.order_id,
            items: cmd.items.clone(),
            estimated_pick_minutes,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign(&self, cmd: &AssignPicker) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_open()?;

        if cmd.picker.trim().is_empty() {
            return Err(DomainError::validation("picker cannot be empty"));
        }

        Ok(vec![PickListEvent::PickerAssigned(PickerAssigned {
            warehouse_id: cmd.warehouse_id,
            pick_list_id: cmd.pick_list_id,
            picker: cmd.picker.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartPicking) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != PickListStatus::Pending {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                PickListStatus::InProgress.as_str(),
            ));
        }
        if self.assigned_picker.is_none() {
            return Err(DomainError::invariant("cannot start picking without a picker"));
        }

        Ok(vec![PickListEvent::PickingStarted(PickingStarted {
            warehouse_id: cmd.warehouse_id,
            pick_list_id: cmd.pick_list_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_pick(&self, cmd: &RecordPick) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !matches!(
            self.status,
            PickListStatus::InProgress | PickListStatus::PartiallyPicked
        ) {
            return Err(DomainError::invariant(
                "items can only be picked while picking is in progress",
            ));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let item = self
            .items
            .iter()
            .find(|i| i.product_id == cmd.product_id)
            .ok_or_else(|| DomainError::validation("product is not on this pick list"))?;

        if item.remaining() == 0 {
            return Err(DomainError::invariant("item is already fully picked"));
        }

        // Clamp so picked never exceeds to-pick for the line.
        let effective = cmd.quantity.min(item.remaining());

        let mut events = vec![PickListEvent::ItemPicked(ItemPicked {
            warehouse_id: cmd.warehouse_id,
            pick_list_id: cmd.pick_list_id,
            product_id: cmd.product_id,
            quantity: effective,
            occurred_at: cmd.occurred_at,
        })];

        // Completed in the same batch when this pick closes the last line.
        let remaining_after = self.total_remaining() - effective;
        if remaining_after == 0 {
            events.push(PickListEvent::PickListCompleted(PickListCompleted {
                warehouse_id: cmd.warehouse_id,
                pick_list_id: cmd.pick_list_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_cancel(&self, cmd: &CancelPickList) -> Result<Vec<PickListEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_open()?;

        Ok(vec![PickListEvent::PickListCancelled(PickListCancelled {
            warehouse_id: cmd.warehouse_id,
            pick_list_id: cmd.pick_list_id,
            reason: cmd.reason.clone(),
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

    fn test_pick_list_id() -> PickListId {
        PickListId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3)))
    }

    fn product(n: u128) -> ProductId {
        ProductId::from_uuid(uuid::Uuid::from_u128(n))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn started_pick_list() -> PickList {
        let mut pl = PickList::empty(test_pick_list_id());
        execute(
            &mut pl,
            &PickListCommand::CreatePickList(CreatePickList {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                pick_list_number: "PL-000001".to_string(),
                order_id: test_order_id(),
                items: vec![
                    PickItemSpec {
                        product_id: product(10),
                        location: "A-01-01".to_string(),
                        quantity: 3,
                    },
                    PickItemSpec {
                        product_id: product(11),
                        location: "B-02-05".to_string(),
                        quantity: 2,
                    },
                ],
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut pl,
            &PickListCommand::AssignPicker(AssignPicker {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                picker: "picker-7".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(
            &mut pl,
            &PickListCommand::StartPicking(StartPicking {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        pl
    }

    fn pick(pl: &mut PickList, product_id: ProductId, quantity: i64) -> Result<Vec<PickListEvent>, DomainError> {
        execute(
            pl,
            &PickListCommand::RecordPick(RecordPick {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                product_id,
                quantity,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn create_estimates_pick_time() {
        let pl = started_pick_list();
        // 2 lines: 2 * 2 + 10.
        assert_eq!(pl.estimated_pick_minutes(), 14);
        assert_eq!(pl.total_to_pick(), 5);
    }

    #[test]
    fn partial_pick_keeps_item_arithmetic_consistent() {
        let mut pl = started_pick_list();
        pick(&mut pl, product(10), 2).unwrap();

        assert_eq!(pl.status(), PickListStatus::PartiallyPicked);
        assert_eq!(pl.total_picked(), 2);
        assert_eq!(pl.total_remaining(), 3);
        assert_eq!(pl.total_picked() + pl.total_remaining(), pl.total_to_pick());
    }

    #[test]
    fn picking_every_item_completes_the_list_in_one_batch() {
        let mut pl = started_pick_list();
        pick(&mut pl, product(10), 3).unwrap();
        assert_eq!(pl.status(), PickListStatus::PartiallyPicked);

        let events = pick(&mut pl, product(11), 2).unwrap();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], PickListEvent::PickListCompleted(_)));
        assert_eq!(pl.status(), PickListStatus::Completed);
        assert_eq!(pl.total_remaining(), 0);
    }

    #[test]
    fn over_pick_is_clamped_to_remaining() {
        let mut pl = started_pick_list();
        let events = pick(&mut pl, product(11), 99).unwrap();
        match &events[0] {
            PickListEvent::ItemPicked(e) => assert_eq!(e.quantity, 2),
            other => panic!("expected ItemPicked, got {other:?}"),
        }
        assert_eq!(pl.total_picked(), 2);
    }

    #[test]
    fn cannot_pick_before_starting() {
        let mut pl = PickList::empty(test_pick_list_id());
        execute(
            &mut pl,
            &PickListCommand::CreatePickList(CreatePickList {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                pick_list_number: "PL-000002".to_string(),
                order_id: test_order_id(),
                items: vec![PickItemSpec {
                    product_id: product(10),
                    location: "A-01-01".to_string(),
                    quantity: 1,
                }],
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = pick(&mut pl, product(10), 1).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("in progress") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn cannot_start_without_picker() {
        let mut pl = PickList::empty(test_pick_list_id());
        execute(
            &mut pl,
            &PickListCommand::CreatePickList(CreatePickList {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                pick_list_number: "PL-000003".to_string(),
                order_id: test_order_id(),
                items: vec![PickItemSpec {
                    product_id: product(10),
                    location: "A-01-01".to_string(),
                    quantity: 1,
                }],
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = execute(
            &mut pl,
            &PickListCommand::StartPicking(StartPicking {
                warehouse_id: test_warehouse_id(),
                pick_list_id: test_pick_list_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("without a picker") => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }

    #[test]
    fn completed_list_rejects_further_picks() {
        let mut pl = started_pick_list();
        pick(&mut pl, product(10), 3).unwrap();
        pick(&mut pl, product(11), 2).unwrap();

        let err = pick(&mut pl, product(10), 1).unwrap_err();
        match err {
            DomainError::InvariantViolation(_) => {}
            other => panic!("expected InvariantViolation, got {other:?}"),
        }
    }
}
