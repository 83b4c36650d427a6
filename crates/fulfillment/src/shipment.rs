use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, WarehouseId};
use stockpilot_events::Event;
use stockpilot_orders::OrderId;

use crate::package::PackageId;

/// Shipment identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShipmentId(pub AggregateId);

impl ShipmentId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Scheduled,
    DispatchScheduled,
    PickedUp,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    Exception,
    Returned,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Scheduled => "scheduled",
            ShipmentStatus::DispatchScheduled => "dispatch_scheduled",
            ShipmentStatus::PickedUp => "picked_up",
            ShipmentStatus::Shipped => "shipped",
            ShipmentStatus::InTransit => "in_transit",
            ShipmentStatus::OutForDelivery => "out_for_delivery",
            ShipmentStatus::Delivered => "delivered",
            ShipmentStatus::Exception => "exception",
            ShipmentStatus::Returned => "returned",
        }
    }

    /// Carrier progression table. `Exception` can interrupt any active leg;
    /// recovery re-enters transit or closes out as delivered/returned.
    pub fn can_transition_to(self, next: ShipmentStatus) -> bool {
        use ShipmentStatus::*;
        matches!(
            (self, next),
            (Scheduled, DispatchScheduled)
                | (DispatchScheduled, PickedUp)
                | (PickedUp, Shipped)
                | (Shipped, InTransit)
                | (InTransit, OutForDelivery)
                | (OutForDelivery, Delivered)
                | (Shipped, Exception)
                | (InTransit, Exception)
                | (OutForDelivery, Exception)
                | (Exception, InTransit)
                | (Exception, Delivered)
                | (Exception, Returned)
        )
    }
}

/// Aggregate root: Shipment.
///
/// Tracking number uniqueness is a cross-aggregate invariant enforced by the
/// application layer against the shipment index before creation is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shipment {
    id: ShipmentId,
    warehouse_id: Option<WarehouseId>,
    order_id: Option<OrderId>,
    package_id: Option<PackageId>,
    shipment_number: String,
    tracking_number: String,
    carrier: String,
    status: ShipmentStatus,
    scheduled_pickup_at: Option<DateTime<Utc>>,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Shipment {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ShipmentId) -> Self {
        Self {
            id,
            warehouse_id: None,
            order_id: None,
            package_id: None,
            shipment_number: String::new(),
            tracking_number: String::new(),
            carrier: String::new(),
            status: ShipmentStatus::Scheduled,
            scheduled_pickup_at: None,
            shipped_at: None,
            delivered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ShipmentId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }

    pub fn carrier(&self) -> &str {
        &self.carrier
    }

    pub fn status(&self) -> ShipmentStatus {
        self.status
    }

    pub fn scheduled_pickup_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_pickup_at
    }

    pub fn shipped_at(&self) -> Option<DateTime<Utc>> {
        self.shipped_at
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }
}

impl AggregateRoot for Shipment {
    type Id = ShipmentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateShipment.
///
/// The application layer verifies the package is packed and its quality check
/// approved before dispatching this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateShipment {
    pub warehouse_id: WarehouseId,
    pub shipment_id: ShipmentId,
    pub shipment_number: String,
    pub order_id: OrderId,
    pub package_id: PackageId,
    pub tracking_number: String,
    pub carrier: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ScheduleDispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDispatch {
    pub warehouse_id: WarehouseId,
    pub shipment_id: ShipmentId,
    pub pickup_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionShipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionShipment {
    pub warehouse_id: WarehouseId,
    pub shipment_id: ShipmentId,
    pub next: ShipmentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentCommand {
    CreateShipment(CreateShipment),
    ScheduleDispatch(ScheduleDispatch),
    TransitionShipment(TransitionShipment),
}

/// Event: ShipmentCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentCreated {
    pub warehouse_id: WarehouseId,
    pub shipment_id: ShipmentId,
    pub shipment_number: String,
    pub order_id: OrderId,
    pub package_id: PackageId,
    pub tracking_number: String,
    pub carrier: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DispatchScheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchScheduled {
    pub warehouse_id: WarehouseId,
    pub shipment_id: ShipmentId,
    pub pickup_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ShipmentStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentStatusChanged {
    pub warehouse_id: WarehouseId,
    pub shipment_id: ShipmentId,
    pub from: ShipmentStatus,
    pub to: ShipmentStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShipmentEvent {
    ShipmentCreated(ShipmentCreated),
    DispatchScheduled(DispatchScheduled),
    ShipmentStatusChanged(ShipmentStatusChanged),
}

impl Event for ShipmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ShipmentEvent::ShipmentCreated(_) => "fulfillment.shipment.created",
            ShipmentEvent::DispatchScheduled(_) => "fulfillment.shipment.dispatch_scheduled",
            ShipmentEvent::ShipmentStatusChanged(_) => "fulfillment.shipment.status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ShipmentEvent::ShipmentCreated(e) => e.occurred_at,
            ShipmentEvent::DispatchScheduled(e) => e.occurred_at,
            ShipmentEvent::ShipmentStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Shipment {
    type Command = ShipmentCommand;
    type Event = ShipmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ShipmentEvent::ShipmentCreated(e) => {
                self.id = e.shipment_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.order_id = Some(e.order_id);
                self.package_id = Some(e.package_id);
                self.shipment_number = e.shipment_number.clone();
                self.tracking_number = e.tracking_number.clone();
                self.carrier = e.carrier.clone();
                self.status = ShipmentStatus::Scheduled;
                self.created = true;
            }
            ShipmentEvent::DispatchScheduled(e) => {
                self.status = ShipmentStatus::DispatchScheduled;
                self.scheduled_pickup_at = Some(e.pickup_at);
            }
            ShipmentEvent::ShipmentStatusChanged(e) => {
                self.status = e.to;
                match e.to {
                    ShipmentStatus::Shipped => self.shipped_at = Some(e.occurred_at),
                    ShipmentStatus::Delivered => self.delivered_at = Some(e.occurred_at),
                    _ => {}
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ShipmentCommand::CreateShipment(cmd) => self.handle_create(cmd),
            ShipmentCommand::ScheduleDispatch(cmd) => self.handle_schedule(cmd),
            ShipmentCommand::TransitionShipment(cmd) => self.handle_transition(cmd),
        }
    }
}

impl Shipment {
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

    fn handle_create(&self, cmd: &CreateShipment) -> Result<Vec<ShipmentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("shipment already exists"));
        }
        if cmd.carrier.trim().is_empty() {
            return Err(DomainError::validation("carrier cannot be empty"));
        }
        if cmd.tracking_number.trim().is_empty() {
            return Err(DomainError::validation("tracking number cannot be empty"));
        }
        if cmd.shipment_number.trim().is_empty() {
            return Err(DomainError::validation("shipment number cannot be empty"));
        }

        Ok(vec![ShipmentEvent::ShipmentCreated(ShipmentCreated {
            warehouse_id: cmd.warehouse_id,
            shipment_id: cmd.shipment_id,
            shipment_number: cmd.shipment_number.clone(),
            order_id: cmd.order_id,
            package_id: cmd.package_id,
            tracking_number: cmd.tracking_number.clone(),
            carrier: cmd.carrier.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_schedule(&self, cmd: &ScheduleDispatch) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        // Dispatch can only be scheduled once, from the initial state.
        if self.status != ShipmentStatus::Scheduled {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ShipmentStatus::DispatchScheduled.as_str(),
            ));
        }

        Ok(vec![ShipmentEvent::DispatchScheduled(DispatchScheduled {
            warehouse_id: cmd.warehouse_id,
            shipment_id: cmd.shipment_id,
            pickup_at: cmd.pickup_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionShipment) -> Result<Vec<ShipmentEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if cmd.next == ShipmentStatus::DispatchScheduled {
            return Err(DomainError::validation(
                "use ScheduleDispatch to schedule a pickup",
            ));
        }
        if !self.status.can_transition_to(cmd.next) {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                cmd.next.as_str(),
            ));
        }

        Ok(vec![ShipmentEvent::ShipmentStatusChanged(
            ShipmentStatusChanged {
                warehouse_id: cmd.warehouse_id,
                shipment_id: cmd.shipment_id,
                from: self.status,
                to: cmd.next,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockpilot_events::execute;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(uuid::Uuid::from_u128(1))
    }

    fn test_shipment_id() -> ShipmentId {
        ShipmentId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn created_shipment() -> Shipment {
        let mut shipment = Shipment::empty(test_shipment_id());
        execute(
            &mut shipment,
            &ShipmentCommand::CreateShipment(CreateShipment {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                shipment_number: "SHP-000001".to_string(),
                order_id: OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3))),
                package_id: PackageId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(4))),
                tracking_number: "TRK-0001".to_string(),
                carrier: "FastShip".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        shipment
    }

    fn transition(shipment: &mut Shipment, next: ShipmentStatus) -> Result<Vec<ShipmentEvent>, DomainError> {
        execute(
            shipment,
            &ShipmentCommand::TransitionShipment(TransitionShipment {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                next,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn create_requires_carrier() {
        let mut shipment = Shipment::empty(test_shipment_id());
        let err = execute(
            &mut shipment,
            &ShipmentCommand::CreateShipment(CreateShipment {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                shipment_number: "SHP-000001".to_string(),
                order_id: OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3))),
                package_id: PackageId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(4))),
                tracking_number: "TRK-0001".to_string(),
                carrier: "  ".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("carrier") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_can_only_be_scheduled_once() {
        let mut shipment = created_shipment();
        execute(
            &mut shipment,
            &ShipmentCommand::ScheduleDispatch(ScheduleDispatch {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                pickup_at: test_time(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(shipment.status(), ShipmentStatus::DispatchScheduled);

        let err = execute(
            &mut shipment,
            &ShipmentCommand::ScheduleDispatch(ScheduleDispatch {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                pickup_at: test_time(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::IllegalTransition { from, .. } => assert_eq!(from, "dispatch_scheduled"),
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn full_carrier_progression_with_stamps() {
        let mut shipment = created_shipment();
        execute(
            &mut shipment,
            &ShipmentCommand::ScheduleDispatch(ScheduleDispatch {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                pickup_at: test_time(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        for next in [
            ShipmentStatus::PickedUp,
            ShipmentStatus::Shipped,
            ShipmentStatus::InTransit,
            ShipmentStatus::OutForDelivery,
            ShipmentStatus::Delivered,
        ] {
            transition(&mut shipment, next).unwrap();
        }
        assert!(shipment.shipped_at().is_some());
        assert!(shipment.delivered_at().is_some());
    }

    #[test]
    fn exception_interrupts_and_recovers() {
        let mut shipment = created_shipment();
        execute(
            &mut shipment,
            &ShipmentCommand::ScheduleDispatch(ScheduleDispatch {
                warehouse_id: test_warehouse_id(),
                shipment_id: test_shipment_id(),
                pickup_at: test_time(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        transition(&mut shipment, ShipmentStatus::PickedUp).unwrap();
        transition(&mut shipment, ShipmentStatus::Shipped).unwrap();
        transition(&mut shipment, ShipmentStatus::Exception).unwrap();
        transition(&mut shipment, ShipmentStatus::InTransit).unwrap();
        assert_eq!(shipment.status(), ShipmentStatus::InTransit);
    }

    #[test]
    fn cannot_deliver_from_scheduled() {
        let mut shipment = created_shipment();
        let err = transition(&mut shipment, ShipmentStatus::Delivered).unwrap_err();
        match err {
            DomainError::IllegalTransition { from, to } => {
                assert_eq!(from, "scheduled");
                assert_eq!(to, "delivered");
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }
}
