use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{
    Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, ProductId, WarehouseId,
};
use stockpilot_events::Event;

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order status lifecycle (closed enum; moves only along the table below).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Picked,
    Packed,
    QualityChecked,
    Shipped,
    InTransit,
    OutForDelivery,
    Delivered,
    OnHold,
    Cancelled,
    Returned,
    Refunded,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Picked => "picked",
            OrderStatus::Packed => "packed",
            OrderStatus::QualityChecked => "quality_checked",
            OrderStatus::Shipped => "shipped",
            OrderStatus::InTransit => "in_transit",
            OrderStatus::OutForDelivery => "out_for_delivery",
            OrderStatus::Delivered => "delivered",
            OrderStatus::OnHold => "on_hold",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Returned => "returned",
            OrderStatus::Refunded => "refunded",
            OrderStatus::Failed => "failed",
        }
    }

    /// The transition table. Everything not listed is illegal.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed)
                | (Pending, OnHold)
                | (Confirmed, Processing)
                | (Confirmed, OnHold)
                | (Processing, Picked)
                | (Processing, OnHold)
                | (Picked, Packed)
                | (Packed, QualityChecked)
                | (QualityChecked, Shipped)
                | (Shipped, InTransit)
                | (Shipped, Failed)
                | (InTransit, OutForDelivery)
                | (InTransit, Failed)
                | (OutForDelivery, Delivered)
                | (OutForDelivery, Failed)
                | (Delivered, Returned)
                | (OnHold, Pending)
                | (OnHold, Confirmed)
                | (OnHold, Processing)
                | (Returned, Refunded)
                | (Cancelled, Refunded)
                | (Failed, Refunded)
        )
    }

    /// Cancellation guard: an order that already left the building (or is
    /// closed) cannot be cancelled.
    pub fn is_cancellable(self) -> bool {
        use OrderStatus::*;
        matches!(
            self,
            Pending | Confirmed | Processing | Picked | Packed | QualityChecked | OnHold
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Refunded)
    }
}

/// Order line: product, quantity, unit price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLine {
    pub line_no: u32,
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: f64,
}

/// Reference to a fulfillment artifact produced downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum FulfillmentLink {
    PickList(AggregateId),
    Shipment(AggregateId),
    TrackingNumber(String),
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate root: Order.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    id: OrderId,
    warehouse_id: Option<WarehouseId>,
    customer_id: Option<CustomerId>,
    order_number: String,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total_amount: f64,
    notes: String,
    pick_list_id: Option<AggregateId>,
    shipment_id: Option<AggregateId>,
    tracking_number: Option<String>,
    estimated_delivery: Option<DateTime<Utc>>,
    actual_delivery: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            warehouse_id: None,
            customer_id: None,
            order_number: String::new(),
            status: OrderStatus::Pending,
            lines: Vec::new(),
            total_amount: 0.0,
            notes: String::new(),
            pick_list_id: None,
            shipment_id: None,
            tracking_number: None,
            estimated_delivery: None,
            actual_delivery: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn warehouse_id(&self) -> Option<WarehouseId> {
        self.warehouse_id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_amount(&self) -> f64 {
        self.total_amount
    }

    pub fn tracking_number(&self) -> Option<&str> {
        self.tracking_number.as_deref()
    }

    pub fn estimated_delivery(&self) -> Option<DateTime<Utc>> {
        self.estimated_delivery
    }

    pub fn actual_delivery(&self) -> Option<DateTime<Utc>> {
        self.actual_delivery
    }
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLine>,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: TransitionStatus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionStatus {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub next: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelOrder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: LinkFulfillment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkFulfillment {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub link: FulfillmentLink,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    TransitionStatus(TransitionStatus),
    CancelOrder(CancelOrder),
    LinkFulfillment(LinkFulfillment),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLine>,
    pub total_amount: f64,
    pub notes: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
///
/// Delivery stamps are decided at transition time and carried in the event so
/// `apply` stays a pure assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderCancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FulfillmentLinked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulfillmentLinked {
    pub warehouse_id: WarehouseId,
    pub order_id: OrderId,
    pub link: FulfillmentLink,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    OrderPlaced(OrderPlaced),
    OrderStatusChanged(OrderStatusChanged),
    OrderCancelled(OrderCancelled),
    FulfillmentLinked(FulfillmentLinked),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::OrderPlaced(_) => "orders.order.placed",
            OrderEvent::OrderStatusChanged(_) => "orders.order.status_changed",
            OrderEvent::OrderCancelled(_) => "orders.order.cancelled",
            OrderEvent::FulfillmentLinked(_) => "orders.order.fulfillment_linked",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::OrderPlaced(e) => e.occurred_at,
            OrderEvent::OrderStatusChanged(e) => e.occurred_at,
            OrderEvent::OrderCancelled(e) => e.occurred_at,
            OrderEvent::FulfillmentLinked(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.id = e.order_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.customer_id = Some(e.customer_id);
                self.order_number = e.order_number.clone();
                self.status = OrderStatus::Pending;
                self.lines = e.lines.clone();
                self.total_amount = e.total_amount;
                self.notes = e.notes.clone();
                self.created = true;
            }
            OrderEvent::OrderStatusChanged(e) => {
                self.status = e.to;
                if e.estimated_delivery.is_some() {
                    self.estimated_delivery = e.estimated_delivery;
                }
                if e.actual_delivery.is_some() {
                    self.actual_delivery = e.actual_delivery;
                }
            }
            OrderEvent::OrderCancelled(_) => {
                self.status = OrderStatus::Cancelled;
            }
            OrderEvent::FulfillmentLinked(e) => match &e.link {
                FulfillmentLink::PickList(id) => self.pick_list_id = Some(*id),
                FulfillmentLink::Shipment(id) => self.shipment_id = Some(*id),
                FulfillmentLink::TrackingNumber(tn) => self.tracking_number = Some(tn.clone()),
            },
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::TransitionStatus(cmd) => self.handle_transition(cmd),
            OrderCommand::CancelOrder(cmd) => self.handle_cancel(cmd),
            OrderCommand::LinkFulfillment(cmd) => self.handle_link(cmd),
        }
    }
}

impl Order {
    fn ensure_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.warehouse_id != Some(warehouse_id) {
            return Err(DomainError::invariant("warehouse mismatch"));
        }
        Ok(())
    }

    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.order_number.trim().is_empty() {
            return Err(DomainError::validation("order number cannot be empty"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must have at least one line"));
        }
        for line in &cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation("line quantity must be positive"));
            }
            if line.unit_price < 0.0 {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }

        let total_amount = round2(
            cmd.lines
                .iter()
                .map(|l| l.quantity as f64 * l.unit_price)
                .sum(),
        );

        Ok(vec![OrderEvent::OrderPlaced(OrderPlaced {
            warehouse_id: cmd.warehouse_id,
            order_id: cmd.order_id,
            order_number: cmd.order_number.clone(),
            customer_id: cmd.customer_id,
            lines: cmd.lines.clone(),
            total_amount,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_transition(&self, cmd: &TransitionStatus) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.status.can_transition_to(cmd.next) {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                cmd.next.as_str(),
            ));
        }

        let estimated_delivery = match cmd.next {
            OrderStatus::Shipped => Some(cmd.occurred_at + Duration::days(3)),
            _ => None,
        };
        let actual_delivery = match cmd.next {
            OrderStatus::Delivered => Some(cmd.occurred_at),
            _ => None,
        };

        Ok(vec![OrderEvent::OrderStatusChanged(OrderStatusChanged {
            warehouse_id: cmd.warehouse_id,
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.next,
            estimated_delivery,
            actual_delivery,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelOrder) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if !self.status.is_cancellable() {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                OrderStatus::Cancelled.as_str(),
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }

        Ok(vec![OrderEvent::OrderCancelled(OrderCancelled {
            warehouse_id: cmd.warehouse_id,
            order_id: cmd.order_id,
            from: self.status,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_link(&self, cmd: &LinkFulfillment) -> Result<Vec<OrderEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_order_id(cmd.order_id)?;

        if let FulfillmentLink::TrackingNumber(tn) = &cmd.link {
            if tn.trim().is_empty() {
                return Err(DomainError::validation("tracking number cannot be empty"));
            }
        }

        Ok(vec![OrderEvent::FulfillmentLinked(FulfillmentLinked {
            warehouse_id: cmd.warehouse_id,
            order_id: cmd.order_id,
            link: cmd.link.clone(),
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

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_customer_id() -> CustomerId {
        CustomerId::from_uuid(uuid::Uuid::from_u128(3))
    }

    fn test_product_id() -> ProductId {
        ProductId::from_uuid(uuid::Uuid::from_u128(4))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn placed_order() -> Order {
        let mut order = Order::empty(test_order_id());
        let cmd = OrderCommand::PlaceOrder(PlaceOrder {
            warehouse_id: test_warehouse_id(),
            order_id: test_order_id(),
            order_number: "ORD-000001".to_string(),
            customer_id: test_customer_id(),
            lines: vec![
                OrderLine {
                    line_no: 1,
                    product_id: test_product_id(),
                    quantity: 2,
                    unit_price: 19.99,
                },
                OrderLine {
                    line_no: 2,
                    product_id: test_product_id(),
                    quantity: 1,
                    unit_price: 5.00,
                },
            ],
            notes: String::new(),
            occurred_at: test_time(),
        });
        execute(&mut order, &cmd).unwrap();
        order
    }

    fn transition(order: &mut Order, next: OrderStatus) -> Result<Vec<OrderEvent>, DomainError> {
        execute(
            order,
            &OrderCommand::TransitionStatus(TransitionStatus {
                warehouse_id: test_warehouse_id(),
                order_id: test_order_id(),
                next,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn place_order_computes_total() {
        let order = placed_order();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.lines().len(), 2);
        assert!((order.total_amount() - 44.98).abs() < 1e-9);
    }

    #[test]
    fn place_order_rejects_empty_lines() {
        let mut order = Order::empty(test_order_id());
        let err = execute(
            &mut order,
            &OrderCommand::PlaceOrder(PlaceOrder {
                warehouse_id: test_warehouse_id(),
                order_id: test_order_id(),
                order_number: "ORD-000001".to_string(),
                customer_id: test_customer_id(),
                lines: vec![],
                notes: String::new(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("at least one line") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn happy_path_runs_the_full_table() {
        let mut order = placed_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Picked,
            OrderStatus::Packed,
            OrderStatus::QualityChecked,
            OrderStatus::Shipped,
            OrderStatus::InTransit,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
        ] {
            transition(&mut order, next).unwrap();
            assert_eq!(order.status(), next);
        }
        assert!(order.actual_delivery().is_some());
    }

    #[test]
    fn shipping_stamps_estimated_delivery() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Confirmed).unwrap();
        transition(&mut order, OrderStatus::Processing).unwrap();
        transition(&mut order, OrderStatus::Picked).unwrap();
        transition(&mut order, OrderStatus::Packed).unwrap();
        transition(&mut order, OrderStatus::QualityChecked).unwrap();
        assert!(order.estimated_delivery().is_none());

        transition(&mut order, OrderStatus::Shipped).unwrap();
        assert_eq!(order.estimated_delivery(), Some(test_time() + Duration::days(3)));
    }

    #[test]
    fn skipping_stages_is_illegal() {
        let mut order = placed_order();
        let err = transition(&mut order, OrderStatus::Shipped).unwrap_err();
        match err {
            DomainError::IllegalTransition { from, to } => {
                assert_eq!(from, "pending");
                assert_eq!(to, "shipped");
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn hold_and_resume() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Confirmed).unwrap();
        transition(&mut order, OrderStatus::OnHold).unwrap();
        transition(&mut order, OrderStatus::Confirmed).unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[test]
    fn cancel_before_shipping() {
        let mut order = placed_order();
        transition(&mut order, OrderStatus::Confirmed).unwrap();

        execute(
            &mut order,
            &OrderCommand::CancelOrder(CancelOrder {
                warehouse_id: test_warehouse_id(),
                order_id: test_order_id(),
                reason: "customer request".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
    }

    #[test]
    fn cannot_cancel_after_shipping() {
        let mut order = placed_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Picked,
            OrderStatus::Packed,
            OrderStatus::QualityChecked,
            OrderStatus::Shipped,
        ] {
            transition(&mut order, next).unwrap();
        }

        let err = execute(
            &mut order,
            &OrderCommand::CancelOrder(CancelOrder {
                warehouse_id: test_warehouse_id(),
                order_id: test_order_id(),
                reason: "too late".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::IllegalTransition { from, .. } => assert_eq!(from, "shipped"),
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn refund_path_from_cancelled_and_returned() {
        let mut cancelled = placed_order();
        execute(
            &mut cancelled,
            &OrderCommand::CancelOrder(CancelOrder {
                warehouse_id: test_warehouse_id(),
                order_id: test_order_id(),
                reason: "customer request".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        transition(&mut cancelled, OrderStatus::Refunded).unwrap();
        assert!(cancelled.status().is_terminal());

        let mut delivered = placed_order();
        for next in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Picked,
            OrderStatus::Packed,
            OrderStatus::QualityChecked,
            OrderStatus::Shipped,
            OrderStatus::InTransit,
            OrderStatus::OutForDelivery,
            OrderStatus::Delivered,
            OrderStatus::Returned,
            OrderStatus::Refunded,
        ] {
            transition(&mut delivered, next).unwrap();
        }
        assert_eq!(delivered.status(), OrderStatus::Refunded);
    }

    #[test]
    fn link_fulfillment_artifacts() {
        let mut order = placed_order();
        execute(
            &mut order,
            &OrderCommand::LinkFulfillment(LinkFulfillment {
                warehouse_id: test_warehouse_id(),
                order_id: test_order_id(),
                link: FulfillmentLink::TrackingNumber("TRK-12345".to_string()),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(order.tracking_number(), Some("TRK-12345"));
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let order = placed_order();
        let version_before = order.version();

        let cmd = OrderCommand::TransitionStatus(TransitionStatus {
            warehouse_id: test_warehouse_id(),
            order_id: test_order_id(),
            next: OrderStatus::Confirmed,
            occurred_at: test_time(),
        });
        let events1 = order.handle(&cmd).unwrap();
        let events2 = order.handle(&cmd).unwrap();

        assert_eq!(order.version(), version_before);
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(events1, events2);
    }

    #[test]
    fn apply_is_deterministic() {
        let placed = OrderEvent::OrderPlaced(OrderPlaced {
            warehouse_id: test_warehouse_id(),
            order_id: test_order_id(),
            order_number: "ORD-000001".to_string(),
            customer_id: test_customer_id(),
            lines: vec![OrderLine {
                line_no: 1,
                product_id: test_product_id(),
                quantity: 1,
                unit_price: 10.0,
            }],
            total_amount: 10.0,
            notes: String::new(),
            occurred_at: test_time(),
        });
        let confirmed = OrderEvent::OrderStatusChanged(OrderStatusChanged {
            warehouse_id: test_warehouse_id(),
            order_id: test_order_id(),
            from: OrderStatus::Pending,
            to: OrderStatus::Confirmed,
            estimated_delivery: None,
            actual_delivery: None,
            occurred_at: test_time(),
        });

        let mut a = Order::empty(test_order_id());
        a.apply(&placed);
        a.apply(&confirmed);

        let mut b = Order::empty(test_order_id());
        b.apply(&placed);
        b.apply(&confirmed);

        assert_eq!(a, b);
        assert_eq!(a.version(), 2);
    }
}
