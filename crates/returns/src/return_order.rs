use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ProductId, WarehouseId};
use stockpilot_events::Event;
use stockpilot_orders::OrderId;

/// Return order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnId(pub AggregateId);

impl ReturnId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReturnId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnReason {
    Damaged,
    WrongItem,
    Defective,
    NotAsDescribed,
    ChangedMind,
    ArrivedLate,
}

impl ReturnReason {
    /// Damaged and wrong-item returns are approved without manual review.
    pub fn auto_approves(&self) -> bool {
        matches!(self, ReturnReason::Damaged | ReturnReason::WrongItem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Requested,
    Approved,
    Rejected,
    Received,
    Inspecting,
    Processing,
    Completed,
    Cancelled,
}

impl ReturnStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnStatus::Requested => "requested",
            ReturnStatus::Approved => "approved",
            ReturnStatus::Rejected => "rejected",
            ReturnStatus::Received => "received",
            ReturnStatus::Inspecting => "inspecting",
            ReturnStatus::Processing => "processing",
            ReturnStatus::Completed => "completed",
            ReturnStatus::Cancelled => "cancelled",
        }
    }

    /// A return counts against the one-active-return-per-order rule until it
    /// reaches a terminal state.
    pub fn is_active(&self) -> bool {
        !matches!(
            self,
            ReturnStatus::Rejected | ReturnStatus::Completed | ReturnStatus::Cancelled
        )
    }

    /// Restocking is only sensible while goods are physically in hand and
    /// still under inspection.
    pub fn allows_restock(&self) -> bool {
        matches!(self, ReturnStatus::Received | ReturnStatus::Inspecting)
    }
}

/// Condition assessed per restocked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCondition {
    New,
    LikeNew,
    Good,
    Fair,
    Poor,
    Damaged,
    Refurbished,
}

impl ItemCondition {
    /// Damaged and poor-condition goods never go back on the shelf as-is.
    pub fn is_sellable(&self) -> bool {
        !matches!(self, ItemCondition::Poor | ItemCondition::Damaged)
    }
}

/// One returned order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnLine {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: f64,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Aggregate root: ReturnOrder.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnOrder {
    id: ReturnId,
    warehouse_id: Option<WarehouseId>,
    order_id: Option<OrderId>,
    return_number: String,
    reason: Option<ReturnReason>,
    status: ReturnStatus,
    lines: Vec<ReturnLine>,
    restocked_quantity: i64,
    refund_amount: f64,
    store_credit: f64,
    shipping_refund: f64,
    restocking_fee: f64,
    total_refund: f64,
    received_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ReturnOrder {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReturnId) -> Self {
        Self {
            id,
            warehouse_id: None,
            order_id: None,
            return_number: String::new(),
            reason: None,
            status: ReturnStatus::Requested,
            lines: Vec::new(),
            restocked_quantity: 0,
            refund_amount: 0.0,
            store_credit: 0.0,
            shipping_refund: 0.0,
            restocking_fee: 0.0,
            total_refund: 0.0,
            received_at: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReturnId {
        self.id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn reason(&self) -> Option<ReturnReason> {
        self.reason
    }

    pub fn lines(&self) -> &[ReturnLine] {
        &self.lines
    }

    pub fn restocked_quantity(&self) -> i64 {
        self.restocked_quantity
    }

    pub fn total_refund(&self) -> f64 {
        self.total_refund
    }

    /// Total quantity across all return lines.
    pub fn total_quantity(&self) -> i64 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

impl AggregateRoot for ReturnOrder {
    type Id = ReturnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RequestReturn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestReturn {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub return_number: String,
    pub order_id: OrderId,
    pub reason: ReturnReason,
    pub lines: Vec<ReturnLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveReturn {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectReturn {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkReceived {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartInspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInspection {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub inspector: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordRestock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRestock {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub condition: ItemCondition,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkRepaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkRepaired {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetRefundBreakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRefundBreakdown {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub refund_amount: f64,
    pub store_credit: f64,
    pub shipping_refund: f64,
    pub restocking_fee: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteReturn {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CancelReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelReturn {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnCommand {
    RequestReturn(RequestReturn),
    ApproveReturn(ApproveReturn),
    RejectReturn(RejectReturn),
    MarkReceived(MarkReceived),
    StartInspection(StartInspection),
    RecordRestock(RecordRestock),
    MarkRepaired(MarkRepaired),
    SetRefundBreakdown(SetRefundBreakdown),
    CompleteReturn(CompleteReturn),
    CancelReturn(CancelReturn),
}

/// Event: ReturnRequested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRequested {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub return_number: String,
    pub order_id: OrderId,
    pub reason: ReturnReason,
    pub lines: Vec<ReturnLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnApproved {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub auto_approved: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnRejected {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnReceived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReceived {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InspectionStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionStarted {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub inspector: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRestocked.
///
/// `sellable` is derived from the assessed condition at decision time so the
/// inventory side can act on the event without re-deriving policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRestocked {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub condition: ItemCondition,
    pub sellable: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemRepaired (condition upgraded to refurbished, sellable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRepaired {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProcessingStarted (all returned goods accounted for).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStarted {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RefundBreakdownSet.
///
/// `total_refund` is computed at decision time: refund + credit + shipping
/// minus the restocking fee, floored at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefundBreakdownSet {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub refund_amount: f64,
    pub store_credit: f64,
    pub shipping_refund: f64,
    pub restocking_fee: f64,
    pub total_refund: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnCompleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnCompleted {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub total_refund: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnCancelled {
    pub warehouse_id: WarehouseId,
    pub return_id: ReturnId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReturnEvent {
    ReturnRequested(ReturnRequested),
    ReturnApproved(ReturnApproved),
    ReturnRejected(ReturnRejected),
    ReturnReceived(ReturnReceived),
    InspectionStarted(InspectionStarted),
    ItemRestocked(ItemRestocked),
    ItemRepaired(ItemRepaired),
    ProcessingStarted(ProcessingStarted),
    RefundBreakdownSet(RefundBreakdownSet),
    ReturnCompleted(ReturnCompleted),
    ReturnCancelled(ReturnCancelled),
}

impl Event for ReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnEvent::ReturnRequested(_) => "returns.return.requested",
            ReturnEvent::ReturnApproved(_) => "returns.return.approved",
            ReturnEvent::ReturnRejected(_) => "returns.return.rejected",
            ReturnEvent::ReturnReceived(_) => "returns.return.received",
            ReturnEvent::InspectionStarted(_) => "returns.return.inspection_started",
            ReturnEvent::ItemRestocked(_) => "returns.return.item_restocked",
            ReturnEvent::ItemRepaired(_) => "returns.return.item_repaired",
            ReturnEvent::ProcessingStarted(_) => "returns.return.processing_started",
            ReturnEvent::RefundBreakdownSet(_) => "returns.return.refund_breakdown_set",
            ReturnEvent::ReturnCompleted(_) => "returns.return.completed",
            ReturnEvent::ReturnCancelled(_) => "returns.return.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReturnEvent::ReturnRequested(e) => e.occurred_at,
            ReturnEvent::ReturnApproved(e) => e.occurred_at,
            ReturnEvent::ReturnRejected(e) => e.occurred_at,
            ReturnEvent::ReturnReceived(e) => e.occurred_at,
            ReturnEvent::InspectionStarted(e) => e.occurred_at,
            ReturnEvent::ItemRestocked(e) => e.occurred_at,
            ReturnEvent::ItemRepaired(e) => e.occurred_at,
            ReturnEvent::ProcessingStarted(e) => e.occurred_at,
            ReturnEvent::RefundBreakdownSet(e) => e.occurred_at,
            ReturnEvent::ReturnCompleted(e) => e.occurred_at,
            ReturnEvent::ReturnCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReturnOrder {
    type Command = ReturnCommand;
    type Event = ReturnEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReturnEvent::ReturnRequested(e) => {
                self.id = e.return_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.order_id = Some(e.order_id);
                self.return_number = e.return_number.clone();
                self.reason = Some(e.reason);
                self.status = ReturnStatus::Requested;
                self.lines = e.lines.clone();
                self.created = true;
            }
            ReturnEvent::ReturnApproved(_) => {
                self.status = ReturnStatus::Approved;
            }
            ReturnEvent::ReturnRejected(_) => {
                self.status = ReturnStatus::Rejected;
            }
            ReturnEvent::ReturnReceived(e) => {
                self.status = ReturnStatus::Received;
                self.received_at = Some(e.occurred_at);
            }
            ReturnEvent::InspectionStarted(_) => {
                self.status = ReturnStatus::Inspecting;
            }
            ReturnEvent::ItemRestocked(e) => {
                self.restocked_quantity += e.quantity;
            }
            ReturnEvent::ItemRepaired(_) => {}
            ReturnEvent::ProcessingStarted(_) => {
                self.status = ReturnStatus::Processing;
            }
            ReturnEvent::RefundBreakdownSet(e) => {
                self.refund_amount = e.refund_amount;
                self.store_credit = e.store_credit;
                self.shipping_refund = e.shipping_refund;
                self.restocking_fee = e.restocking_fee;
                self.total_refund = e.total_refund;
            }
            ReturnEvent::ReturnCompleted(e) => {
                self.status = ReturnStatus::Completed;
                self.completed_at = Some(e.occurred_at);
            }
            ReturnEvent::ReturnCancelled(_) => {
                self.status = ReturnStatus::Cancelled;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReturnCommand::RequestReturn(cmd) => self.handle_request(cmd),
            ReturnCommand::ApproveReturn(cmd) => self.handle_approve(cmd),
            ReturnCommand::RejectReturn(cmd) => self.handle_reject(cmd),
            ReturnCommand::MarkReceived(cmd) => self.handle_received(cmd),
            ReturnCommand::StartInspection(cmd) => self.handle_start_inspection(cmd),
            ReturnCommand::RecordRestock(cmd) => self.handle_restock(cmd),
            ReturnCommand::MarkRepaired(cmd) => self.handle_repaired(cmd),
            ReturnCommand::SetRefundBreakdown(cmd) => self.handle_refund_breakdown(cmd),
            ReturnCommand::CompleteReturn(cmd) => self.handle_complete(cmd),
            ReturnCommand::CancelReturn(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl ReturnOrder {
    fn ensure_created(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        Ok(())
    }

    fn ensure_warehouse(&self, warehouse_id: WarehouseId) -> Result<(), DomainError> {
        if !self.created {
            return Ok(());
        }
        if self.warehouse_id != Some(warehouse_id) {
            return Err(DomainError::invariant("warehouse mismatch"));
        }
        Ok(())
    }

    fn ensure_status(&self, expected: ReturnStatus, target: ReturnStatus) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                target.as_str(),
            ));
        }
        Ok(())
    }

    fn handle_request(&self, cmd: &RequestReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("return already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("a return needs at least one line"));
        }
        for line in &cmd.lines {
            if line.quantity <= 0 {
                return Err(DomainError::validation("line quantity must be positive"));
            }
            if line.unit_price < 0.0 {
                return Err(DomainError::validation("unit price cannot be negative"));
            }
        }

        let mut events = vec![ReturnEvent::ReturnRequested(ReturnRequested {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            return_number: cmd.return_number.clone(),
            order_id: cmd.order_id,
            reason: cmd.reason,
            lines: cmd.lines.clone(),
            occurred_at: cmd.occurred_at,
        })];

        if cmd.reason.auto_approves() {
            events.push(ReturnEvent::ReturnApproved(ReturnApproved {
                warehouse_id: cmd.warehouse_id,
                return_id: cmd.return_id,
                auto_approved: true,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_approve(&self, cmd: &ApproveReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_status(ReturnStatus::Requested, ReturnStatus::Approved)?;

        Ok(vec![ReturnEvent::ReturnApproved(ReturnApproved {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            auto_approved: false,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_status(ReturnStatus::Requested, ReturnStatus::Rejected)?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("rejection reason cannot be empty"));
        }

        Ok(vec![ReturnEvent::ReturnRejected(ReturnRejected {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_received(&self, cmd: &MarkReceived) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_status(ReturnStatus::Approved, ReturnStatus::Received)?;

        Ok(vec![ReturnEvent::ReturnReceived(ReturnReceived {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start_inspection(
        &self,
        cmd: &StartInspection,
    ) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_status(ReturnStatus::Received, ReturnStatus::Inspecting)?;
        if cmd.inspector.trim().is_empty() {
            return Err(DomainError::validation("inspector cannot be empty"));
        }

        Ok(vec![ReturnEvent::InspectionStarted(InspectionStarted {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            inspector: cmd.inspector.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restock(&self, cmd: &RecordRestock) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !self.status.allows_restock() {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ReturnStatus::Processing.as_str(),
            ));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("restock quantity must be positive"));
        }
        if !self.lines.iter().any(|l| l.product_id == cmd.product_id) {
            return Err(DomainError::validation(
                "product is not part of this return",
            ));
        }
        let remaining = self.total_quantity() - self.restocked_quantity;
        if cmd.quantity > remaining {
            return Err(DomainError::validation(
                "restock quantity exceeds remaining returned quantity",
            ));
        }

        let mut events = vec![ReturnEvent::ItemRestocked(ItemRestocked {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            condition: cmd.condition,
            sellable: cmd.condition.is_sellable(),
            occurred_at: cmd.occurred_at,
        })];

        if self.restocked_quantity + cmd.quantity >= self.total_quantity() {
            events.push(ReturnEvent::ProcessingStarted(ProcessingStarted {
                warehouse_id: cmd.warehouse_id,
                return_id: cmd.return_id,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_repaired(&self, cmd: &MarkRepaired) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !matches!(
            self.status,
            ReturnStatus::Inspecting | ReturnStatus::Processing
        ) {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                self.status.as_str(),
            ));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation("repaired quantity must be positive"));
        }
        if !self.lines.iter().any(|l| l.product_id == cmd.product_id) {
            return Err(DomainError::validation(
                "product is not part of this return",
            ));
        }

        Ok(vec![ReturnEvent::ItemRepaired(ItemRepaired {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_refund_breakdown(
        &self,
        cmd: &SetRefundBreakdown,
    ) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !self.status.is_active() || self.status == ReturnStatus::Requested {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                self.status.as_str(),
            ));
        }
        for amount in [
            cmd.refund_amount,
            cmd.store_credit,
            cmd.shipping_refund,
            cmd.restocking_fee,
        ] {
            if amount < 0.0 {
                return Err(DomainError::validation(
                    "refund breakdown amounts cannot be negative",
                ));
            }
        }

        let total = round2(
            (cmd.refund_amount + cmd.store_credit + cmd.shipping_refund - cmd.restocking_fee)
                .max(0.0),
        );

        Ok(vec![ReturnEvent::RefundBreakdownSet(RefundBreakdownSet {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            refund_amount: cmd.refund_amount,
            store_credit: cmd.store_credit,
            shipping_refund: cmd.shipping_refund,
            restocking_fee: cmd.restocking_fee,
            total_refund: total,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;
        self.ensure_status(ReturnStatus::Processing, ReturnStatus::Completed)?;

        Ok(vec![ReturnEvent::ReturnCompleted(ReturnCompleted {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
            total_refund: self.total_refund,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &CancelReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !matches!(
            self.status,
            ReturnStatus::Requested | ReturnStatus::Approved
        ) {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ReturnStatus::Cancelled.as_str(),
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("cancellation reason cannot be empty"));
        }

        Ok(vec![ReturnEvent::ReturnCancelled(ReturnCancelled {
            warehouse_id: cmd.warehouse_id,
            return_id: cmd.return_id,
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

    fn test_return_id() -> ReturnId {
        ReturnId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_order_id() -> OrderId {
        OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3)))
    }

    fn test_product_id() -> ProductId {
        ProductId::from_uuid(uuid::Uuid::from_u128(4))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn request(reason: ReturnReason) -> ReturnOrder {
        let mut ret = ReturnOrder::empty(test_return_id());
        execute(
            &mut ret,
            &ReturnCommand::RequestReturn(RequestReturn {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                return_number: "RET-000001".to_string(),
                order_id: test_order_id(),
                reason,
                lines: vec![ReturnLine {
                    product_id: test_product_id(),
                    quantity: 3,
                    unit_price: 20.0,
                }],
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        ret
    }

    fn received(reason: ReturnReason) -> ReturnOrder {
        let mut ret = request(reason);
        if ret.status() == ReturnStatus::Requested {
            execute(
                &mut ret,
                &ReturnCommand::ApproveReturn(ApproveReturn {
                    warehouse_id: test_warehouse_id(),
                    return_id: test_return_id(),
                    occurred_at: test_time(),
                }),
            )
            .unwrap();
        }
        execute(
            &mut ret,
            &ReturnCommand::MarkReceived(MarkReceived {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        ret
    }

    fn restock(ret: &mut ReturnOrder, quantity: i64, condition: ItemCondition) -> Vec<ReturnEvent> {
        execute(
            ret,
            &ReturnCommand::RecordRestock(RecordRestock {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                product_id: test_product_id(),
                quantity,
                condition,
                occurred_at: test_time(),
            }),
        )
        .unwrap()
    }

    #[test]
    fn damaged_returns_are_auto_approved() {
        let ret = request(ReturnReason::Damaged);
        assert_eq!(ret.status(), ReturnStatus::Approved);
    }

    #[test]
    fn changed_mind_waits_for_review() {
        let ret = request(ReturnReason::ChangedMind);
        assert_eq!(ret.status(), ReturnStatus::Requested);
    }

    #[test]
    fn restock_before_receipt_is_rejected() {
        let mut ret = request(ReturnReason::Damaged);
        let err = execute(
            &mut ret,
            &ReturnCommand::RecordRestock(RecordRestock {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                product_id: test_product_id(),
                quantity: 1,
                condition: ItemCondition::Good,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::IllegalTransition { from, .. } => assert_eq!(from, "approved"),
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn full_restock_starts_processing() {
        let mut ret = received(ReturnReason::Damaged);
        restock(&mut ret, 2, ItemCondition::Good);
        assert_eq!(ret.status(), ReturnStatus::Received);

        let events = restock(&mut ret, 1, ItemCondition::Damaged);
        assert_eq!(events.len(), 2);
        assert_eq!(ret.status(), ReturnStatus::Processing);
        assert_eq!(ret.restocked_quantity(), 3);
    }

    #[test]
    fn damaged_goods_are_not_sellable() {
        let mut ret = received(ReturnReason::Damaged);
        let events = restock(&mut ret, 1, ItemCondition::Damaged);
        match &events[0] {
            ReturnEvent::ItemRestocked(e) => assert!(!e.sellable),
            other => panic!("expected ItemRestocked, got {other:?}"),
        }
    }

    #[test]
    fn over_restock_is_rejected() {
        let mut ret = received(ReturnReason::Damaged);
        let err = execute(
            &mut ret,
            &ReturnCommand::RecordRestock(RecordRestock {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                product_id: test_product_id(),
                quantity: 4,
                condition: ItemCondition::Good,
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("exceeds remaining") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn refund_breakdown_sums_and_floors_at_zero() {
        let mut ret = received(ReturnReason::Damaged);
        restock(&mut ret, 3, ItemCondition::Good);

        execute(
            &mut ret,
            &ReturnCommand::SetRefundBreakdown(SetRefundBreakdown {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                refund_amount: 50.0,
                store_credit: 10.0,
                shipping_refund: 5.0,
                restocking_fee: 8.0,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(ret.total_refund(), 57.0);

        execute(
            &mut ret,
            &ReturnCommand::SetRefundBreakdown(SetRefundBreakdown {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                refund_amount: 1.0,
                store_credit: 0.0,
                shipping_refund: 0.0,
                restocking_fee: 8.0,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(ret.total_refund(), 0.0);
    }

    #[test]
    fn complete_requires_processing() {
        let mut ret = received(ReturnReason::Damaged);
        let err = execute(
            &mut ret,
            &ReturnCommand::CompleteReturn(CompleteReturn {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::IllegalTransition { from, to } => {
                assert_eq!(from, "received");
                assert_eq!(to, "completed");
            }
            other => panic!("expected IllegalTransition, got {other:?}"),
        }

        restock(&mut ret, 3, ItemCondition::Good);
        execute(
            &mut ret,
            &ReturnCommand::CompleteReturn(CompleteReturn {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(ret.status(), ReturnStatus::Completed);
    }

    #[test]
    fn cancel_only_before_receipt() {
        let mut ret = request(ReturnReason::ChangedMind);
        execute(
            &mut ret,
            &ReturnCommand::CancelReturn(CancelReturn {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                reason: "customer kept the item".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(ret.status(), ReturnStatus::Cancelled);

        let mut ret = received(ReturnReason::Damaged);
        let err = execute(
            &mut ret,
            &ReturnCommand::CancelReturn(CancelReturn {
                warehouse_id: test_warehouse_id(),
                return_id: test_return_id(),
                reason: "too late".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap_err();
        match err {
            DomainError::IllegalTransition { to, .. } => assert_eq!(to, "cancelled"),
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let ret = request(ReturnReason::ChangedMind);
        let before = ret.clone();
        let _ = ret.handle(&ReturnCommand::ApproveReturn(ApproveReturn {
            warehouse_id: test_warehouse_id(),
            return_id: test_return_id(),
            occurred_at: test_time(),
        }));
        assert_eq!(ret, before);
    }
}
