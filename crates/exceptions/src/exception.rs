use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, WarehouseId};
use stockpilot_events::Event;
use stockpilot_orders::OrderId;

/// Queue that takes exceptions needing immediate attention.
pub const URGENT_QUEUE: &str = "support_urgent";

/// Exception identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionId(pub AggregateId);

impl ExceptionId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ExceptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionType {
    DeliveryFailed,
    Damaged,
    Lost,
    Delayed,
    WrongAddress,
    Refused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExceptionStatus {
    Open,
    InProgress,
    Escalated,
    Resolved,
    Closed,
}

impl ExceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionStatus::Open => "open",
            ExceptionStatus::InProgress => "in_progress",
            ExceptionStatus::Escalated => "escalated",
            ExceptionStatus::Resolved => "resolved",
            ExceptionStatus::Closed => "closed",
        }
    }

    /// An exception counts against the per-tracking-number uniqueness rule
    /// until it is resolved.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ExceptionStatus::Open | ExceptionStatus::InProgress | ExceptionStatus::Escalated
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionType {
    Reship,
    Refund,
    AddressCorrected,
    RecoveredAndDelivered,
    ClaimFiled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionEfficiency {
    Excellent,
    Good,
    Average,
    Poor,
}

/// Read-side metric: how quickly an exception was resolved.
pub fn resolution_efficiency(hours: i64) -> ResolutionEfficiency {
    if hours <= 24 {
        ResolutionEfficiency::Excellent
    } else if hours <= 72 {
        ResolutionEfficiency::Good
    } else if hours <= 168 {
        ResolutionEfficiency::Average
    } else {
        ResolutionEfficiency::Poor
    }
}

/// Aggregate root: DeliveryException.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryException {
    id: ExceptionId,
    warehouse_id: Option<WarehouseId>,
    order_id: Option<OrderId>,
    exception_number: String,
    tracking_number: String,
    exception_type: Option<ExceptionType>,
    severity: ExceptionSeverity,
    priority: Priority,
    status: ExceptionStatus,
    description: String,
    assigned_to: Option<String>,
    resolution_type: Option<ResolutionType>,
    resolution_notes: String,
    resolution_duration_hours: Option<i64>,
    reported_at: Option<DateTime<Utc>>,
    resolved_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl DeliveryException {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ExceptionId) -> Self {
        Self {
            id,
            warehouse_id: None,
            order_id: None,
            exception_number: String::new(),
            tracking_number: String::new(),
            exception_type: None,
            severity: ExceptionSeverity::Low,
            priority: Priority::Normal,
            status: ExceptionStatus::Open,
            description: String::new(),
            assigned_to: None,
            resolution_type: None,
            resolution_notes: String::new(),
            resolution_duration_hours: None,
            reported_at: None,
            resolved_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ExceptionId {
        self.id
    }

    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn status(&self) -> ExceptionStatus {
        self.status
    }

    pub fn severity(&self) -> ExceptionSeverity {
        self.severity
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn assigned_to(&self) -> Option<&str> {
        self.assigned_to.as_deref()
    }

    pub fn resolution_type(&self) -> Option<ResolutionType> {
        self.resolution_type
    }

    pub fn resolution_duration_hours(&self) -> Option<i64> {
        self.resolution_duration_hours
    }

    /// Critical severity or urgent priority skips the triage queue.
    pub fn requires_immediate_attention(severity: ExceptionSeverity, priority: Priority) -> bool {
        severity == ExceptionSeverity::Critical || priority == Priority::Urgent
    }
}

impl AggregateRoot for DeliveryException {
    type Id = ExceptionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenException.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenException {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub exception_number: String,
    pub tracking_number: String,
    pub order_id: OrderId,
    pub exception_type: ExceptionType,
    pub severity: ExceptionSeverity,
    pub priority: Priority,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignException.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignException {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub assignee: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: EscalateException.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalateException {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ResolveException.
///
/// `replacement_tracking_number` is required for `Reship` resolutions; the
/// application layer uses it to re-enter the fulfillment pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveException {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub resolution_type: ResolutionType,
    pub notes: String,
    pub replacement_tracking_number: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CloseException.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseException {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionCommand {
    OpenException(OpenException),
    AssignException(AssignException),
    EscalateException(EscalateException),
    ResolveException(ResolveException),
    CloseException(CloseException),
}

/// Event: ExceptionOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionOpened {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub exception_number: String,
    pub tracking_number: String,
    pub order_id: OrderId,
    pub exception_type: ExceptionType,
    pub severity: ExceptionSeverity,
    pub priority: Priority,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExceptionAssigned (assignment puts the exception in progress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionAssigned {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub assignee: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExceptionEscalated (priority forced to urgent).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionEscalated {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExceptionResolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionResolved {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub resolution_type: ResolutionType,
    pub notes: String,
    pub replacement_tracking_number: Option<String>,
    pub resolution_duration_hours: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ExceptionClosed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionClosed {
    pub warehouse_id: WarehouseId,
    pub exception_id: ExceptionId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExceptionEvent {
    ExceptionOpened(ExceptionOpened),
    ExceptionAssigned(ExceptionAssigned),
    ExceptionEscalated(ExceptionEscalated),
    ExceptionResolved(ExceptionResolved),
    ExceptionClosed(ExceptionClosed),
}

impl Event for ExceptionEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ExceptionEvent::ExceptionOpened(_) => "exceptions.exception.opened",
            ExceptionEvent::ExceptionAssigned(_) => "exceptions.exception.assigned",
            ExceptionEvent::ExceptionEscalated(_) => "exceptions.exception.escalated",
            ExceptionEvent::ExceptionResolved(_) => "exceptions.exception.resolved",
            ExceptionEvent::ExceptionClosed(_) => "exceptions.exception.closed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ExceptionEvent::ExceptionOpened(e) => e.occurred_at,
            ExceptionEvent::ExceptionAssigned(e) => e.occurred_at,
            ExceptionEvent::ExceptionEscalated(e) => e.occurred_at,
            ExceptionEvent::ExceptionResolved(e) => e.occurred_at,
            ExceptionEvent::ExceptionClosed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for DeliveryException {
    type Command = ExceptionCommand;
    type Event = ExceptionEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ExceptionEvent::ExceptionOpened(e) => {
                self.id = e.exception_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.order_id = Some(e.order_id);
                self.exception_number = e.exception_number.clone();
                self.tracking_number = e.tracking_number.clone();
                self.exception_type = Some(e.exception_type);
                self.severity = e.severity;
                self.priority = e.priority;
                self.status = ExceptionStatus::Open;
                self.description = e.description.clone();
                self.reported_at = Some(e.occurred_at);
                self.created = true;
            }
            ExceptionEvent::ExceptionAssigned(e) => {
                self.assigned_to = Some(e.assignee.clone());
                self.status = ExceptionStatus::InProgress;
            }
            ExceptionEvent::ExceptionEscalated(_) => {
                self.status = ExceptionStatus::Escalated;
                self.priority = Priority::Urgent;
            }
            ExceptionEvent::ExceptionResolved(e) => {
                self.status = ExceptionStatus::Resolved;
                self.resolution_type = Some(e.resolution_type);
                self.resolution_notes = e.notes.clone();
                self.resolution_duration_hours = Some(e.resolution_duration_hours);
                self.resolved_at = Some(e.occurred_at);
            }
            ExceptionEvent::ExceptionClosed(_) => {
                self.status = ExceptionStatus::Closed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ExceptionCommand::OpenException(cmd) => self.handle_open(cmd),
            ExceptionCommand::AssignException(cmd) => self.handle_assign(cmd),
            ExceptionCommand::EscalateException(cmd) => self.handle_escalate(cmd),
            ExceptionCommand::ResolveException(cmd) => self.handle_resolve(cmd),
            ExceptionCommand::CloseException(cmd) => self.handle_close(cmd),
        }
    }
}

impl DeliveryException {
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

    fn handle_open(&self, cmd: &OpenException) -> Result<Vec<ExceptionEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("exception already exists"));
        }
        if cmd.tracking_number.trim().is_empty() {
            return Err(DomainError::validation("tracking number cannot be empty"));
        }
        if cmd.description.trim().is_empty() {
            return Err(DomainError::validation("description cannot be empty"));
        }

        let mut events = vec![ExceptionEvent::ExceptionOpened(ExceptionOpened {
            warehouse_id: cmd.warehouse_id,
            exception_id: cmd.exception_id,
            exception_number: cmd.exception_number.clone(),
            tracking_number: cmd.tracking_number.clone(),
            order_id: cmd.order_id,
            exception_type: cmd.exception_type,
            severity: cmd.severity,
            priority: cmd.priority,
            description: cmd.description.clone(),
            occurred_at: cmd.occurred_at,
        })];

        if Self::requires_immediate_attention(cmd.severity, cmd.priority) {
            events.push(ExceptionEvent::ExceptionAssigned(ExceptionAssigned {
                warehouse_id: cmd.warehouse_id,
                exception_id: cmd.exception_id,
                assignee: URGENT_QUEUE.to_string(),
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }

    fn handle_assign(&self, cmd: &AssignException) -> Result<Vec<ExceptionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        // Assigning a resolved exception reopens it; a closed one stays closed.
        if self.status == ExceptionStatus::Closed {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ExceptionStatus::InProgress.as_str(),
            ));
        }
        if cmd.assignee.trim().is_empty() {
            return Err(DomainError::validation("assignee cannot be empty"));
        }

        Ok(vec![ExceptionEvent::ExceptionAssigned(ExceptionAssigned {
            warehouse_id: cmd.warehouse_id,
            exception_id: cmd.exception_id,
            assignee: cmd.assignee.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_escalate(&self, cmd: &EscalateException) -> Result<Vec<ExceptionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !matches!(
            self.status,
            ExceptionStatus::Open | ExceptionStatus::InProgress
        ) {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ExceptionStatus::Escalated.as_str(),
            ));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("escalation reason cannot be empty"));
        }

        Ok(vec![ExceptionEvent::ExceptionEscalated(ExceptionEscalated {
            warehouse_id: cmd.warehouse_id,
            exception_id: cmd.exception_id,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_resolve(&self, cmd: &ResolveException) -> Result<Vec<ExceptionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if !self.status.is_active() {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ExceptionStatus::Resolved.as_str(),
            ));
        }
        if cmd.resolution_type == ResolutionType::Reship {
            match &cmd.replacement_tracking_number {
                Some(tn) if !tn.trim().is_empty() => {}
                _ => {
                    return Err(DomainError::validation(
                        "reship resolution requires a replacement tracking number",
                    ));
                }
            }
        }

        let reported_at = self
            .reported_at
            .ok_or_else(|| DomainError::invariant("exception has no report timestamp"))?;
        let resolution_duration_hours =
            (cmd.occurred_at - reported_at).num_hours().max(0);

        Ok(vec![ExceptionEvent::ExceptionResolved(ExceptionResolved {
            warehouse_id: cmd.warehouse_id,
            exception_id: cmd.exception_id,
            resolution_type: cmd.resolution_type,
            notes: cmd.notes.clone(),
            replacement_tracking_number: cmd.replacement_tracking_number.clone(),
            resolution_duration_hours,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_close(&self, cmd: &CloseException) -> Result<Vec<ExceptionEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != ExceptionStatus::Resolved {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ExceptionStatus::Closed.as_str(),
            ));
        }

        Ok(vec![ExceptionEvent::ExceptionClosed(ExceptionClosed {
            warehouse_id: cmd.warehouse_id,
            exception_id: cmd.exception_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
