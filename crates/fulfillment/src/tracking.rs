use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, WarehouseId};
use stockpilot_events::Event;

use crate::shipment::ShipmentId;

/// Tracking log identifier (one log per tracking number).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackingLogId(pub AggregateId);

impl TrackingLogId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for TrackingLogId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Milestone events get surfaced to customers; the rest are carrier noise.
pub fn is_milestone_event(event_type: &str) -> bool {
    matches!(
        event_type,
        "SHIPPED" | "OUT_FOR_DELIVERY" | "DELIVERED" | "EXCEPTION"
    )
}

/// One entry in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub event_type: String,
    pub description: String,
    pub location: String,
    pub milestone: bool,
    pub event_time: DateTime<Utc>,
}

/// Aggregate root: TrackingLog.
///
/// An append-only, time-ordered log of carrier scan events. Entries never
/// change once appended; out-of-order arrivals are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingLog {
    id: TrackingLogId,
    warehouse_id: Option<WarehouseId>,
    shipment_id: Option<ShipmentId>,
    tracking_number: String,
    entries: Vec<TrackingEntry>,
    version: u64,
    created: bool,
}

impl TrackingLog {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: TrackingLogId) -> Self {
        Self {
            id,
            warehouse_id: None,
            shipment_id: None,
            tracking_number: String::new(),
            entries: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> TrackingLogId {
        self.id
    }

    pub fn tracking_number(&self) -> &str {
        &self.tracking_number
    }

    pub fn shipment_id(&self) -> Option<ShipmentId> {
        self.shipment_id
    }

    pub fn entries(&self) -> &[TrackingEntry] {
        &self.entries
    }

    pub fn latest_entry(&self) -> Option<&TrackingEntry> {
        self.entries.last()
    }

    pub fn milestones(&self) -> impl Iterator<Item = &TrackingEntry> {
        self.entries.iter().filter(|e| e.milestone)
    }
}

impl AggregateRoot for TrackingLog {
    type Id = TrackingLogId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: StartTracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTracking {
    pub warehouse_id: WarehouseId,
    pub tracking_log_id: TrackingLogId,
    pub tracking_number: String,
    pub shipment_id: ShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AppendTrackingEvent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendTrackingEvent {
    pub warehouse_id: WarehouseId,
    pub tracking_log_id: TrackingLogId,
    pub event_type: String,
    pub description: String,
    pub location: String,
    pub event_time: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingLogCommand {
    StartTracking(StartTracking),
    AppendTrackingEvent(AppendTrackingEvent),
}

/// Event: TrackingStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingStarted {
    pub warehouse_id: WarehouseId,
    pub tracking_log_id: TrackingLogId,
    pub tracking_number: String,
    pub shipment_id: ShipmentId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TrackingEventAppended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEventAppended {
    pub warehouse_id: WarehouseId,
    pub tracking_log_id: TrackingLogId,
    pub event_type: String,
    pub description: String,
    pub location: String,
    pub milestone: bool,
    pub event_time: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackingLogEvent {
    TrackingStarted(TrackingStarted),
    TrackingEventAppended(TrackingEventAppended),
}

impl Event for TrackingLogEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TrackingLogEvent::TrackingStarted(_) => "fulfillment.tracking.started",
            TrackingLogEvent::TrackingEventAppended(_) => "fulfillment.tracking.event_appended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TrackingLogEvent::TrackingStarted(e) => e.occurred_at,
            TrackingLogEvent::TrackingEventAppended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TrackingLog {
    type Command = TrackingLogCommand;
    type Event = TrackingLogEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TrackingLogEvent::TrackingStarted(e) => {
                self.id = e.tracking_log_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.shipment_id = Some(e.shipment_id);
                self.tracking_number = e.tracking_number.clone();
                self.created = true;
            }
            TrackingLogEvent::TrackingEventAppended(e) => {
                self.entries.push(TrackingEntry {
                    event_type: e.event_type.clone(),
                    description: e.description.clone(),
                    location: e.location.clone(),
                    milestone: e.milestone,
                    event_time: e.event_time,
                });
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            TrackingLogCommand::StartTracking(cmd) => self.handle_start(cmd),
            TrackingLogCommand::AppendTrackingEvent(cmd) => self.handle_append(cmd),
        }
    }
}

impl TrackingLog {
    fn handle_start(&self, cmd: &StartTracking) -> Result<Vec<TrackingLogEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("tracking log already exists"));
        }
        if cmd.tracking_number.trim().is_empty() {
            return Err(DomainError::validation("tracking number cannot be empty"));
        }

        Ok(vec![TrackingLogEvent::TrackingStarted(TrackingStarted {
            warehouse_id: cmd.warehouse_id,
            tracking_log_id: cmd.tracking_log_id,
            tracking_number: cmd.tracking_number.clone(),
            shipment_id: cmd.shipment_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_append(&self, cmd: &AppendTrackingEvent) -> Result<Vec<TrackingLogEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.warehouse_id != Some(cmd.warehouse_id) {
            return Err(DomainError::invariant("warehouse mismatch"));
        }
        if cmd.event_type.trim().is_empty() {
            return Err(DomainError::validation("event type cannot be empty"));
        }
        // Time-ordered append: never allow an entry to predate the log tail.
        if let Some(last) = self.entries.last() {
            if cmd.event_time < last.event_time {
                return Err(DomainError::validation(
                    "tracking event predates the latest log entry",
                ));
            }
        }

        Ok(vec![TrackingLogEvent::TrackingEventAppended(
            TrackingEventAppended {
                warehouse_id: cmd.warehouse_id,
                tracking_log_id: cmd.tracking_log_id,
                event_type: cmd.event_type.clone(),
                description: cmd.description.clone(),
                location: cmd.location.clone(),
                milestone: is_milestone_event(&cmd.event_type),
                event_time: cmd.event_time,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use stockpilot_events::execute;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(uuid::Uuid::from_u128(1))
    }

    fn test_log_id() -> TrackingLogId {
        TrackingLogId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn started_log() -> TrackingLog {
        let mut log = TrackingLog::empty(test_log_id());
        execute(
            &mut log,
            &TrackingLogCommand::StartTracking(StartTracking {
                warehouse_id: test_warehouse_id(),
                tracking_log_id: test_log_id(),
                tracking_number: "TRK-0001".to_string(),
                shipment_id: ShipmentId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3))),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        log
    }

    fn append(log: &mut TrackingLog, event_type: &str, event_time: DateTime<Utc>) -> Result<Vec<TrackingLogEvent>, DomainError> {
        execute(
            log,
            &TrackingLogCommand::AppendTrackingEvent(AppendTrackingEvent {
                warehouse_id: test_warehouse_id(),
                tracking_log_id: test_log_id(),
                event_type: event_type.to_string(),
                description: "scan".to_string(),
                location: "HUB-1".to_string(),
                event_time,
                occurred_at: event_time,
            }),
        )
    }

    #[test]
    fn milestones_are_derived_from_event_type() {
        let mut log = started_log();
        append(&mut log, "LABEL_CREATED", test_time()).unwrap();
        append(&mut log, "SHIPPED", test_time() + Duration::hours(1)).unwrap();
        append(&mut log, "ARRIVED_AT_HUB", test_time() + Duration::hours(2)).unwrap();
        append(&mut log, "DELIVERED", test_time() + Duration::hours(30)).unwrap();

        assert_eq!(log.entries().len(), 4);
        let milestones: Vec<_> = log.milestones().map(|e| e.event_type.as_str()).collect();
        assert_eq!(milestones, vec!["SHIPPED", "DELIVERED"]);
    }

    #[test]
    fn out_of_order_events_are_rejected() {
        let mut log = started_log();
        append(&mut log, "SHIPPED", test_time() + Duration::hours(5)).unwrap();

        let err = append(&mut log, "ARRIVED_AT_HUB", test_time()).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("predates") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn same_timestamp_is_allowed() {
        // Two scans in the same second must both land.
        let mut log = started_log();
        append(&mut log, "SHIPPED", test_time()).unwrap();
        append(&mut log, "IN_TRANSIT", test_time()).unwrap();
        assert_eq!(log.entries().len(), 2);
    }
}
