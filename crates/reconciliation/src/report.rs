use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, ProductId, WarehouseId};
use stockpilot_events::Event;

/// Reconciliation report identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub AggregateId);

impl ReportId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReportId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    InProgress,
    Completed,
    Approved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::InProgress => "in_progress",
            ReportStatus::Completed => "completed",
            ReportStatus::Approved => "approved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarianceType {
    Shortage,
    Overage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancySeverity {
    Low,
    Medium,
    High,
    Critical,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Counted minus expected. Negative means a shortage.
pub fn variance_type(expected: i64, counted: i64) -> Option<VarianceType> {
    match counted - expected {
        0 => None,
        d if d < 0 => Some(VarianceType::Shortage),
        _ => Some(VarianceType::Overage),
    }
}

/// Absolute value of the variance at the product's unit cost.
pub fn variance_value(expected: i64, counted: i64, unit_cost: f64) -> f64 {
    round2((counted - expected).unsigned_abs() as f64 * unit_cost)
}

/// Severity tiers by variance value, with an override: a count that finds a
/// product completely out of stock is never less than high severity.
pub fn variance_severity(value: f64, counted: i64) -> DiscrepancySeverity {
    let by_value = if value >= 1000.0 {
        DiscrepancySeverity::Critical
    } else if value >= 500.0 {
        DiscrepancySeverity::High
    } else if value >= 100.0 {
        DiscrepancySeverity::Medium
    } else {
        DiscrepancySeverity::Low
    };

    if counted == 0 {
        by_value.max(DiscrepancySeverity::High)
    } else {
        by_value
    }
}

/// Share of the expected quantity that counted clean, as a percentage. A
/// count with nothing expected is trivially accurate.
pub fn accuracy_rate(total_expected: i64, total_variance: i64) -> f64 {
    if total_expected <= 0 {
        return 100.0;
    }
    round2((total_expected - total_variance) as f64 / total_expected as f64 * 100.0)
}

/// Share of the expected quantity that went missing or appeared, as a
/// percentage.
pub fn variance_rate(total_expected: i64, total_variance: i64) -> f64 {
    if total_expected <= 0 {
        return 0.0;
    }
    round2(total_variance as f64 / total_expected as f64 * 100.0)
}

/// One count discrepancy recorded on a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Discrepancy {
    pub product_id: ProductId,
    pub location: String,
    pub expected_quantity: i64,
    pub counted_quantity: i64,
    pub variance_quantity: i64,
    pub variance_value: f64,
    pub variance_type: VarianceType,
    pub severity: DiscrepancySeverity,
    pub adjusted: bool,
}

/// Aggregate root: ReconciliationReport.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationReport {
    id: ReportId,
    warehouse_id: Option<WarehouseId>,
    report_number: String,
    counted_by: String,
    status: ReportStatus,
    discrepancies: Vec<Discrepancy>,
    total_expected_quantity: i64,
    accuracy_rate: f64,
    variance_rate: f64,
    approved_by: Option<String>,
    completed_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl ReconciliationReport {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ReportId) -> Self {
        Self {
            id,
            warehouse_id: None,
            report_number: String::new(),
            counted_by: String::new(),
            status: ReportStatus::InProgress,
            discrepancies: Vec::new(),
            total_expected_quantity: 0,
            accuracy_rate: 100.0,
            variance_rate: 0.0,
            approved_by: None,
            completed_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReportId {
        self.id
    }

    pub fn status(&self) -> ReportStatus {
        self.status
    }

    pub fn discrepancies(&self) -> &[Discrepancy] {
        &self.discrepancies
    }

    pub fn accuracy_rate(&self) -> f64 {
        self.accuracy_rate
    }

    pub fn variance_rate(&self) -> f64 {
        self.variance_rate
    }

    pub fn total_variance_quantity(&self) -> i64 {
        self.discrepancies
            .iter()
            .map(|d| d.variance_quantity.abs())
            .sum()
    }

    fn find_discrepancy(&self, product_id: ProductId, location: &str) -> Option<&Discrepancy> {
        self.discrepancies
            .iter()
            .find(|d| d.product_id == product_id && d.location == location)
    }
}

impl AggregateRoot for ReconciliationReport {
    type Id = ReportId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenReport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReport {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub report_number: String,
    pub counted_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDiscrepancy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDiscrepancy {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub product_id: ProductId,
    pub location: String,
    pub expected_quantity: i64,
    pub counted_quantity: i64,
    pub unit_cost: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteReport.
///
/// `total_expected_quantity` is the full scope of the count, including
/// products that counted clean.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteReport {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub total_expected_quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApproveReport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveReport {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub approved_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkDiscrepancyAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkDiscrepancyAdjusted {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub product_id: ProductId,
    pub location: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportCommand {
    OpenReport(OpenReport),
    RecordDiscrepancy(RecordDiscrepancy),
    CompleteReport(CompleteReport),
    ApproveReport(ApproveReport),
    MarkDiscrepancyAdjusted(MarkDiscrepancyAdjusted),
}

/// Event: ReportOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportOpened {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub report_number: String,
    pub counted_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscrepancyRecorded, carrying the derived variance figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecorded {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub product_id: ProductId,
    pub location: String,
    pub expected_quantity: i64,
    pub counted_quantity: i64,
    pub variance_quantity: i64,
    pub variance_value: f64,
    pub variance_type: VarianceType,
    pub severity: DiscrepancySeverity,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReportCompleted, carrying the derived report-level figures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportCompleted {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub total_expected_quantity: i64,
    pub total_variance_quantity: i64,
    pub discrepancy_count: usize,
    pub accuracy_rate: f64,
    pub variance_rate: f64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReportApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportApproved {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub approved_by: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: DiscrepancyAdjusted (a stock adjustment was issued for it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscrepancyAdjusted {
    pub warehouse_id: WarehouseId,
    pub report_id: ReportId,
    pub product_id: ProductId,
    pub location: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportEvent {
    ReportOpened(ReportOpened),
    DiscrepancyRecorded(DiscrepancyRecorded),
    ReportCompleted(ReportCompleted),
    ReportApproved(ReportApproved),
    DiscrepancyAdjusted(DiscrepancyAdjusted),
}

impl Event for ReportEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReportEvent::ReportOpened(_) => "reconciliation.report.opened",
            ReportEvent::DiscrepancyRecorded(_) => "reconciliation.report.discrepancy_recorded",
            ReportEvent::ReportCompleted(_) => "reconciliation.report.completed",
            ReportEvent::ReportApproved(_) => "reconciliation.report.approved",
            ReportEvent::DiscrepancyAdjusted(_) => "reconciliation.report.discrepancy_adjusted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReportEvent::ReportOpened(e) => e.occurred_at,
            ReportEvent::DiscrepancyRecorded(e) => e.occurred_at,
            ReportEvent::ReportCompleted(e) => e.occurred_at,
            ReportEvent::ReportApproved(e) => e.occurred_at,
            ReportEvent::DiscrepancyAdjusted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ReconciliationReport {
    type Command = ReportCommand;
    type Event = ReportEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReportEvent::ReportOpened(e) => {
                self.id = e.report_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.report_number = e.report_number.clone();
                self.counted_by = e.counted_by.clone();
                self.status = ReportStatus::InProgress;
                self.created = true;
            }
            ReportEvent::DiscrepancyRecorded(e) => {
                self.discrepancies.push(Discrepancy {
                    product_id: e.product_id,
                    location: e.location.clone(),
                    expected_quantity: e.expected_quantity,
                    counted_quantity: e.counted_quantity,
                    variance_quantity: e.variance_quantity,
                    variance_value: e.variance_value,
                    variance_type: e.variance_type,
                    severity: e.severity,
                    adjusted: false,
                });
            }
            ReportEvent::ReportCompleted(e) => {
                self.status = ReportStatus::Completed;
                self.total_expected_quantity = e.total_expected_quantity;
                self.accuracy_rate = e.accuracy_rate;
                self.variance_rate = e.variance_rate;
                self.completed_at = Some(e.occurred_at);
            }
            ReportEvent::ReportApproved(e) => {
                self.status = ReportStatus::Approved;
                self.approved_by = Some(e.approved_by.clone());
            }
            ReportEvent::DiscrepancyAdjusted(e) => {
                if let Some(d) = self
                    .discrepancies
                    .iter_mut()
                    .find(|d| d.product_id == e.product_id && d.location == e.location)
                {
                    d.adjusted = true;
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReportCommand::OpenReport(cmd) => self.handle_open(cmd),
            ReportCommand::RecordDiscrepancy(cmd) => self.handle_record(cmd),
            ReportCommand::CompleteReport(cmd) => self.handle_complete(cmd),
            ReportCommand::ApproveReport(cmd) => self.handle_approve(cmd),
            ReportCommand::MarkDiscrepancyAdjusted(cmd) => self.handle_adjusted(cmd),
        }
    }
}

impl ReconciliationReport {
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

    fn handle_open(&self, cmd: &OpenReport) -> Result<Vec<ReportEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("report already exists"));
        }
        if cmd.counted_by.trim().is_empty() {
            return Err(DomainError::validation("counter cannot be empty"));
        }

        Ok(vec![ReportEvent::ReportOpened(ReportOpened {
            warehouse_id: cmd.warehouse_id,
            report_id: cmd.report_id,
            report_number: cmd.report_number.clone(),
            counted_by: cmd.counted_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordDiscrepancy) -> Result<Vec<ReportEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != ReportStatus::InProgress {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ReportStatus::InProgress.as_str(),
            ));
        }
        if cmd.expected_quantity < 0 || cmd.counted_quantity < 0 {
            return Err(DomainError::validation("quantities cannot be negative"));
        }
        if cmd.unit_cost < 0.0 {
            return Err(DomainError::validation("unit cost cannot be negative"));
        }
        if self
            .find_discrepancy(cmd.product_id, &cmd.location)
            .is_some()
        {
            return Err(DomainError::conflict(
                "discrepancy already recorded for this product and location",
            ));
        }
        let Some(vtype) = variance_type(cmd.expected_quantity, cmd.counted_quantity) else {
            return Err(DomainError::validation(
                "counted quantity matches expected, nothing to record",
            ));
        };

        let value = variance_value(cmd.expected_quantity, cmd.counted_quantity, cmd.unit_cost);
        let severity = variance_severity(value, cmd.counted_quantity);

        Ok(vec![ReportEvent::DiscrepancyRecorded(DiscrepancyRecorded {
            warehouse_id: cmd.warehouse_id,
            report_id: cmd.report_id,
            product_id: cmd.product_id,
            location: cmd.location.clone(),
            expected_quantity: cmd.expected_quantity,
            counted_quantity: cmd.counted_quantity,
            variance_quantity: cmd.counted_quantity - cmd.expected_quantity,
            variance_value: value,
            variance_type: vtype,
            severity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteReport) -> Result<Vec<ReportEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != ReportStatus::InProgress {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ReportStatus::Completed.as_str(),
            ));
        }
        if cmd.total_expected_quantity < 0 {
            return Err(DomainError::validation(
                "total expected quantity cannot be negative",
            ));
        }

        let total_variance = self.total_variance_quantity();

        Ok(vec![ReportEvent::ReportCompleted(ReportCompleted {
            warehouse_id: cmd.warehouse_id,
            report_id: cmd.report_id,
            total_expected_quantity: cmd.total_expected_quantity,
            total_variance_quantity: total_variance,
            discrepancy_count: self.discrepancies.len(),
            accuracy_rate: accuracy_rate(cmd.total_expected_quantity, total_variance),
            variance_rate: variance_rate(cmd.total_expected_quantity, total_variance),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_approve(&self, cmd: &ApproveReport) -> Result<Vec<ReportEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != ReportStatus::Completed {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ReportStatus::Approved.as_str(),
            ));
        }
        if cmd.approved_by.trim().is_empty() {
            return Err(DomainError::validation("approver cannot be empty"));
        }

        Ok(vec![ReportEvent::ReportApproved(ReportApproved {
            warehouse_id: cmd.warehouse_id,
            report_id: cmd.report_id,
            approved_by: cmd.approved_by.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjusted(
        &self,
        cmd: &MarkDiscrepancyAdjusted,
    ) -> Result<Vec<ReportEvent>, DomainError> {
        self.ensure_created()?;
        self.ensure_warehouse(cmd.warehouse_id)?;

        if self.status != ReportStatus::Approved {
            return Err(DomainError::illegal_transition(
                self.status.as_str(),
                ReportStatus::Approved.as_str(),
            ));
        }
        let Some(d) = self.find_discrepancy(cmd.product_id, &cmd.location) else {
            return Err(DomainError::not_found());
        };
        if d.adjusted {
            return Err(DomainError::conflict("discrepancy already adjusted"));
        }

        Ok(vec![ReportEvent::DiscrepancyAdjusted(DiscrepancyAdjusted {
            warehouse_id: cmd.warehouse_id,
            report_id: cmd.report_id,
            product_id: cmd.product_id,
            location: cmd.location.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use stockpilot_events::execute;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(uuid::Uuid::from_u128(1))
    }

    fn test_report_id() -> ReportId {
        ReportId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_product_id() -> ProductId {
        ProductId::from_uuid(uuid::Uuid::from_u128(3))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn opened() -> ReconciliationReport {
        let mut report = ReconciliationReport::empty(test_report_id());
        execute(
            &mut report,
            &ReportCommand::OpenReport(OpenReport {
                warehouse_id: test_warehouse_id(),
                report_id: test_report_id(),
                report_number: "RPT-000001".to_string(),
                counted_by: "counter-1".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        report
    }

    fn record(
        report: &mut ReconciliationReport,
        product_id: ProductId,
        expected: i64,
        counted: i64,
        unit_cost: f64,
    ) -> Result<Vec<ReportEvent>, DomainError> {
        execute(
            report,
            &ReportCommand::RecordDiscrepancy(RecordDiscrepancy {
                warehouse_id: test_warehouse_id(),
                report_id: test_report_id(),
                product_id,
                location: "A-01-01".to_string(),
                expected_quantity: expected,
                counted_quantity: counted,
                unit_cost,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn severity_tiers_by_variance_value() {
        assert_eq!(variance_severity(1000.0, 5), DiscrepancySeverity::Critical);
        assert_eq!(variance_severity(999.99, 5), DiscrepancySeverity::High);
        assert_eq!(variance_severity(500.0, 5), DiscrepancySeverity::High);
        assert_eq!(variance_severity(100.0, 5), DiscrepancySeverity::Medium);
        assert_eq!(variance_severity(99.0, 5), DiscrepancySeverity::Low);
    }

    #[test]
    fn zero_count_shortage_is_at_least_high() {
        // A cheap product counted at zero still gets urgent attention.
        assert_eq!(variance_severity(10.0, 0), DiscrepancySeverity::High);
        // A valuable one keeps its critical tier.
        assert_eq!(variance_severity(2000.0, 0), DiscrepancySeverity::Critical);
    }

    #[test]
    fn discrepancy_carries_derived_figures() {
        let mut report = opened();
        let events = record(&mut report, test_product_id(), 40, 25, 12.5).unwrap();
        match &events[0] {
            ReportEvent::DiscrepancyRecorded(e) => {
                assert_eq!(e.variance_quantity, -15);
                assert_eq!(e.variance_type, VarianceType::Shortage);
                assert_eq!(e.variance_value, 187.5);
                assert_eq!(e.severity, DiscrepancySeverity::Medium);
            }
            other => panic!("expected DiscrepancyRecorded, got {other:?}"),
        }
    }

    #[test]
    fn clean_count_is_not_recordable() {
        let mut report = opened();
        let err = record(&mut report, test_product_id(), 10, 10, 5.0).unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("matches expected") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_product_location_is_a_conflict() {
        let mut report = opened();
        record(&mut report, test_product_id(), 10, 8, 5.0).unwrap();
        let err = record(&mut report, test_product_id(), 10, 9, 5.0).unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("already recorded") => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn completion_computes_accuracy_and_variance_rates() {
        let mut report = opened();
        record(&mut report, test_product_id(), 40, 25, 12.5).unwrap();
        record(
            &mut report,
            ProductId::from_uuid(uuid::Uuid::from_u128(9)),
            60,
            65,
            2.0,
        )
        .unwrap();

        execute(
            &mut report,
            &ReportCommand::CompleteReport(CompleteReport {
                warehouse_id: test_warehouse_id(),
                report_id: test_report_id(),
                total_expected_quantity: 200,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        // |−15| + |5| = 20 of 200 expected.
        assert_eq!(report.accuracy_rate(), 90.0);
        assert_eq!(report.variance_rate(), 10.0);
        assert_eq!(report.status(), ReportStatus::Completed);
    }

    #[test]
    fn empty_scope_is_trivially_accurate() {
        assert_eq!(accuracy_rate(0, 0), 100.0);
        assert_eq!(variance_rate(0, 0), 0.0);
    }

    #[test]
    fn recording_after_completion_is_rejected() {
        let mut report = opened();
        execute(
            &mut report,
            &ReportCommand::CompleteReport(CompleteReport {
                warehouse_id: test_warehouse_id(),
                report_id: test_report_id(),
                total_expected_quantity: 100,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = record(&mut report, test_product_id(), 10, 8, 5.0).unwrap_err();
        match err {
            DomainError::IllegalTransition { from, .. } => assert_eq!(from, "completed"),
            other => panic!("expected IllegalTransition, got {other:?}"),
        }
    }

    #[test]
    fn adjustment_requires_approval() {
        let mut report = opened();
        record(&mut report, test_product_id(), 10, 8, 5.0).unwrap();
        execute(
            &mut report,
            &ReportCommand::CompleteReport(CompleteReport {
                warehouse_id: test_warehouse_id(),
                report_id: test_report_id(),
                total_expected_quantity: 100,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let adjust = ReportCommand::MarkDiscrepancyAdjusted(MarkDiscrepancyAdjusted {
            warehouse_id: test_warehouse_id(),
            report_id: test_report_id(),
            product_id: test_product_id(),
            location: "A-01-01".to_string(),
            occurred_at: test_time(),
        });
        let err = report.handle(&adjust).unwrap_err();
        match err {
            DomainError::IllegalTransition { from, .. } => assert_eq!(from, "completed"),
            other => panic!("expected IllegalTransition, got {other:?}"),
        }

        execute(
            &mut report,
            &ReportCommand::ApproveReport(ApproveReport {
                warehouse_id: test_warehouse_id(),
                report_id: test_report_id(),
                approved_by: "supervisor-1".to_string(),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        execute(&mut report, &adjust).unwrap();
        assert!(report.discrepancies()[0].adjusted);

        // Double adjustment is a conflict.
        let err = report.handle(&adjust).unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("already adjusted") => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn rates_are_complementary(expected in 1i64..100_000, variance in 0i64..100_000) {
            let variance = variance.min(expected);
            let acc = accuracy_rate(expected, variance);
            let var = variance_rate(expected, variance);
            prop_assert!((acc + var - 100.0).abs() < 0.011);
            prop_assert!((0.0..=100.0).contains(&acc));
        }

        #[test]
        fn severity_never_decreases_with_value(a in 0.0f64..10_000.0, b in 0.0f64..10_000.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(variance_severity(lo, 5) <= variance_severity(hi, 5));
        }
    }
}
