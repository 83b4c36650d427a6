use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockpilot_core::{Aggregate, AggregateId, AggregateRoot, DomainError, WarehouseId};
use stockpilot_events::Event;
use stockpilot_orders::OrderId;

use crate::package::PackageId;

/// Quality check identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualityCheckId(pub AggregateId);

impl QualityCheckId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for QualityCheckId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Five sub-scores, each 1..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionScores {
    pub packaging: u8,
    pub labeling: u8,
    pub contents: u8,
    pub weight_accuracy: u8,
    pub documentation: u8,
}

impl InspectionScores {
    pub fn sum(&self) -> u32 {
        self.packaging as u32
            + self.labeling as u32
            + self.contents as u32
            + self.weight_accuracy as u32
            + self.documentation as u32
    }

    fn all_in_range(&self) -> bool {
        [
            self.packaging,
            self.labeling,
            self.contents,
            self.weight_accuracy,
            self.documentation,
        ]
        .iter()
        .all(|s| (1..=5).contains(s))
    }
}

/// Five boolean sub-checks (all phrased positively).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectionChecks {
    pub package_intact: bool,
    pub content_correct: bool,
    pub weight_accurate: bool,
    pub labels_correct: bool,
    pub hazmat_compliant: bool,
}

impl InspectionChecks {
    pub fn all_pass(&self) -> bool {
        self.package_intact
            && self.content_correct
            && self.weight_accurate
            && self.labels_correct
            && self.hazmat_compliant
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityResult {
    Pass,
    Conditional,
    Fail,
}

/// Overall score on a 0..=100 scale: Σ sub-scores / 25 × 100.
pub fn overall_score(scores: &InspectionScores) -> f64 {
    scores.sum() as f64 / 25.0 * 100.0
}

/// Result rules: `Pass` needs >= 90 and every boolean check true;
/// `Conditional` needs >= 70; everything else fails.
pub fn determine_result(score: f64, checks: &InspectionChecks) -> QualityResult {
    if score >= 90.0 && checks.all_pass() {
        QualityResult::Pass
    } else if score >= 70.0 {
        QualityResult::Conditional
    } else {
        QualityResult::Fail
    }
}

/// Aggregate root: QualityCheck.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityCheck {
    id: QualityCheckId,
    warehouse_id: Option<WarehouseId>,
    order_id: Option<OrderId>,
    package_id: Option<PackageId>,
    inspector: String,
    scores: Option<InspectionScores>,
    checks: Option<InspectionChecks>,
    overall_score: f64,
    result: Option<QualityResult>,
    recheck_required: bool,
    approved_for_shipment: bool,
    inspected_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl QualityCheck {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: QualityCheckId) -> Self {
        Self {
            id,
            warehouse_id: None,
            order_id: None,
            package_id: None,
            inspector: String::new(),
            scores: None,
            checks: None,
            overall_score: 0.0,
            result: None,
            recheck_required: false,
            approved_for_shipment: false,
            inspected_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> QualityCheckId {
        self.id
    }

    pub fn package_id(&self) -> Option<PackageId> {
        self.package_id
    }

    pub fn overall_score(&self) -> f64 {
        self.overall_score
    }

    pub fn result(&self) -> Option<QualityResult> {
        self.result
    }

    pub fn recheck_required(&self) -> bool {
        self.recheck_required
    }

    pub fn approved_for_shipment(&self) -> bool {
        self.approved_for_shipment
    }
}

impl AggregateRoot for QualityCheck {
    type Id = QualityCheckId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordInspection.
///
/// First inspection creates the check; a re-inspection is allowed as long as
/// the package has not been approved yet (the recheck flow for conditional
/// and failed results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordInspection {
    pub warehouse_id: WarehouseId,
    pub quality_check_id: QualityCheckId,
    pub order_id: OrderId,
    pub package_id: PackageId,
    pub inspector: String,
    pub scores: InspectionScores,
    pub checks: InspectionChecks,
    pub recheck_required: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QualityCheckCommand {
    RecordInspection(RecordInspection),
}

/// Event: InspectionRecorded.
///
/// The derived outcome (score, result, approval) is decided in `handle` and
/// carried in the event so replays never re-derive with changed rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionRecorded {
    pub warehouse_id: WarehouseId,
    pub quality_check_id: QualityCheckId,
    pub order_id: OrderId,
    pub package_id: PackageId,
    pub inspector: String,
    pub scores: InspectionScores,
    pub checks: InspectionChecks,
    pub overall_score: f64,
    pub result: QualityResult,
    pub recheck_required: bool,
    pub approved_for_shipment: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QualityCheckEvent {
    InspectionRecorded(InspectionRecorded),
}

impl Event for QualityCheckEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QualityCheckEvent::InspectionRecorded(_) => "fulfillment.quality_check.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            QualityCheckEvent::InspectionRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for QualityCheck {
    type Command = QualityCheckCommand;
    type Event = QualityCheckEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            QualityCheckEvent::InspectionRecorded(e) => {
                self.id = e.quality_check_id;
                self.warehouse_id = Some(e.warehouse_id);
                self.order_id = Some(e.order_id);
                self.package_id = Some(e.package_id);
                self.inspector = e.inspector.clone();
                self.scores = Some(e.scores);
                self.checks = Some(e.checks);
                self.overall_score = e.overall_score;
                self.result = Some(e.result);
                self.recheck_required = e.recheck_required;
                self.approved_for_shipment = e.approved_for_shipment;
                self.inspected_at = Some(e.occurred_at);
                self.created = true;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            QualityCheckCommand::RecordInspection(cmd) => self.handle_record(cmd),
        }
    }
}

impl QualityCheck {
    fn handle_record(&self, cmd: &RecordInspection) -> Result<Vec<QualityCheckEvent>, DomainError> {
        if self.created {
            if self.warehouse_id != Some(cmd.warehouse_id) {
                return Err(DomainError::invariant("warehouse mismatch"));
            }
            if self.approved_for_shipment {
                return Err(DomainError::conflict(
                    "package is already approved for shipment",
                ));
            }
        }
        if cmd.inspector.trim().is_empty() {
            return Err(DomainError::validation("inspector cannot be empty"));
        }
        if !cmd.scores.all_in_range() {
            return Err(DomainError::validation("scores must be between 1 and 5"));
        }

        let overall = overall_score(&cmd.scores);
        let result = determine_result(overall, &cmd.checks);
        // A clean pass always ships; a conditional ships unless the inspector
        // flagged a recheck.
        let approved = match result {
            QualityResult::Pass => true,
            QualityResult::Conditional => !cmd.recheck_required,
            QualityResult::Fail => false,
        };

        Ok(vec![QualityCheckEvent::InspectionRecorded(
            InspectionRecorded {
                warehouse_id: cmd.warehouse_id,
                quality_check_id: cmd.quality_check_id,
                order_id: cmd.order_id,
                package_id: cmd.package_id,
                inspector: cmd.inspector.clone(),
                scores: cmd.scores,
                checks: cmd.checks,
                overall_score: overall,
                result,
                recheck_required: cmd.recheck_required,
                approved_for_shipment: approved,
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

    fn test_check_id() -> QualityCheckId {
        QualityCheckId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(2)))
    }

    fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn all_good_checks() -> InspectionChecks {
        InspectionChecks {
            package_intact: true,
            content_correct: true,
            weight_accurate: true,
            labels_correct: true,
            hazmat_compliant: true,
        }
    }

    fn inspect(
        qc: &mut QualityCheck,
        scores: InspectionScores,
        checks: InspectionChecks,
        recheck_required: bool,
    ) -> Result<Vec<QualityCheckEvent>, DomainError> {
        execute(
            qc,
            &QualityCheckCommand::RecordInspection(RecordInspection {
                warehouse_id: test_warehouse_id(),
                quality_check_id: test_check_id(),
                order_id: OrderId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(3))),
                package_id: PackageId::new(AggregateId::from_uuid(uuid::Uuid::from_u128(4))),
                inspector: "qa-3".to_string(),
                scores,
                checks,
                recheck_required,
                occurred_at: test_time(),
            }),
        )
    }

    #[test]
    fn perfect_inspection_passes_and_approves() {
        // All fives, every boolean check true.
        let mut qc = QualityCheck::empty(test_check_id());
        inspect(
            &mut qc,
            InspectionScores {
                packaging: 5,
                labeling: 5,
                contents: 5,
                weight_accuracy: 5,
                documentation: 5,
            },
            all_good_checks(),
            false,
        )
        .unwrap();

        assert!((qc.overall_score() - 100.0).abs() < 1e-9);
        assert_eq!(qc.result(), Some(QualityResult::Pass));
        assert!(qc.approved_for_shipment());
    }

    #[test]
    fn high_score_with_failed_check_is_conditional() {
        let mut qc = QualityCheck::empty(test_check_id());
        let mut checks = all_good_checks();
        checks.package_intact = false;

        inspect(
            &mut qc,
            InspectionScores {
                packaging: 5,
                labeling: 5,
                contents: 5,
                weight_accuracy: 5,
                documentation: 5,
            },
            checks,
            false,
        )
        .unwrap();

        assert_eq!(qc.result(), Some(QualityResult::Conditional));
        assert!(qc.approved_for_shipment());
    }

    #[test]
    fn conditional_with_recheck_blocks_shipment() {
        let mut qc = QualityCheck::empty(test_check_id());
        inspect(
            &mut qc,
            InspectionScores {
                packaging: 4,
                labeling: 4,
                contents: 4,
                weight_accuracy: 3,
                documentation: 4,
            },
            all_good_checks(),
            true,
        )
        .unwrap();

        assert_eq!(qc.result(), Some(QualityResult::Conditional));
        assert!(!qc.approved_for_shipment());
    }

    #[test]
    fn low_score_fails() {
        let mut qc = QualityCheck::empty(test_check_id());
        inspect(
            &mut qc,
            InspectionScores {
                packaging: 2,
                labeling: 2,
                contents: 3,
                weight_accuracy: 2,
                documentation: 3,
            },
            all_good_checks(),
            false,
        )
        .unwrap();

        // 12 / 25 = 48%.
        assert!((qc.overall_score() - 48.0).abs() < 1e-9);
        assert_eq!(qc.result(), Some(QualityResult::Fail));
        assert!(!qc.approved_for_shipment());
    }

    #[test]
    fn failed_check_can_be_reinspected() {
        let mut qc = QualityCheck::empty(test_check_id());
        inspect(
            &mut qc,
            InspectionScores {
                packaging: 2,
                labeling: 2,
                contents: 2,
                weight_accuracy: 2,
                documentation: 2,
            },
            all_good_checks(),
            false,
        )
        .unwrap();
        assert_eq!(qc.result(), Some(QualityResult::Fail));

        inspect(
            &mut qc,
            InspectionScores {
                packaging: 5,
                labeling: 5,
                contents: 5,
                weight_accuracy: 5,
                documentation: 5,
            },
            all_good_checks(),
            false,
        )
        .unwrap();
        assert!(qc.approved_for_shipment());
    }

    #[test]
    fn approved_check_cannot_be_reinspected() {
        let mut qc = QualityCheck::empty(test_check_id());
        let scores = InspectionScores {
            packaging: 5,
            labeling: 5,
            contents: 5,
            weight_accuracy: 5,
            documentation: 5,
        };
        inspect(&mut qc, scores, all_good_checks(), false).unwrap();

        let err = inspect(&mut qc, scores, all_good_checks(), false).unwrap_err();
        match err {
            DomainError::Conflict(msg) if msg.contains("already approved") => {}
            other => panic!("expected Conflict, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let mut qc = QualityCheck::empty(test_check_id());
        let err = inspect(
            &mut qc,
            InspectionScores {
                packaging: 0,
                labeling: 5,
                contents: 5,
                weight_accuracy: 5,
                documentation: 5,
            },
            all_good_checks(),
            false,
        )
        .unwrap_err();
        match err {
            DomainError::Validation(msg) if msg.contains("between 1 and 5") => {}
            other => panic!("expected Validation, got {other:?}"),
        }
    }
}
