//! Stock reconciliation domain module (event-sourced).
//!
//! A reconciliation report collects count discrepancies for a warehouse,
//! derives per-discrepancy severity and report-level accuracy figures, and
//! gates stock adjustments behind an approval step.

pub mod report;

pub use report::{
    ApproveReport, CompleteReport, Discrepancy, DiscrepancySeverity, MarkDiscrepancyAdjusted,
    OpenReport, ReconciliationReport, RecordDiscrepancy, ReportCommand, ReportEvent, ReportId,
    ReportStatus, VarianceType, accuracy_rate, variance_rate, variance_severity, variance_type,
    variance_value,
};
