use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use stockpilot_infra::audit::CountLine;
use stockpilot_reconciliation::ReportId;

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/reports", post(run_audit).get(list_reports))
        .route("/reports/:id", get(get_report))
        .route("/reports/:id/complete", post(complete_report))
        .route("/reports/:id/approve", post(approve_report))
}

/// Audit a physical count: opens a report and records a discrepancy per
/// counted line that disagrees with the books. The returned
/// `total_expected_quantity` is what the completion step expects back.
pub async fn run_audit(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::RunAuditRequest>,
) -> axum::response::Response {
    let lines: Vec<CountLine> = body
        .lines
        .iter()
        .map(|l| CountLine {
            product_id: l.product_id,
            location: l.location.clone(),
            counted_quantity: l.counted_quantity,
        })
        .collect();

    match services.run_audit(warehouse.warehouse_id(), body.counted_by, lines) {
        Ok((report_id, report_number, audit)) => dto::created(
            "count audited",
            serde_json::json!({
                "report_id": report_id,
                "report_number": report_number,
                "total_expected_quantity": audit.total_expected_quantity,
                "lines_counted": audit.lines_counted,
                "discrepancy_count": audit.discrepancies.len(),
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_reports(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
) -> axum::response::Response {
    let reports = services.reports_list(warehouse.warehouse_id());
    let data: Vec<_> = reports.iter().map(dto::report_json).collect();
    dto::ok("reconciliation reports", serde_json::json!(data))
}

pub async fn get_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let report_id = match parse_aggregate_id(&id, "report") {
        Ok(v) => ReportId::new(v),
        Err(resp) => return resp,
    };
    match services.report_get(warehouse.warehouse_id(), report_id) {
        Some(rm) => dto::ok("reconciliation report", dto::report_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "report not found"),
    }
}

pub async fn complete_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::CompleteReportRequest>,
) -> axum::response::Response {
    let report_id = match parse_aggregate_id(&id, "report") {
        Ok(v) => ReportId::new(v),
        Err(resp) => return resp,
    };
    match services.complete_report(
        warehouse.warehouse_id(),
        report_id,
        body.total_expected_quantity,
    ) {
        Ok(()) => match services.report_get(warehouse.warehouse_id(), report_id) {
            Some(rm) => dto::ok("report completed", dto::report_json(&rm)),
            None => dto::ok("report completed", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn approve_report(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ApproveReportRequest>,
) -> axum::response::Response {
    let report_id = match parse_aggregate_id(&id, "report") {
        Ok(v) => ReportId::new(v),
        Err(resp) => return resp,
    };
    match services.approve_report(warehouse.warehouse_id(), report_id, body.approved_by) {
        Ok(()) => match services.report_get(warehouse.warehouse_id(), report_id) {
            Some(rm) => dto::ok("report approved", dto::report_json(&rm)),
            None => dto::ok("report approved", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
