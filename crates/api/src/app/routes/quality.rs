use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use stockpilot_fulfillment::QualityCheckId;

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/checks", post(record_inspection))
        .route("/checks/:id", get(get_quality_check))
}

pub async fn record_inspection(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::RecordInspectionRequest>,
) -> axum::response::Response {
    match services.record_inspection(
        warehouse.warehouse_id(),
        body.order_id,
        body.package_id,
        body.inspector,
        body.scores,
        body.checks,
        body.recheck_required,
    ) {
        Ok(quality_check_id) => {
            match services.quality_check_get(warehouse.warehouse_id(), quality_check_id) {
                Some(rm) => dto::created("inspection recorded", dto::quality_check_json(&rm)),
                None => dto::created(
                    "inspection recorded",
                    serde_json::json!({ "quality_check_id": quality_check_id }),
                ),
            }
        }
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_quality_check(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let quality_check_id = match parse_aggregate_id(&id, "quality check") {
        Ok(v) => QualityCheckId::new(v),
        Err(resp) => return resp,
    };
    match services.quality_check_get(warehouse.warehouse_id(), quality_check_id) {
        Some(rm) => dto::ok("quality check", dto::quality_check_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "quality check not found"),
    }
}
