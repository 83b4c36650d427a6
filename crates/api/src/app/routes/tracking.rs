use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/:trackingNumber", get(get_tracking_log))
        .route("/:trackingNumber/events", post(append_tracking_event))
}

pub async fn get_tracking_log(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(tracking_number): Path<String>,
) -> axum::response::Response {
    match services.tracking_for_number(warehouse.warehouse_id(), &tracking_number) {
        Some(rm) => dto::ok("tracking log", dto::tracking_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "tracking number is not known here"),
    }
}

pub async fn append_tracking_event(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(tracking_number): Path<String>,
    Json(body): Json<dto::AppendTrackingEventRequest>,
) -> axum::response::Response {
    match services.append_tracking_event(
        warehouse.warehouse_id(),
        &tracking_number,
        body.event_type,
        body.description,
        body.location,
        body.event_time,
    ) {
        Ok(()) => match services.tracking_for_number(warehouse.warehouse_id(), &tracking_number) {
            Some(rm) => dto::ok("tracking event appended", dto::tracking_json(&rm)),
            None => dto::ok("tracking event appended", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
