use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockpilot_fulfillment::{ScheduleDispatch, ShipmentCommand, ShipmentId, TransitionShipment};

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_shipment))
        .route("/:id", get(get_shipment))
        .route("/:id/schedule", post(schedule_dispatch))
        .route("/:id/status", post(transition_shipment))
}

pub async fn create_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::CreateShipmentRequest>,
) -> axum::response::Response {
    match services.create_shipment(
        warehouse.warehouse_id(),
        body.order_id,
        body.package_id,
        body.tracking_number,
        body.carrier,
    ) {
        Ok((shipment_id, shipment_number)) => dto::created(
            "shipment created",
            serde_json::json!({
                "shipment_id": shipment_id,
                "shipment_number": shipment_number,
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let shipment_id = match parse_aggregate_id(&id, "shipment") {
        Ok(v) => ShipmentId::new(v),
        Err(resp) => return resp,
    };
    match services.shipment_get(warehouse.warehouse_id(), shipment_id) {
        Some(rm) => dto::ok("shipment", dto::shipment_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "shipment not found"),
    }
}

pub async fn schedule_dispatch(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ScheduleDispatchRequest>,
) -> axum::response::Response {
    let shipment_id = match parse_aggregate_id(&id, "shipment") {
        Ok(v) => ShipmentId::new(v),
        Err(resp) => return resp,
    };
    let command = ShipmentCommand::ScheduleDispatch(ScheduleDispatch {
        warehouse_id: warehouse.warehouse_id(),
        shipment_id,
        pickup_at: body.pickup_at,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, shipment_id, command, "dispatch scheduled")
}

pub async fn transition_shipment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionShipmentRequest>,
) -> axum::response::Response {
    let shipment_id = match parse_aggregate_id(&id, "shipment") {
        Ok(v) => ShipmentId::new(v),
        Err(resp) => return resp,
    };
    let command = ShipmentCommand::TransitionShipment(TransitionShipment {
        warehouse_id: warehouse.warehouse_id(),
        shipment_id,
        next: body.status,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, shipment_id, command, "shipment status updated")
}

fn dispatch(
    services: &AppServices,
    warehouse: WarehouseContext,
    shipment_id: ShipmentId,
    command: ShipmentCommand,
    message: &str,
) -> axum::response::Response {
    match services.dispatch_shipment(warehouse.warehouse_id(), shipment_id, command) {
        Ok(_) => match services.shipment_get(warehouse.warehouse_id(), shipment_id) {
            Some(rm) => dto::ok(message, dto::shipment_json(&rm)),
            None => dto::ok(message, serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
