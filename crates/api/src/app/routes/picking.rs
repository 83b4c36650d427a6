use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockpilot_fulfillment::{
    AssignPicker, CancelPickList, PickListCommand, PickListId, RecordPick, StartPicking,
};

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/pick-lists", post(create_pick_list))
        .route("/pick-lists/:id", get(get_pick_list))
        .route("/pick-lists/:id/assign", post(assign_picker))
        .route("/pick-lists/:id/start", post(start_picking))
        .route("/pick-lists/:id/pick", post(record_pick))
        .route("/pick-lists/:id/cancel", post(cancel_pick_list))
}

pub async fn create_pick_list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::CreatePickListRequest>,
) -> axum::response::Response {
    match services.create_pick_list(warehouse.warehouse_id(), body.order_id) {
        Ok((pick_list_id, pick_list_number)) => dto::created(
            "pick list created",
            serde_json::json!({
                "pick_list_id": pick_list_id,
                "pick_list_number": pick_list_number,
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_pick_list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let pick_list_id = match parse_aggregate_id(&id, "pick list") {
        Ok(v) => PickListId::new(v),
        Err(resp) => return resp,
    };
    match services.pick_list_get(warehouse.warehouse_id(), pick_list_id) {
        Some(rm) => dto::ok("pick list", dto::pick_list_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "pick list not found"),
    }
}

pub async fn assign_picker(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignPickerRequest>,
) -> axum::response::Response {
    let pick_list_id = match parse_aggregate_id(&id, "pick list") {
        Ok(v) => PickListId::new(v),
        Err(resp) => return resp,
    };
    let command = PickListCommand::AssignPicker(AssignPicker {
        warehouse_id: warehouse.warehouse_id(),
        pick_list_id,
        picker: body.picker,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, pick_list_id, command, "picker assigned")
}

pub async fn start_picking(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let pick_list_id = match parse_aggregate_id(&id, "pick list") {
        Ok(v) => PickListId::new(v),
        Err(resp) => return resp,
    };
    let command = PickListCommand::StartPicking(StartPicking {
        warehouse_id: warehouse.warehouse_id(),
        pick_list_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, pick_list_id, command, "picking started")
}

pub async fn record_pick(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordPickRequest>,
) -> axum::response::Response {
    let pick_list_id = match parse_aggregate_id(&id, "pick list") {
        Ok(v) => PickListId::new(v),
        Err(resp) => return resp,
    };
    let command = PickListCommand::RecordPick(RecordPick {
        warehouse_id: warehouse.warehouse_id(),
        pick_list_id,
        product_id: body.product_id,
        quantity: body.quantity,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, pick_list_id, command, "pick recorded")
}

pub async fn cancel_pick_list(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let pick_list_id = match parse_aggregate_id(&id, "pick list") {
        Ok(v) => PickListId::new(v),
        Err(resp) => return resp,
    };
    let command = PickListCommand::CancelPickList(CancelPickList {
        warehouse_id: warehouse.warehouse_id(),
        pick_list_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, pick_list_id, command, "pick list cancelled")
}

fn dispatch(
    services: &AppServices,
    warehouse: WarehouseContext,
    pick_list_id: PickListId,
    command: PickListCommand,
    message: &str,
) -> axum::response::Response {
    match services.dispatch_pick_list(warehouse.warehouse_id(), pick_list_id, command) {
        Ok(_) => match services.pick_list_get(warehouse.warehouse_id(), pick_list_id) {
            Some(rm) => dto::ok(message, dto::pick_list_json(&rm)),
            None => dto::ok(message, serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
