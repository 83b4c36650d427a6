use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockpilot_fulfillment::{AddPackedItem, MarkPacked, PackageCommand, PackageId};

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/packages", post(create_package))
        .route("/packages/:id", get(get_package))
        .route("/packages/:id/items", post(add_packed_item))
        .route("/packages/:id/packed", post(mark_packed))
}

pub async fn create_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::CreatePackageRequest>,
) -> axum::response::Response {
    match services.create_package(
        warehouse.warehouse_id(),
        body.order_id,
        body.pick_list_id,
        body.dimensions,
    ) {
        Ok((package_id, package_number)) => dto::created(
            "package created",
            serde_json::json!({
                "package_id": package_id,
                "package_number": package_number,
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_package(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let package_id = match parse_aggregate_id(&id, "package") {
        Ok(v) => PackageId::new(v),
        Err(resp) => return resp,
    };
    match services.package_get(warehouse.warehouse_id(), package_id) {
        Some(rm) => dto::ok("package", dto::package_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "package not found"),
    }
}

pub async fn add_packed_item(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AddPackedItemRequest>,
) -> axum::response::Response {
    let package_id = match parse_aggregate_id(&id, "package") {
        Ok(v) => PackageId::new(v),
        Err(resp) => return resp,
    };
    let command = PackageCommand::AddPackedItem(AddPackedItem {
        warehouse_id: warehouse.warehouse_id(),
        package_id,
        product_id: body.product_id,
        quantity: body.quantity,
        unit_weight_kg: body.unit_weight_kg,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, package_id, command, "item packed")
}

pub async fn mark_packed(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let package_id = match parse_aggregate_id(&id, "package") {
        Ok(v) => PackageId::new(v),
        Err(resp) => return resp,
    };
    let command = PackageCommand::MarkPacked(MarkPacked {
        warehouse_id: warehouse.warehouse_id(),
        package_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, package_id, command, "package packed")
}

fn dispatch(
    services: &AppServices,
    warehouse: WarehouseContext,
    package_id: PackageId,
    command: PackageCommand,
    message: &str,
) -> axum::response::Response {
    match services.dispatch_package(warehouse.warehouse_id(), package_id, command) {
        Ok(_) => match services.package_get(warehouse.warehouse_id(), package_id) {
            Some(rm) => dto::ok(message, dto::package_json(&rm)),
            None => dto::ok(message, serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
