use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::app::routes::parse_product_id;
use crate::app::services::{AppServices, StockOperation};
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/products", post(track_product).get(list_products))
        .route("/products/:productId", get(get_product))
        .route("/products/:productId/reserve", post(reserve_stock))
        .route("/products/:productId/release", post(release_stock))
        .route("/products/:productId/sell", post(sell_stock))
        .route("/products/:productId/restock", post(restock_product))
        .route("/products/:productId/adjust", post(adjust_stock))
        .route("/alerts", get(list_alerts))
        .route("/alerts/:productId/resolve", post(resolve_alert))
}

pub async fn track_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::TrackProductRequest>,
) -> axum::response::Response {
    match services.track_product(
        warehouse.warehouse_id(),
        body.product_id,
        body.location,
        body.initial_stock,
        body.minimum_stock_level,
        body.maximum_stock_level,
        body.reorder_point,
        body.unit_cost,
    ) {
        Ok(record_id) => dto::created(
            "product tracked",
            serde_json::json!({ "record_id": record_id, "product_id": body.product_id }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_products(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
) -> axum::response::Response {
    let records = services.inventory_list(warehouse.warehouse_id());
    let data: Vec<_> = records.iter().map(dto::stock_json).collect();
    dto::ok("inventory", serde_json::json!(data))
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.inventory_get(warehouse.warehouse_id(), product_id) {
        Some(rm) => dto::ok("inventory record", dto::stock_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "product is not tracked here"),
    }
}

pub async fn reserve_stock(
    services: Extension<Arc<AppServices>>,
    warehouse: Extension<WarehouseContext>,
    product_id: Path<String>,
    body: Json<dto::QuantityRequest>,
) -> axum::response::Response {
    stock_op(services, warehouse, product_id, body, StockOperation::Reserve, "stock reserved").await
}

pub async fn release_stock(
    services: Extension<Arc<AppServices>>,
    warehouse: Extension<WarehouseContext>,
    product_id: Path<String>,
    body: Json<dto::QuantityRequest>,
) -> axum::response::Response {
    stock_op(services, warehouse, product_id, body, StockOperation::Release, "stock released").await
}

pub async fn sell_stock(
    services: Extension<Arc<AppServices>>,
    warehouse: Extension<WarehouseContext>,
    product_id: Path<String>,
    body: Json<dto::QuantityRequest>,
) -> axum::response::Response {
    stock_op(services, warehouse, product_id, body, StockOperation::Sell, "stock sold").await
}

pub async fn restock_product(
    services: Extension<Arc<AppServices>>,
    warehouse: Extension<WarehouseContext>,
    product_id: Path<String>,
    body: Json<dto::QuantityRequest>,
) -> axum::response::Response {
    stock_op(services, warehouse, product_id, body, StockOperation::Restock, "product restocked")
        .await
}

async fn stock_op(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::QuantityRequest>,
    op: StockOperation,
    message: &str,
) -> axum::response::Response {
    let product_id = match parse_product_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.stock_operation(warehouse.warehouse_id(), product_id, op, body.quantity) {
        Ok(()) => match services.inventory_get(warehouse.warehouse_id(), product_id) {
            Some(rm) => dto::ok(message, dto::stock_json(&rm)),
            None => dto::ok(message, serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn adjust_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::AdjustStockRequest>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.adjust_stock_by_product(
        warehouse.warehouse_id(),
        product_id,
        body.counted_quantity,
        body.reason,
    ) {
        Ok(()) => match services.inventory_get(warehouse.warehouse_id(), product_id) {
            Some(rm) => dto::ok("stock adjusted", dto::stock_json(&rm)),
            None => dto::ok("stock adjusted", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_alerts(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
) -> axum::response::Response {
    let records = services.inventory_alerts(warehouse.warehouse_id());
    let data: Vec<_> = records.iter().map(dto::stock_json).collect();
    dto::ok("stock alerts", serde_json::json!(data))
}

pub async fn resolve_alert(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(product_id): Path<String>,
    Json(body): Json<dto::ResolveAlertRequest>,
) -> axum::response::Response {
    let product_id = match parse_product_id(&product_id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    match services.resolve_alert(warehouse.warehouse_id(), product_id, body.alert_type) {
        Ok(()) => dto::ok(
            "alert resolved",
            serde_json::json!({ "product_id": product_id, "alert_type": body.alert_type }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
