use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    routing::{get, patch, post},
    Json, Router,
};
use serde::Deserialize;

use stockpilot_orders::{OrderId, OrderLine, OrderStatus};

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(transition_order))
        .route("/:id/cancel", post(cancel_order))
}

#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<OrderStatus>,
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::PlaceOrderRequest>,
) -> axum::response::Response {
    let lines: Vec<OrderLine> = body
        .lines
        .iter()
        .enumerate()
        .map(|(idx, l)| OrderLine {
            line_no: idx as u32 + 1,
            product_id: l.product_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
        })
        .collect();

    match services.place_order(warehouse.warehouse_id(), body.customer_id, lines, body.notes) {
        Ok((order_id, order_number)) => dto::created(
            "order placed",
            serde_json::json!({
                "order_id": order_id,
                "order_number": order_number,
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Query(query): Query<OrdersQuery>,
) -> axum::response::Response {
    let orders = match query.status {
        Some(status) => services.orders_by_status(warehouse.warehouse_id(), status),
        None => services.orders_list(warehouse.warehouse_id()),
    };
    let data: Vec<_> = orders.iter().map(dto::order_json).collect();
    dto::ok("orders", serde_json::json!(data))
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let order_id = match parse_aggregate_id(&id, "order") {
        Ok(v) => OrderId::new(v),
        Err(resp) => return resp,
    };
    match services.order_get(warehouse.warehouse_id(), order_id) {
        Some(rm) => dto::ok("order", dto::order_json(&rm)),
        None => errors::json_error(axum::http::StatusCode::NOT_FOUND, "order not found"),
    }
}

pub async fn transition_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::TransitionOrderRequest>,
) -> axum::response::Response {
    let order_id = match parse_aggregate_id(&id, "order") {
        Ok(v) => OrderId::new(v),
        Err(resp) => return resp,
    };
    match services.transition_order(warehouse.warehouse_id(), order_id, body.status) {
        Ok(()) => dto::ok(
            "order status updated",
            serde_json::json!({ "order_id": order_id, "status": body.status }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn cancel_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let order_id = match parse_aggregate_id(&id, "order") {
        Ok(v) => OrderId::new(v),
        Err(resp) => return resp,
    };
    match services.cancel_order(warehouse.warehouse_id(), order_id, body.reason) {
        Ok(()) => dto::ok("order cancelled", serde_json::json!({ "order_id": order_id })),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
