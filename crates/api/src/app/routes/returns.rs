use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockpilot_returns::{
    ApproveReturn, CancelReturn, MarkReceived, MarkRepaired, RejectReturn, ReturnCommand,
    ReturnId, ReturnLine, SetRefundBreakdown, StartInspection,
};

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(request_return).get(list_returns))
        .route("/:id", get(get_return))
        .route("/:id/approve", post(approve_return))
        .route("/:id/reject", post(reject_return))
        .route("/:id/receive", post(mark_received))
        .route("/:id/inspect", post(start_inspection))
        .route("/:id/restock", post(record_restock))
        .route("/:id/repair", post(mark_repaired))
        .route("/:id/refund", post(set_refund_breakdown))
        .route("/:id/complete", post(complete_return))
        .route("/:id/cancel", post(cancel_return))
}

pub async fn request_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::RequestReturnRequest>,
) -> axum::response::Response {
    let lines: Vec<ReturnLine> = body
        .lines
        .iter()
        .map(|l| ReturnLine {
            product_id: l.product_id,
            quantity: l.quantity,
            unit_price: l.unit_price,
        })
        .collect();

    match services.request_return(warehouse.warehouse_id(), body.order_id, body.reason, lines) {
        Ok((return_id, return_number)) => dto::created(
            "return requested",
            serde_json::json!({
                "return_id": return_id,
                "return_number": return_number,
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
) -> axum::response::Response {
    let returns = services.returns_list(warehouse.warehouse_id());
    let data: Vec<_> = returns.iter().map(dto::return_json).collect();
    dto::ok("returns", serde_json::json!(data))
}

pub async fn get_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    match services.return_get(warehouse.warehouse_id(), return_id) {
        Some(rm) => dto::ok("return", dto::return_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "return not found"),
    }
}

pub async fn approve_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::ApproveReturn(ApproveReturn {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "return approved")
}

pub async fn reject_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::RejectReturn(RejectReturn {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "return rejected")
}

pub async fn mark_received(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::MarkReceived(MarkReceived {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "return received")
}

pub async fn start_inspection(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::StartInspectionRequest>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::StartInspection(StartInspection {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        inspector: body.inspector,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "inspection started")
}

pub async fn record_restock(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RecordRestockRequest>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    match services.record_return_restock(
        warehouse.warehouse_id(),
        return_id,
        body.product_id,
        body.quantity,
        body.condition,
    ) {
        Ok(()) => match services.return_get(warehouse.warehouse_id(), return_id) {
            Some(rm) => dto::ok("restock recorded", dto::return_json(&rm)),
            None => dto::ok("restock recorded", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn mark_repaired(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::MarkRepairedRequest>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::MarkRepaired(MarkRepaired {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        product_id: body.product_id,
        quantity: body.quantity,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "repair recorded")
}

pub async fn set_refund_breakdown(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::RefundBreakdownRequest>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::SetRefundBreakdown(SetRefundBreakdown {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        refund_amount: body.refund_amount,
        store_credit: body.store_credit,
        shipping_refund: body.shipping_refund,
        restocking_fee: body.restocking_fee,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "refund breakdown set")
}

pub async fn complete_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    match services.complete_return(warehouse.warehouse_id(), return_id) {
        Ok(()) => match services.return_get(warehouse.warehouse_id(), return_id) {
            Some(rm) => dto::ok("return completed", dto::return_json(&rm)),
            None => dto::ok("return completed", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn cancel_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let return_id = match parse_aggregate_id(&id, "return") {
        Ok(v) => ReturnId::new(v),
        Err(resp) => return resp,
    };
    let command = ReturnCommand::CancelReturn(CancelReturn {
        warehouse_id: warehouse.warehouse_id(),
        return_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, return_id, command, "return cancelled")
}

fn dispatch(
    services: &AppServices,
    warehouse: WarehouseContext,
    return_id: ReturnId,
    command: ReturnCommand,
    message: &str,
) -> axum::response::Response {
    match services.dispatch_return(warehouse.warehouse_id(), return_id, command) {
        Ok(_) => match services.return_get(warehouse.warehouse_id(), return_id) {
            Some(rm) => dto::ok(message, dto::return_json(&rm)),
            None => dto::ok(message, serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
