use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;

use stockpilot_exceptions::{
    AssignException, CloseException, EscalateException, ExceptionCommand, ExceptionId,
};

use crate::app::routes::parse_aggregate_id;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::WarehouseContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_exception).get(list_exceptions))
        .route("/:id", get(get_exception))
        .route("/:id/assign", post(assign_exception))
        .route("/:id/escalate", post(escalate_exception))
        .route("/:id/resolve", post(resolve_exception))
        .route("/:id/close", post(close_exception))
}

pub async fn open_exception(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Json(body): Json<dto::OpenExceptionRequest>,
) -> axum::response::Response {
    match services.open_exception(
        warehouse.warehouse_id(),
        body.tracking_number,
        body.exception_type,
        body.severity,
        body.priority,
        body.description,
    ) {
        Ok((exception_id, exception_number)) => dto::created(
            "exception opened",
            serde_json::json!({
                "exception_id": exception_id,
                "exception_number": exception_number,
            }),
        ),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_exceptions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
) -> axum::response::Response {
    let exceptions = services.exceptions_list(warehouse.warehouse_id());
    let data: Vec<_> = exceptions.iter().map(dto::exception_json).collect();
    dto::ok("exceptions", serde_json::json!(data))
}

pub async fn get_exception(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let exception_id = match parse_aggregate_id(&id, "exception") {
        Ok(v) => ExceptionId::new(v),
        Err(resp) => return resp,
    };
    match services.exception_get(warehouse.warehouse_id(), exception_id) {
        Some(rm) => dto::ok("exception", dto::exception_json(&rm)),
        None => errors::json_error(StatusCode::NOT_FOUND, "exception not found"),
    }
}

pub async fn assign_exception(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::AssignExceptionRequest>,
) -> axum::response::Response {
    let exception_id = match parse_aggregate_id(&id, "exception") {
        Ok(v) => ExceptionId::new(v),
        Err(resp) => return resp,
    };
    let command = ExceptionCommand::AssignException(AssignException {
        warehouse_id: warehouse.warehouse_id(),
        exception_id,
        assignee: body.assignee,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, exception_id, command, "exception assigned")
}

pub async fn escalate_exception(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ReasonRequest>,
) -> axum::response::Response {
    let exception_id = match parse_aggregate_id(&id, "exception") {
        Ok(v) => ExceptionId::new(v),
        Err(resp) => return resp,
    };
    let command = ExceptionCommand::EscalateException(EscalateException {
        warehouse_id: warehouse.warehouse_id(),
        exception_id,
        reason: body.reason,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, exception_id, command, "exception escalated")
}

pub async fn resolve_exception(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ResolveExceptionRequest>,
) -> axum::response::Response {
    let exception_id = match parse_aggregate_id(&id, "exception") {
        Ok(v) => ExceptionId::new(v),
        Err(resp) => return resp,
    };
    match services.resolve_exception(
        warehouse.warehouse_id(),
        exception_id,
        body.resolution_type,
        body.notes,
        body.replacement_tracking_number,
    ) {
        Ok(()) => match services.exception_get(warehouse.warehouse_id(), exception_id) {
            Some(rm) => dto::ok("exception resolved", dto::exception_json(&rm)),
            None => dto::ok("exception resolved", serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn close_exception(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let exception_id = match parse_aggregate_id(&id, "exception") {
        Ok(v) => ExceptionId::new(v),
        Err(resp) => return resp,
    };
    let command = ExceptionCommand::CloseException(CloseException {
        warehouse_id: warehouse.warehouse_id(),
        exception_id,
        occurred_at: Utc::now(),
    });
    dispatch(&services, warehouse, exception_id, command, "exception closed")
}

fn dispatch(
    services: &AppServices,
    warehouse: WarehouseContext,
    exception_id: ExceptionId,
    command: ExceptionCommand,
    message: &str,
) -> axum::response::Response {
    match services.dispatch_exception(warehouse.warehouse_id(), exception_id, command) {
        Ok(_) => match services.exception_get(warehouse.warehouse_id(), exception_id) {
            Some(rm) => dto::ok(message, dto::exception_json(&rm)),
            None => dto::ok(message, serde_json::json!(null)),
        },
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
