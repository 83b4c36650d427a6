use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use stockpilot_infra::command_dispatcher::DispatchError;

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, msg),
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not found"),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, msg),
        DispatchError::InsufficientStock {
            requested,
            available,
        } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("insufficient stock: requested {requested}, available {available}"),
        ),
        DispatchError::IllegalTransition { from, to } => json_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("illegal status transition: {from} -> {to}"),
        ),
        DispatchError::InvariantViolation(msg) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, msg)
        }
        DispatchError::WarehouseIsolation(msg) => json_error(StatusCode::FORBIDDEN, msg),
        DispatchError::System(msg) => json_error(StatusCode::SERVICE_UNAVAILABLE, msg),
        DispatchError::Deserialize(msg) => json_error(StatusCode::INTERNAL_SERVER_ERROR, msg),
        DispatchError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e}"))
        }
    }
}

/// Error envelope: same shape as success responses, `success: false`.
pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "success": false,
            "message": message.into(),
            "data": null,
        })),
    )
        .into_response()
}
