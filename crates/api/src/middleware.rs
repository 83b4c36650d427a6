//! Request middleware: warehouse scoping.
//!
//! Every domain route is warehouse-scoped. The warehouse is carried in the
//! `X-Warehouse-Id` header and injected into the request extensions as a
//! [`WarehouseContext`]; handlers never parse the header themselves.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use stockpilot_core::WarehouseId;

use crate::app::errors;
use crate::context::WarehouseContext;

pub const WAREHOUSE_HEADER: &str = "x-warehouse-id";

pub async fn warehouse_middleware(mut req: Request, next: Next) -> Response {
    let raw = match req
        .headers()
        .get(WAREHOUSE_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(v) => v,
        None => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "missing X-Warehouse-Id header",
            );
        }
    };

    let warehouse_id: WarehouseId = match raw.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "X-Warehouse-Id must be a valid UUID",
            );
        }
    };

    req.extensions_mut()
        .insert(WarehouseContext::new(warehouse_id));
    next.run(req).await
}
