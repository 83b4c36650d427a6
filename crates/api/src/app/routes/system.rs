//! Health and realtime stream endpoints.

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::IntoResponse;

use crate::app::services::{warehouse_sse_stream, AppServices};
use crate::context::WarehouseContext;

pub async fn health() -> axum::response::Response {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "ok",
        "data": { "service": "stockpilot-api" },
    }))
    .into_response()
}

/// Server-sent events stream of projection updates for one warehouse.
pub async fn stream(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(warehouse): Extension<WarehouseContext>,
) -> axum::response::Response {
    warehouse_sse_stream(services, warehouse.warehouse_id()).into_response()
}
