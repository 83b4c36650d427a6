//! HTTP routes, one file per domain area.

use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::get;
use axum::Router;

use stockpilot_core::AggregateId;

use crate::app::errors;

pub mod exceptions;
pub mod inventory;
pub mod orders;
pub mod packing;
pub mod picking;
pub mod quality;
pub mod reconciliation;
pub mod returns;
pub mod shipments;
pub mod system;
pub mod tracking;

pub fn router() -> Router {
    Router::new()
        .nest("/orders", orders::router())
        .nest("/inventory", inventory::router())
        .nest("/picking", picking::router())
        .nest("/packing", packing::router())
        .nest("/quality", quality::router())
        .nest("/shipments", shipments::router())
        .nest("/tracking", tracking::router())
        .nest("/exceptions", exceptions::router())
        .nest("/returns", returns::router())
        .nest("/reconciliation", reconciliation::router())
        .route("/stream", get(system::stream))
}

/// Parse a path segment into an aggregate id, or produce the 400 response.
pub(crate) fn parse_aggregate_id(raw: &str, what: &str) -> Result<AggregateId, Response> {
    raw.parse().map_err(|_| {
        errors::json_error(StatusCode::BAD_REQUEST, format!("invalid {what} id"))
    })
}

/// Parse a path segment into a product id, or produce the 400 response.
pub(crate) fn parse_product_id(raw: &str) -> Result<stockpilot_core::ProductId, Response> {
    raw.parse()
        .map_err(|_| errors::json_error(StatusCode::BAD_REQUEST, "invalid product id"))
}
