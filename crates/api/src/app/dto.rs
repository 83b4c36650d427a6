//! Request bodies and read-model JSON mapping.
//!
//! Responses share one envelope: `{"success", "message", "data"}`. Request
//! DTOs deserialize typed identifiers and domain enums directly, so malformed
//! ids and unknown enum values are rejected by the JSON extractor.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use stockpilot_core::{CustomerId, ProductId};
use stockpilot_exceptions::{ExceptionSeverity, ExceptionType, Priority, ResolutionType};
use stockpilot_fulfillment::{InspectionChecks, InspectionScores, ShipmentStatus};
use stockpilot_infra::projections::{
    exceptions::ExceptionReadModel,
    inventory_stock::StockReadModel,
    orders::OrderReadModel,
    packages::PackageReadModel,
    pick_lists::PickListReadModel,
    quality_checks::QualityCheckReadModel,
    reports::ReportReadModel,
    returns::ReturnReadModel,
    shipments::ShipmentReadModel,
    tracking::TrackingReadModel,
};
use stockpilot_orders::{OrderId, OrderStatus};
use stockpilot_returns::{ItemCondition, ReturnReason};

/// Success envelope.
pub fn ok(message: impl Into<String>, data: JsonValue) -> Response {
    envelope(StatusCode::OK, message, data)
}

/// Success envelope with 201 Created.
pub fn created(message: impl Into<String>, data: JsonValue) -> Response {
    envelope(StatusCode::CREATED, message, data)
}

fn envelope(status: StatusCode, message: impl Into<String>, data: JsonValue) -> Response {
    (
        status,
        axum::Json(json!({
            "success": true,
            "message": message.into(),
            "data": data,
        })),
    )
        .into_response()
}

// ----- request bodies -----

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLineRequest>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct TransitionOrderRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TrackProductRequest {
    pub product_id: ProductId,
    pub location: String,
    pub initial_stock: i64,
    pub minimum_stock_level: i64,
    pub maximum_stock_level: i64,
    pub reorder_point: i64,
    pub unit_cost: f64,
}

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustStockRequest {
    pub counted_quantity: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveAlertRequest {
    pub alert_type: stockpilot_inventory::AlertType,
}

#[derive(Debug, Deserialize)]
pub struct CreatePickListRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct AssignPickerRequest {
    pub picker: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordPickRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePackageRequest {
    pub order_id: OrderId,
    pub pick_list_id: stockpilot_fulfillment::PickListId,
    pub dimensions: String,
}

#[derive(Debug, Deserialize)]
pub struct AddPackedItemRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_weight_kg: f64,
}

#[derive(Debug, Deserialize)]
pub struct RecordInspectionRequest {
    pub order_id: OrderId,
    pub package_id: stockpilot_fulfillment::PackageId,
    pub inspector: String,
    pub scores: InspectionScores,
    pub checks: InspectionChecks,
    #[serde(default)]
    pub recheck_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateShipmentRequest {
    pub order_id: OrderId,
    pub package_id: stockpilot_fulfillment::PackageId,
    pub tracking_number: String,
    pub carrier: String,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleDispatchRequest {
    pub pickup_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionShipmentRequest {
    pub status: ShipmentStatus,
}

#[derive(Debug, Deserialize)]
pub struct AppendTrackingEventRequest {
    pub event_type: String,
    pub description: String,
    pub location: String,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct OpenExceptionRequest {
    pub tracking_number: String,
    pub exception_type: ExceptionType,
    pub severity: ExceptionSeverity,
    pub priority: Priority,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignExceptionRequest {
    pub assignee: String,
}

#[derive(Debug, Deserialize)]
pub struct ResolveExceptionRequest {
    pub resolution_type: ResolutionType,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub replacement_tracking_number: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnLineRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub unit_price: f64,
}

#[derive(Debug, Deserialize)]
pub struct RequestReturnRequest {
    pub order_id: OrderId,
    pub reason: ReturnReason,
    pub lines: Vec<ReturnLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct StartInspectionRequest {
    pub inspector: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordRestockRequest {
    pub product_id: ProductId,
    pub quantity: i64,
    pub condition: ItemCondition,
}

#[derive(Debug, Deserialize)]
pub struct MarkRepairedRequest {
    pub product_id: ProductId,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RefundBreakdownRequest {
    pub refund_amount: f64,
    #[serde(default)]
    pub store_credit: f64,
    #[serde(default)]
    pub shipping_refund: f64,
    #[serde(default)]
    pub restocking_fee: f64,
}

#[derive(Debug, Deserialize)]
pub struct CountLineRequest {
    pub product_id: ProductId,
    pub location: String,
    pub counted_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct RunAuditRequest {
    pub counted_by: String,
    pub lines: Vec<CountLineRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteReportRequest {
    pub total_expected_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct ApproveReportRequest {
    pub approved_by: String,
}

// ----- read model -> JSON -----

pub fn stock_json(rm: &StockReadModel) -> JsonValue {
    json!({
        "record_id": rm.record_id,
        "product_id": rm.product_id,
        "location": rm.location,
        "current_stock": rm.current_stock,
        "reserved_stock": rm.reserved_stock,
        "available_stock": rm.available_stock(),
        "minimum_stock_level": rm.minimum_stock_level,
        "maximum_stock_level": rm.maximum_stock_level,
        "reorder_point": rm.reorder_point,
        "unit_cost": rm.unit_cost,
        "status": rm.status,
        "open_alerts": rm.open_alerts,
    })
}

pub fn order_json(rm: &OrderReadModel) -> JsonValue {
    json!({
        "order_id": rm.order_id,
        "order_number": rm.order_number,
        "customer_id": rm.customer_id,
        "status": rm.status,
        "lines": rm.lines.iter().map(|l| json!({
            "line_no": l.line_no,
            "product_id": l.product_id,
            "quantity": l.quantity,
            "unit_price": l.unit_price,
        })).collect::<Vec<_>>(),
        "total_amount": rm.total_amount,
        "notes": rm.notes,
        "tracking_number": rm.tracking_number,
        "estimated_delivery": rm.estimated_delivery,
        "actual_delivery": rm.actual_delivery,
        "placed_at": rm.placed_at,
        "updated_at": rm.updated_at,
    })
}

pub fn pick_list_json(rm: &PickListReadModel) -> JsonValue {
    json!({
        "pick_list_id": rm.pick_list_id,
        "pick_list_number": rm.pick_list_number,
        "order_id": rm.order_id,
        "status": rm.status,
        "picker": rm.picker,
        "items": rm.items.iter().map(|i| json!({
            "product_id": i.product_id,
            "location": i.location,
            "quantity_to_pick": i.quantity_to_pick,
            "quantity_picked": i.quantity_picked,
        })).collect::<Vec<_>>(),
        "estimated_pick_minutes": rm.estimated_pick_minutes,
    })
}

pub fn package_json(rm: &PackageReadModel) -> JsonValue {
    json!({
        "package_id": rm.package_id,
        "package_number": rm.package_number,
        "order_id": rm.order_id,
        "pick_list_id": rm.pick_list_id,
        "status": rm.status,
        "dimensions": rm.dimensions,
        "item_count": rm.item_count,
        "total_weight_kg": rm.total_weight_kg,
    })
}

pub fn quality_check_json(rm: &QualityCheckReadModel) -> JsonValue {
    json!({
        "quality_check_id": rm.quality_check_id,
        "order_id": rm.order_id,
        "package_id": rm.package_id,
        "inspector": rm.inspector,
        "overall_score": rm.overall_score,
        "result": rm.result,
        "recheck_required": rm.recheck_required,
        "approved_for_shipment": rm.approved_for_shipment,
        "inspected_at": rm.inspected_at,
    })
}

pub fn shipment_json(rm: &ShipmentReadModel) -> JsonValue {
    json!({
        "shipment_id": rm.shipment_id,
        "shipment_number": rm.shipment_number,
        "order_id": rm.order_id,
        "package_id": rm.package_id,
        "tracking_number": rm.tracking_number,
        "carrier": rm.carrier,
        "status": rm.status,
        "pickup_at": rm.pickup_at,
        "shipped_at": rm.shipped_at,
        "delivered_at": rm.delivered_at,
    })
}

pub fn tracking_json(rm: &TrackingReadModel) -> JsonValue {
    json!({
        "tracking_log_id": rm.tracking_log_id,
        "tracking_number": rm.tracking_number,
        "shipment_id": rm.shipment_id,
        "entries": rm.entries.iter().map(|e| json!({
            "event_type": e.event_type,
            "description": e.description,
            "location": e.location,
            "milestone": e.milestone,
            "event_time": e.event_time,
        })).collect::<Vec<_>>(),
    })
}

pub fn exception_json(rm: &ExceptionReadModel) -> JsonValue {
    json!({
        "exception_id": rm.exception_id,
        "exception_number": rm.exception_number,
        "tracking_number": rm.tracking_number,
        "order_id": rm.order_id,
        "exception_type": rm.exception_type,
        "severity": rm.severity,
        "priority": rm.priority,
        "status": rm.status,
        "assigned_to": rm.assigned_to,
        "resolution_type": rm.resolution_type,
        "resolution_duration_hours": rm.resolution_duration_hours,
        "efficiency": rm.efficiency,
        "reported_at": rm.reported_at,
        "resolved_at": rm.resolved_at,
    })
}

pub fn return_json(rm: &ReturnReadModel) -> JsonValue {
    json!({
        "return_id": rm.return_id,
        "return_number": rm.return_number,
        "order_id": rm.order_id,
        "reason": rm.reason,
        "status": rm.status,
        "lines": rm.lines.iter().map(|l| json!({
            "product_id": l.product_id,
            "quantity": l.quantity,
            "unit_price": l.unit_price,
        })).collect::<Vec<_>>(),
        "total_quantity": rm.total_quantity,
        "restocked_quantity": rm.restocked_quantity,
        "total_refund": rm.total_refund,
    })
}

pub fn report_json(rm: &ReportReadModel) -> JsonValue {
    json!({
        "report_id": rm.report_id,
        "report_number": rm.report_number,
        "counted_by": rm.counted_by,
        "status": rm.status,
        "discrepancies": rm.discrepancies.iter().map(|d| json!({
            "product_id": d.product_id,
            "location": d.location,
            "expected_quantity": d.expected_quantity,
            "counted_quantity": d.counted_quantity,
            "variance_quantity": d.variance_quantity,
            "variance_value": d.variance_value,
            "variance_type": d.variance_type,
            "severity": d.severity,
            "adjusted": d.adjusted,
        })).collect::<Vec<_>>(),
        "accuracy_rate": rm.accuracy_rate,
        "variance_rate": rm.variance_rate,
        "approved_by": rm.approved_by,
    })
}
