//! Fulfillment pipeline domain module (event-sourced).
//!
//! One aggregate per pipeline artifact: pick list, package, quality check,
//! shipment, and the tracking log. Stage gates between artifacts (a package
//! needs a completed pick list, a shipment needs an approved quality check)
//! are enforced at the application layer against the read models; each
//! aggregate owns its internal state machine.

pub mod package;
pub mod pick_list;
pub mod quality_check;
pub mod shipment;
pub mod tracking;

pub use package::{
    AddPackedItem, CreatePackage, MarkPacked, Package, PackageCommand, PackageEvent, PackageId,
    PackageStatus, PackedItem,
};
pub use pick_list::{
    AssignPicker, CancelPickList, CreatePickList, ItemPicked, PickItem, PickItemSpec, PickList,
    PickListCommand, PickListEvent, PickListId, PickListStatus, RecordPick, StartPicking,
};
pub use quality_check::{
    InspectionChecks, InspectionScores, QualityCheck, QualityCheckCommand, QualityCheckEvent,
    QualityCheckId, QualityResult, RecordInspection,
};
pub use shipment::{
    CreateShipment, ScheduleDispatch, Shipment, ShipmentCommand, ShipmentEvent, ShipmentId,
    ShipmentStatus, TransitionShipment,
};
pub use tracking::{
    AppendTrackingEvent, StartTracking, TrackingEntry, TrackingLog, TrackingLogCommand,
    TrackingLogEvent, TrackingLogId, is_milestone_event,
};
