//! Inventory domain module (event-sourced).
//!
//! Business rules for the per-product inventory ledger: reservations, sales,
//! restocks, absolute corrections, and idempotent stock alerting. Pure
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod record;

pub use record::{
    AdjustStock, AlertResolved, AlertType, InventoryCommand, InventoryEvent, InventoryRecord,
    InventoryRecordId, ProductRestocked, ProductTracked, ReleaseStock, ReserveStock, ResolveAlert,
    RestockProduct, SellStock, StockAdjusted, StockAlertRaised, StockReleased, StockReserved,
    StockSold, StockStatus, TrackProduct,
};
