//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: can be reconstructed from the event stream
//! - **Warehouse-isolated**: data is partitioned by warehouse
//! - **Idempotent**: safe for at-least-once delivery

pub mod cursor;
pub mod replay;

pub mod exceptions;
pub mod inventory_stock;
pub mod orders;
pub mod packages;
pub mod pick_lists;
pub mod quality_checks;
pub mod reports;
pub mod returns;
pub mod shipments;
pub mod tracking;

pub use cursor::{CursorDecision, ProjectionCursors, ProjectionError};
