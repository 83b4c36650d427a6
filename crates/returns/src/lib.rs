//! Returns domain module (event-sourced).
//!
//! A return order walks a fixed lifecycle from request through inspection
//! and restocking to refund settlement. The "one active return per order"
//! rule is cross-aggregate and is enforced at the application layer against
//! the returns index.

pub mod return_order;

pub use return_order::{
    ApproveReturn, CancelReturn, CompleteReturn, ItemCondition, MarkReceived, MarkRepaired,
    RecordRestock, RejectReturn, RequestReturn, ReturnCommand, ReturnEvent, ReturnId, ReturnLine,
    ReturnOrder, ReturnReason, ReturnStatus, SetRefundBreakdown, StartInspection,
};
