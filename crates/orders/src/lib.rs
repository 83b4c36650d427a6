//! Order lifecycle domain module (event-sourced).
//!
//! The order aggregate owns the status state machine and the line items;
//! stock reservations live in the inventory ledger and are coordinated at
//! the application layer.

pub mod order;

pub use order::{
    CancelOrder, FulfillmentLink, FulfillmentLinked, LinkFulfillment, Order, OrderCancelled,
    OrderCommand, OrderEvent, OrderId, OrderLine, OrderPlaced, OrderStatus, OrderStatusChanged,
    PlaceOrder, TransitionStatus,
};
