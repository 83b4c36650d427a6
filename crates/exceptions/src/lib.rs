//! Delivery exception domain module (event-sourced).
//!
//! Exceptions track delivery problems against a tracking number. The
//! "one unresolved exception per tracking number" rule is cross-aggregate
//! and is enforced at the application layer against the exceptions index.

pub mod exception;

pub use exception::{
    AssignException, CloseException, DeliveryException, EscalateException, ExceptionCommand,
    ExceptionEvent, ExceptionId, ExceptionSeverity, ExceptionStatus, ExceptionType,
    OpenException, Priority, ResolutionEfficiency, ResolutionType, ResolveException,
    resolution_efficiency, URGENT_QUEUE,
};
