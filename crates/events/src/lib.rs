//! `stockpilot-events` — event sourcing mechanics.
//!
//! Domain-agnostic traits and helpers: events, envelopes, the event bus,
//! and outbound integration messages. No IO and no storage assumptions
//! live here.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod outbound;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use outbound::OutboundMessage;
