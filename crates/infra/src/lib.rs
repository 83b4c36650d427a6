//! Infrastructure layer: event store, dispatch pipeline, locks, read models.

pub mod audit;
pub mod command_dispatcher;
pub mod event_store;
pub mod locks;
pub mod numbers;
pub mod outbound;
pub mod projections;
pub mod read_model;

#[cfg(test)]
mod integration_tests;
