//! Warehouse HTTP surface: router, warehouse-context middleware, and the
//! application services that orchestrate commands across aggregates.

pub mod app;
pub mod context;
pub mod middleware;
