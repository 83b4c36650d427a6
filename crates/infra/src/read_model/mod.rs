//! Disposable, warehouse-isolated read model storage.

mod scoped_store;

pub use scoped_store::{InMemoryScopedStore, ScopedStore};
