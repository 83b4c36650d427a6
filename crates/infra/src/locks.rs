//! Keyed locks with bounded waits.
//!
//! Cross-aggregate operations (placing an order against several inventory
//! records, restocking from a return) serialize on named locks scoped to a
//! warehouse. Waits are bounded: a caller that cannot acquire its locks
//! within the registry's timeout gets `LockTimeout` instead of blocking the
//! worker forever.
//!
//! `acquire_many` sorts its keys and takes them all-or-nothing under one
//! mutex, so two callers locking overlapping key sets cannot deadlock.

use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use stockpilot_core::WarehouseId;

/// Default bounded wait for lock acquisition.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
#[error("timed out waiting for lock(s): {keys:?}")]
pub struct LockTimeout {
    pub keys: Vec<String>,
}

#[derive(Debug, Default)]
struct LockState {
    held: HashSet<(WarehouseId, String)>,
}

/// Warehouse-scoped named lock registry.
#[derive(Debug)]
pub struct LockRegistry {
    state: Mutex<LockState>,
    released: Condvar,
    timeout: Duration,
}

impl LockRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn with_default_timeout() -> Self {
        Self::new(DEFAULT_LOCK_WAIT)
    }

    /// Acquire a single named lock.
    pub fn acquire(
        self: &Arc<Self>,
        warehouse_id: WarehouseId,
        key: impl Into<String>,
    ) -> Result<LockGuard, LockTimeout> {
        self.acquire_many(warehouse_id, vec![key.into()])
    }

    /// Acquire a set of named locks atomically.
    ///
    /// Keys are deduplicated and sorted so acquisition order is canonical.
    pub fn acquire_many(
        self: &Arc<Self>,
        warehouse_id: WarehouseId,
        keys: Vec<String>,
    ) -> Result<LockGuard, LockTimeout> {
        let mut keys = keys;
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + self.timeout;
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(_) => return Err(LockTimeout { keys }),
        };

        loop {
            let contended: Vec<&String> = keys
                .iter()
                .filter(|k| state.held.contains(&(warehouse_id, (*k).clone())))
                .collect();

            if contended.is_empty() {
                for k in &keys {
                    state.held.insert((warehouse_id, k.clone()));
                }
                return Ok(LockGuard {
                    registry: Arc::clone(self),
                    warehouse_id,
                    keys,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(LockTimeout { keys });
            }

            state = match self.released.wait_timeout(state, deadline - now) {
                Ok((s, _)) => s,
                Err(_) => return Err(LockTimeout { keys }),
            };
        }
    }
}

/// RAII guard; releases its keys and wakes waiters on drop.
#[derive(Debug)]
pub struct LockGuard {
    registry: Arc<LockRegistry>,
    warehouse_id: WarehouseId,
    keys: Vec<String>,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.registry.state.lock() {
            for k in &self.keys {
                state.held.remove(&(self.warehouse_id, k.clone()));
            }
        }
        self.registry.released.notify_all();
    }
}

/// Lock key for an order aggregate.
pub fn order_lock_key(order_id: impl core::fmt::Display) -> String {
    format!("order:{order_id}")
}

/// Lock key for a product's inventory record.
pub fn product_lock_key(product_id: impl core::fmt::Display) -> String {
    format!("product:{product_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_warehouse_id() -> WarehouseId {
        WarehouseId::from_uuid(uuid::Uuid::from_u128(1))
    }

    #[test]
    fn reacquire_after_release() {
        let registry = Arc::new(LockRegistry::with_default_timeout());
        let guard = registry.acquire(test_warehouse_id(), "product:p1").unwrap();
        drop(guard);
        registry.acquire(test_warehouse_id(), "product:p1").unwrap();
    }

    #[test]
    fn contended_lock_times_out() {
        let registry = Arc::new(LockRegistry::new(Duration::from_millis(50)));
        let _guard = registry.acquire(test_warehouse_id(), "product:p1").unwrap();

        let err = registry
            .acquire(test_warehouse_id(), "product:p1")
            .unwrap_err();
        assert_eq!(err.keys, vec!["product:p1".to_string()]);
    }

    #[test]
    fn same_key_in_another_warehouse_is_free() {
        let registry = Arc::new(LockRegistry::new(Duration::from_millis(50)));
        let _guard = registry.acquire(test_warehouse_id(), "product:p1").unwrap();

        let other = WarehouseId::from_uuid(uuid::Uuid::from_u128(2));
        registry.acquire(other, "product:p1").unwrap();
    }

    #[test]
    fn acquire_many_is_all_or_nothing() {
        let registry = Arc::new(LockRegistry::new(Duration::from_millis(50)));
        let _guard = registry.acquire(test_warehouse_id(), "product:p2").unwrap();

        // p1 is free but the batch must fail because p2 is held...
        registry
            .acquire_many(
                test_warehouse_id(),
                vec!["product:p1".to_string(), "product:p2".to_string()],
            )
            .unwrap_err();

        // ...and p1 must not have been left locked behind.
        registry.acquire(test_warehouse_id(), "product:p1").unwrap();
    }

    #[test]
    fn waiter_wakes_when_holder_releases() {
        let registry = Arc::new(LockRegistry::new(Duration::from_secs(2)));
        let guard = registry.acquire(test_warehouse_id(), "order:o1").unwrap();

        let registry_clone = Arc::clone(&registry);
        let handle = std::thread::spawn(move || {
            registry_clone
                .acquire(test_warehouse_id(), "order:o1")
                .is_ok()
        });

        std::thread::sleep(Duration::from_millis(20));
        drop(guard);
        assert!(handle.join().unwrap());
    }
}
