//! Business number generation.
//!
//! Business-facing identifiers (ORD-000001, RET-000014, ...) come from a
//! per-prefix monotonic counter rather than wall-clock time, so two numbers
//! handed out in the same millisecond can never collide.

use std::collections::HashMap;
use std::sync::Mutex;

use stockpilot_core::NumberGenerator;

/// Per-prefix monotonic counters.
///
/// In-memory implementation; counters reset on restart, which is fine for
/// tests/dev. A durable backend would persist the counters.
#[derive(Debug, Default)]
pub struct SequentialNumbers {
    counters: Mutex<HashMap<String, u64>>,
}

impl SequentialNumbers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a prefix so the next number continues an existing series.
    pub fn seed(&self, prefix: &str, last_used: u64) {
        if let Ok(mut counters) = self.counters.lock() {
            let entry = counters.entry(prefix.to_string()).or_insert(0);
            *entry = (*entry).max(last_used);
        }
    }
}

impl NumberGenerator for SequentialNumbers {
    fn next(&self, prefix: &str) -> String {
        let mut counters = match self.counters.lock() {
            Ok(c) => c,
            // Poisoned counter state still has valid numbers in it.
            Err(poisoned) => poisoned.into_inner(),
        };
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        *counter += 1;
        format!("{prefix}-{:06}", *counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_are_sequential_per_prefix() {
        let numbers = SequentialNumbers::new();
        assert_eq!(numbers.next("ORD"), "ORD-000001");
        assert_eq!(numbers.next("ORD"), "ORD-000002");
        assert_eq!(numbers.next("RET"), "RET-000001");
        assert_eq!(numbers.next("ORD"), "ORD-000003");
    }

    #[test]
    fn seeding_continues_a_series() {
        let numbers = SequentialNumbers::new();
        numbers.seed("SHP", 41);
        assert_eq!(numbers.next("SHP"), "SHP-000042");
    }
}
