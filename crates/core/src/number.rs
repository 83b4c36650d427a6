//! Business number generation.
//!
//! Human-facing numbers (`ORD-000042`, `RET-000007`, ...) are issued by an
//! injected generator, never derived from wall-clock time. Aggregates receive
//! the number in the command; the generator itself lives at the application
//! boundary.

/// Issues the next business number for a given prefix.
///
/// Implementations must be safe to share across threads; numbers for a prefix
/// must be unique for the lifetime of the process.
pub trait NumberGenerator: Send + Sync {
    fn next(&self, prefix: &str) -> String;
}

impl<T: NumberGenerator + ?Sized> NumberGenerator for std::sync::Arc<T> {
    fn next(&self, prefix: &str) -> String {
        (**self).next(prefix)
    }
}
