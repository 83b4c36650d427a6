//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the process-wide tracing subscriber.
///
/// Emits JSON lines; verbosity comes from `RUST_LOG` and defaults to `info`.
/// Calling this more than once is harmless: `try_init` fails quietly when a
/// subscriber is already installed (tests spin up several servers).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
