//! Structured logging setup.
//!
//! Log lines go to stderr so command output on stdout stays parseable.
//! Verbosity follows `RUST_LOG`, defaulting to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn init() {
    init_with_default("info");
}

/// Install the global subscriber with `default_filter` when `RUST_LOG` is unset.
///
/// Calling it twice is harmless; the second call is ignored.
pub fn init_with_default(default_filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
