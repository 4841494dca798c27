//! Tracing initialisation for embedders and tests

/// Initialise the global tracing subscriber with an env-filter default.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txcourier=debug"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init();
}
