use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the process-wide subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_telemetry(service_name: &'static str) {
    init_telemetry_with_level(service_name, "info");
}

/// Same as [`init_telemetry`] with a different fallback directive. Output goes
/// to stderr so command-line tools keep stdout for their results.
pub fn init_telemetry_with_level(service_name: &'static str, default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    tracing::debug!(service = service_name, "telemetry initialized");
}
