use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global JSON subscriber.
///
/// `RUST_LOG` controls the level, falling back to `default_filter`. Events
/// emitted through the `log` crate are forwarded as well.
pub fn try_init_telemetry(default_filter: &str) -> Result<(), TryInitError> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init()
}

/// Structured logging at `info` unless `RUST_LOG` says otherwise. A second
/// call is ignored.
pub fn init_telemetry() {
    if let Err(e) = try_init_telemetry("info") {
        eprintln!("Telemetry already initialised: {}", e);
    }
}
