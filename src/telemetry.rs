use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install JSON structured logging for the client.
///
/// `RUST_LOG` overrides `default_directive`. Returns `false` when the host
/// application already installed a global subscriber, in which case the
/// client's events flow into that one instead.
pub fn init_telemetry(default_directive: &str) -> bool {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
        .try_init()
        .is_ok()
}
