//! Structured logging setup.

use crate::config::{LogFormat, LogLevel};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging to stderr.
///
/// - `LogFormat::Json`: flattened JSON, one event per line.
/// - `LogFormat::Text`: human-readable output.
///
/// `RUST_LOG` overrides `level` when set. Call once at startup.
pub fn init_logging(level: LogLevel, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(console::colors_enabled_stderr())
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
