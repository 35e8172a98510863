//! Structured Logging Setup
//!
//! Builds the `tracing` subscriber from the `[logging]` section. `RUST_LOG`
//! directives are honored on top of the configured level. Output goes to
//! stderr so command output on stdout stays clean.

use anyhow::Result;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Effective level: the configured one, raised to DEBUG by `--verbose`
pub fn effective_level(config: &LoggingConfig, verbose: bool) -> Level {
    let level = config.level.to_lowercase().parse().unwrap_or(Level::INFO);
    if verbose && level != Level::TRACE {
        Level::DEBUG
    } else {
        level
    }
}

/// Build a subscriber writing to `writer` in the configured format
pub fn subscriber<W>(
    config: &LoggingConfig,
    verbose: bool,
    writer: W,
) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let level = effective_level(config, verbose);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with_writer(writer);

    match config.format.to_lowercase().as_str() {
        "json" => Box::new(builder.json().finish()),
        "pretty" => Box::new(builder.pretty().finish()),
        _ => Box::new(builder.compact().finish()),
    }
}

/// Install the global subscriber
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(config, verbose, std::io::stderr))
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
