//! Logging setup.
//!
//! Configures the global tracing subscriber once at startup: readable text
//! for terminals, or structured JSON when the output feeds a log pipeline.

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable text with optional ANSI colors.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum level to emit.
    pub level: Level,
    /// Output format.
    pub format: LogFormat,
    /// ANSI colors (text format only).
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            ansi_colors: true,
        }
    }
}

/// The default filter: the configured level globally, with the HTTP stack's
/// internals held to `warn` so archive fetches do not flood debug output.
fn default_filter(level: Level) -> EnvFilter {
    let mut filter = EnvFilter::new(level.as_str());
    for directive in ["hyper=warn", "reqwest=warn", "h2=warn"] {
        if let Ok(parsed) = directive.parse() {
            filter = filter.add_directive(parsed);
        }
    }
    filter
}

/// Initialize the global logging subscriber. Call once at startup.
///
/// A `RUST_LOG` environment variable overrides the configured level.
pub fn init(config: &LogConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(config.level));

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(config.ansi_colors)
                    .with_target(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
    Ok(())
}
