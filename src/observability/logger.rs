//! Event emission and subscriber setup
//!
//! Events go through `tracing`; the subscriber decides the output format.
//! Fields are rendered in key order so identical events produce identical
//! lines.

use std::fmt::Write as _;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use super::events::Event;

/// Environment variable holding the log filter directive
pub const LOG_FILTER_ENV: &str = "SHARDGATE_LOG";

const DEFAULT_FILTER: &str = "info";

/// Subscriber output options
#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Filter directive, overrides `SHARDGATE_LOG`
    pub filter: Option<String>,
    /// Emit one JSON object per line instead of human readable text
    pub json: bool,
}

/// Install the global subscriber.
///
/// Returns an error message if a subscriber is already installed.
pub fn init_logging(options: &LoggingOptions) -> Result<(), String> {
    let filter = match &options.filter {
        Some(directive) => EnvFilter::try_new(directive).map_err(|e| e.to_string())?,
        None => EnvFilter::try_from_env(LOG_FILTER_ENV)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = if options.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| e.to_string())
}

/// Render fields as `k=v` pairs sorted by key.
pub fn render_fields(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = fields.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let mut out = String::with_capacity(64);
    for (i, (key, value)) in sorted.into_iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{}={}", key, value);
    }
    out
}

/// Emit `event` at its level with the given fields.
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let name = event.as_str();
    let rendered = render_fields(fields);
    match event.level() {
        Level::ERROR => tracing::error!(event = name, fields = %rendered, "{}", name),
        Level::WARN => tracing::warn!(event = name, fields = %rendered, "{}", name),
        Level::INFO => tracing::info!(event = name, fields = %rendered, "{}", name),
        Level::DEBUG => tracing::debug!(event = name, fields = %rendered, "{}", name),
        _ => tracing::trace!(event = name, fields = %rendered, "{}", name),
    }
}
