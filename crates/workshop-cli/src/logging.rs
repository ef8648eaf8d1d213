//! Logging configuration
//!
//! Initializes tracing for the application.

use serde::{Deserialize, Serialize};
use tracing::Dispatch;
use tracing_subscriber::{EnvFilter, fmt};

/// Log line format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Builds the subscriber for `level` and `format`; `RUST_LOG` overrides the
/// level
#[must_use]
pub fn build_dispatch(level: &str, format: LogFormat) -> Dispatch {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => Dispatch::new(builder.finish()),
        LogFormat::Json => Dispatch::new(builder.json().finish()),
    }
}

/// Installs the subscriber globally and returns it for injection into the
/// worker pool. A subscriber installed earlier stays in place.
pub fn init_logging(level: &str, format: LogFormat) -> Dispatch {
    let dispatch = build_dispatch(level, format);
    if tracing::dispatcher::set_global_default(dispatch.clone()).is_err() {
        return tracing::dispatcher::get_default(Dispatch::clone);
    }
    dispatch
}
