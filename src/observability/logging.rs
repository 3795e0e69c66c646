//! # Logging
//!
//! Installs the global `tracing` subscriber. The filter comes from `RUST_LOG`
//! when set, otherwise from `LOG_LEVEL`; `LOG_FORMAT` picks JSON or
//! human-readable text output.

use crate::config::ControllerConfig;
use tracing_subscriber::EnvFilter;

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    /// Anything other than `text` (case-insensitive) is JSON
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            LogFormat::Text
        } else {
            LogFormat::Json
        }
    }
}

/// Filter directive for a `LOG_LEVEL` value, scoped to this crate with the
/// noisier dependencies kept at `warn`
pub fn default_directive(log_level: &str) -> String {
    let level = match log_level.to_ascii_lowercase().as_str() {
        l @ ("error" | "warn" | "info" | "debug" | "trace") => l.to_string(),
        _ => "info".to_string(),
    };
    format!("aws_resource_controller={level},kube=warn,aws_config=warn,aws_smithy_runtime=warn,hyper=warn")
}

/// Install the global subscriber; a second call is a no-op
pub fn init(config: &ControllerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level)));

    let result = match LogFormat::parse(&config.log_format) {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init(),
    };

    if let Err(e) = result {
        tracing::warn!("Tracing subscriber already initialized: {}", e);
    }
}
