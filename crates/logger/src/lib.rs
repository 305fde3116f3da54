use std::env::var;

use tracing::{level_filters::LevelFilter, warn};
use tracing_subscriber::{Layer, filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output layout, picked with `RUST_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

impl LogFormat {
    fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Install the global subscriber: INFO unless `RUST_LOG` says otherwise.
pub fn init() {
    init_with(LevelFilter::INFO);
}

pub fn init_with(level: LevelFilter) {
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();

    let (format, format_error) = match var("RUST_LOG_FORMAT") {
        Ok(value) => (LogFormat::from_env_value(&value), None),
        Err(std::env::VarError::NotPresent) => (LogFormat::default(), None),
        Err(error) => (LogFormat::default(), Some(error)),
    };

    let log_layer = match format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(false)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_filter(env_filter)
            .boxed(),
    };

    // A second init (e.g. from tests) keeps the first subscriber.
    if tracing_subscriber::registry().with(log_layer).try_init().is_err() {
        return;
    }

    if let Some(error) = format_error {
        warn!("Failed to read RUST_LOG_FORMAT, falling back to compact output: {error}");
    }
}
