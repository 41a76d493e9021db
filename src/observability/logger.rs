//! Subscriber setup.
//!
//! `RUST_LOG` wins when set; otherwise the floor comes from `LOG_LEVEL`.
//! Development gets human-readable output, other environments JSON lines.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Directive string used when `RUST_LOG` is absent.
pub fn default_directives(config: &LoggingConfig) -> String {
    format!("{},tower_http=warn", config.level.as_str())
}

pub fn init_tracing(config: &LoggingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config)));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().compact())
            .try_init()
    }
}
