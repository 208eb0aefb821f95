//! Console tracing for the kernel process.
//!
//! # Usage
//!
//! ```ignore
//! use inkpad_host_bridge::telemetry::{self, TelemetryConfig};
//!
//! telemetry::init(TelemetryConfig::from_env("inkpad-kernel"));
//! tracing::info!("kernel started");
//! ```

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name, logged once at startup.
    pub service_name: String,
    /// Console log level (default: INFO, DEBUG in debug builds)
    pub console_level: Level,
}

impl TelemetryConfig {
    /// `RUST_LOG`, when set, overrides `console_level`.
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let console_level = if cfg!(debug_assertions) {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Self {
            service_name: service_name.into(),
            console_level,
        }
    }
}

/// Install the console subscriber. Returns `false` if one was already set.
pub fn init(config: TelemetryConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.console_level.as_str().to_lowercase()));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    let installed = tracing_subscriber::registry().with(console_layer).try_init().is_ok();
    if installed {
        tracing::info!(service = %config.service_name, "tracing initialized");
    }
    installed
}
