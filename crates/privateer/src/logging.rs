//! Diagnostic logging.
//!
//! Operator-facing output goes through [`crate::executor::ExecSink`]; this
//! module only sets up `tracing` for diagnostics on stderr, so piping stdout
//! never mixes the two.

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// One JSON object per event.
    pub json: bool,
    /// Default level becomes DEBUG instead of WARN.
    pub verbose: bool,
}

impl LogConfig {
    fn default_filter(&self) -> String {
        let level = if self.verbose {
            Level::DEBUG
        } else {
            Level::WARN
        };
        format!("privateer={}", level.as_str().to_lowercase())
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter()));

    let result = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
