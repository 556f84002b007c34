//! Tracing initialisation for skill processes.
//!
//! Call [`init_tracing`] once at program start. Subsequent calls are ignored
//! since the global subscriber can only be set once per process.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Set by managed container runtimes whose log collectors do not render colour.
const MANAGED_RUNTIME_VAR: &str = "K_SERVICE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// Newline-delimited JSON output.
    pub json: bool,
    /// Default verbosity when `RUST_LOG` is not set.
    pub level: Level,
    /// Colour escape codes in text output.
    pub ansi: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            json: false,
            level: Level::INFO,
            ansi: true,
        }
    }
}

impl TracingConfig {
    pub fn new(json: bool, level: Level) -> Self {
        Self {
            json,
            level,
            ansi: !json && std::env::var_os(MANAGED_RUNTIME_VAR).is_none(),
        }
    }

    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }
}

/// Initialise the global tracing subscriber.
///
/// `RUST_LOG` overrides `config.level` for fine-grained filtering.
pub fn init_tracing(config: &TracingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_ansi(config.ansi))
            .try_init()
            .ok();
    }
}
